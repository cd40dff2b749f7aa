//! Use Cases Layer - Keeper Workflows
//!
//! Orchestrates domain logic with port interfaces. Each use case is a
//! self-contained operation.
//!
//! Use cases:
//! - `proof_retry`: fetch a proof, retrying forever with jittered backoff
//! - `BatchDispatcher`: suppression-aware batched executor calls
//! - `KeeperCycle`: proof, range, then dispatch for every execution mode
//! - `SafetyPinger`: throttled verify pings around the current price

pub mod dispatcher;
pub mod keeper;
pub mod proof_retry;
pub mod safety;

pub use dispatcher::{
  BatchDispatcher, DispatchRequest, DispatchSettings, DispatchSummary, PingOutcome, SkipReason,
};
pub use keeper::{KeeperCycle, KeeperSettings};
pub use proof_retry::fetch_proof_forever;
pub use safety::{SafetyPinger, SafetySettings};
