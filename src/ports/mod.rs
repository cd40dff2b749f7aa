//! Ports Layer - Hexagonal Architecture Boundaries
//!
//! Interfaces the usecases need from the outside world. Adapters
//! implement these traits; tests substitute `mockall` mocks.
//!
//! Port categories:
//! - `ProofSource`: oracle freshness proofs
//! - `RangeSource`: candidate ids around a price
//! - `VerifyService`: post-attempt state verification
//! - `TxExecutor`: on-chain transaction submission
//! - `CycleHandler`: what a feed listener runs for a new price slot

pub mod error;
pub mod executor;
pub mod handler;
pub mod proof;
pub mod range;
pub mod verify;

pub use error::{ApiError, ExecutorError, ProofError};
pub use executor::{ExecutionReport, TxExecutor};
pub use handler::{CycleHandler, CycleTrigger};
pub use proof::ProofSource;
pub use range::RangeSource;
pub use verify::{VerifyReport, VerifyService};
