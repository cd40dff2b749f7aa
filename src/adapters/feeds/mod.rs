//! Price Feed Adapters
//!
//! A `FeedListener` owns one WebSocket connection to the price feed,
//! turns updates into price slots, and starts at most one cycle per
//! instrument through its `CycleHandler`. The keeper and the safety
//! verifier are two listener instances with different handlers.
//!
//! Features:
//! - Event-driven via tokio::select! (NEVER polling)
//! - Exponential reconnect backoff, reset after a successful subscribe
//! - Ping/pong keepalive with a pong deadline

pub mod keepalive;
pub mod listener;

pub use keepalive::Keepalive;
pub use listener::{ConnectionState, FeedError, FeedListener, FeedListenerConfig, UpdateOutcome};
