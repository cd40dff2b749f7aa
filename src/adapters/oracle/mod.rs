//! Oracle Adapters
//!
//! - `proof`: HTTP client for the oracle's freshness proofs

pub mod proof;

pub use proof::HttpProofClient;
