//! Proof Source Port - Oracle Freshness Proofs

use async_trait::async_trait;

use super::error::ProofError;
use crate::domain::instrument::InstrumentId;
use crate::domain::proof::Proof;

/// Single-attempt proof fetch.
///
/// Retries are the caller's concern; see
/// `usecases::proof_retry::fetch_proof_forever`.
#[async_trait]
pub trait ProofSource: Send + Sync {
  /// Fetch a fresh proof for one instrument.
  async fn fetch_proof(&self, instrument: InstrumentId) -> Result<Proof, ProofError>;
}
