//! Verify Service Port - Post-Attempt State Checks
//!
//! Verification is advisory. It feeds the suppression store and never
//! blocks dispatch, so failures surface as `None` rather than errors.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::instrument::ItemId;

/// Result of one verification round.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct VerifyReport {
  #[serde(default)]
  pub ok: bool,
  /// Ids examined.
  #[serde(default)]
  pub checked: u64,
  /// Ids whose state changed since the last attempt.
  #[serde(default)]
  pub updated: u64,
  /// Ids whose recorded state disagrees with the source of truth.
  #[serde(default)]
  pub mismatches: Vec<Value>,
}

impl VerifyReport {
  /// Nothing changed and nothing disagrees: the attempt was a no-op.
  pub fn is_clean_noop(&self) -> bool {
    self.updated == 0 && self.mismatches.is_empty()
  }
}

/// Asks the source of truth whether ids changed state.
#[async_trait]
pub trait VerifyService: Send + Sync {
  /// `None` for empty input (no request made) or any failure.
  async fn verify(&self, ids: &[ItemId]) -> Option<VerifyReport>;
}
