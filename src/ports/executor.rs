//! Transaction Executor Port - On-Chain Submission
//!
//! The executor owns ABI shapes, signing and gas. The keeper only hands
//! it a batch of ids plus the material needed to act on them.

use async_trait::async_trait;

use super::error::ExecutorError;
use crate::domain::credential::Credential;
use crate::domain::instrument::{InstrumentId, ItemId};
use crate::domain::proof::Proof;
use crate::domain::range::ExecMode;

/// Outcome of one successful executor invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
  /// Items executed or closed.
  pub count: u64,
  /// Items the executor skipped (not ready on-chain).
  pub skipped: u64,
  /// Ids the executor reports having touched.
  pub touched_ids: Vec<ItemId>,
}

/// Submits one batch for one execution mode.
#[async_trait]
pub trait TxExecutor: Send + Sync {
  async fn submit(
    &self,
    mode: ExecMode,
    instrument: InstrumentId,
    ids: &[ItemId],
    credential: &Credential,
    proof: &Proof,
  ) -> Result<ExecutionReport, ExecutorError>;
}
