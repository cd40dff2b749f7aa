//! Dry-run Executor - Log Instead of Submitting

use async_trait::async_trait;
use tracing::info;

use crate::domain::credential::Credential;
use crate::domain::instrument::{InstrumentId, ItemId};
use crate::domain::proof::Proof;
use crate::domain::range::ExecMode;
use crate::ports::error::ExecutorError;
use crate::ports::executor::{ExecutionReport, TxExecutor};

/// Reports every batch as executed-nothing, skipped-nothing.
///
/// Suppression never changes under dry run since nothing is skipped.
#[derive(Debug, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl TxExecutor for DryRunExecutor {
    async fn submit(
        &self,
        mode: ExecMode,
        instrument: InstrumentId,
        ids: &[ItemId],
        _credential: &Credential,
        proof: &Proof,
    ) -> Result<ExecutionReport, ExecutorError> {
        info!(
            mode = %mode,
            reason = ?mode.close_reason(),
            instrument,
            ids = ?ids,
            proof_len = proof.len(),
            "[DRY RUN] Would submit batch"
        );
        Ok(ExecutionReport::default())
    }
}
