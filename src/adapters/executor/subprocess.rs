//! Subprocess Executor - One Child Process per Batch
//!
//! Invocation:
//! `program [script] <mode> <json ids> <credential> --asset=<id> --addr=<contract> --rpc=<url> --proof=<0xhex> [--reason=<n>]`
//!
//! `--reason` is the on-chain close reason and is only passed for stop modes.
//!
//! Exit status 0 is success; the stdout summary line carries the
//! executed/closed and skipped counts.

use std::process::Stdio;
use std::time::{Duration, Instant};

use alloy::primitives::Address;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use super::report::parse_report;
use crate::domain::credential::Credential;
use crate::domain::instrument::{InstrumentId, ItemId};
use crate::domain::proof::Proof;
use crate::domain::range::ExecMode;
use crate::ports::error::ExecutorError;
use crate::ports::executor::{ExecutionReport, TxExecutor};

/// Executor process settings.
#[derive(Debug, Clone)]
pub struct SubprocessExecutorConfig {
    pub program: String,
    pub script: Option<String>,
    pub contract: Address,
    pub rpc_url: String,
    /// The child is killed once this elapses.
    pub timeout: Duration,
}

/// Runs the external executor once per batch.
pub struct SubprocessExecutor {
    config: SubprocessExecutorConfig,
}

impl SubprocessExecutor {
    pub fn new(config: SubprocessExecutorConfig) -> Self {
        Self { config }
    }

    /// Arguments after the program name.
    pub fn command_args(
        &self,
        mode: ExecMode,
        instrument: InstrumentId,
        ids: &[ItemId],
        credential: &Credential,
        proof: &Proof,
    ) -> Vec<String> {
        let mut args = Vec::with_capacity(9);
        if let Some(script) = &self.config.script {
            args.push(script.clone());
        }
        args.push(mode.as_str().to_string());
        args.push(format_ids(ids));
        args.push(credential.expose().to_string());
        args.push(format!("--asset={instrument}"));
        args.push(format!("--addr={}", self.config.contract));
        args.push(format!("--rpc={}", self.config.rpc_url));
        args.push(format!("--proof={}", proof.to_hex()));
        if let Some(reason) = mode.close_reason() {
            args.push(format!("--reason={reason}"));
        }
        args
    }
}

#[async_trait]
impl TxExecutor for SubprocessExecutor {
    #[instrument(skip(self, mode, ids, credential, proof), fields(mode = %mode, ids = ids.len()))]
    async fn submit(
        &self,
        mode: ExecMode,
        instrument: InstrumentId,
        ids: &[ItemId],
        credential: &Credential,
        proof: &Proof,
    ) -> Result<ExecutionReport, ExecutorError> {
        let args = self.command_args(mode, instrument, ids, credential, proof);
        let started = Instant::now();

        let child = Command::new(&self.config.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| ExecutorError::Timeout(self.config.timeout))?
            .map_err(|e| ExecutorError::Spawn(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        if !output.status.success() {
            warn!(code = ?output.status.code(), elapsed_ms, "Executor failed");
            return Err(ExecutorError::Failed {
                code: output.status.code(),
                stderr: tail(&stderr, 512),
            });
        }

        let report = match parse_report(&stdout) {
            Some(report) => report,
            None => {
                warn!(elapsed_ms, "Executor succeeded without a summary line");
                debug!(stdout = %tail(&stdout, 512), "Executor output");
                ExecutionReport::default()
            }
        };

        info!(
            count = report.count,
            skipped = report.skipped,
            touched = report.touched_ids.len(),
            elapsed_ms,
            "Executor finished"
        );

        Ok(report)
    }
}

/// JSON array form, e.g. `[123,329]`.
fn format_ids(ids: &[ItemId]) -> String {
    let inner = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
    format!("[{inner}]")
}

/// Last `max` characters.
fn tail(text: &str, max: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(max)).collect::<String>().trim().to_string()
}
