//! Batch Dispatcher - Suppression-aware Executor Calls
//!
//! Dispatch flow for one execution mode:
//! 1. Hard preconditions: ids, credential and proof must be present
//! 2. Drop ids suppressed at this (instrument, slot)
//! 3. Partition into fixed-size batches
//! 4. Submit batches sequentially, pausing between them
//! 5. Feed verify results back into the suppression store
//!
//! A failing batch never aborts the remaining ones, and nothing
//! propagates to the caller; the returned summary says what happened.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::credential::Credential;
use crate::domain::instrument::{InstrumentId, ItemId, PriceSlot};
use crate::domain::proof::Proof;
use crate::domain::range::ExecMode;
use crate::domain::suppression::SuppressionStore;
use crate::ports::executor::TxExecutor;
use crate::ports::verify::VerifyService;

/// Dispatch pacing.
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
  /// Maximum ids per executor call.
  pub batch_size: usize,
  /// Pause between consecutive batches.
  pub inter_batch_delay: Duration,
}

impl Default for DispatchSettings {
  fn default() -> Self {
    Self {
      batch_size: 200,
      inter_batch_delay: Duration::from_millis(1_000),
    }
  }
}

/// Input for one dispatch.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
  pub instrument: InstrumentId,
  /// Slot that triggered the cycle; scopes suppression.
  pub slot: PriceSlot,
  pub ids: Vec<ItemId>,
  pub credential: Option<Credential>,
  pub proof: Option<Proof>,
}

/// Why a dispatch never reached the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
  NoIds,
  MissingCredential,
  MissingProof,
  /// Every id is suppressed at this slot.
  FullySuppressed,
}

impl SkipReason {
  fn label(self) -> &'static str {
    match self {
      Self::NoIds => "no_ids",
      Self::MissingCredential => "missing_credential",
      Self::MissingProof => "missing_proof",
      Self::FullySuppressed => "fully_suppressed",
    }
  }
}

/// Result of a detached verify ping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingOutcome {
  /// The verify service answered.
  Delivered,
  /// The ping failed; it was best effort.
  Discarded,
}

/// What one dispatch did.
#[derive(Debug, Default)]
pub struct DispatchSummary {
  /// Set when the dispatch stopped before any executor call.
  pub skip: Option<SkipReason>,
  /// Ids requested.
  pub requested: usize,
  /// Ids left after suppression filtering.
  pub eligible: usize,
  /// Executor invocations made.
  pub batches: usize,
  /// Invocations that returned an error.
  pub failed_batches: usize,
  /// Sum of executed/closed counts.
  pub executed: u64,
  /// Sum of skipped counts.
  pub skipped: u64,
  /// Ids whose suppression counter was incremented.
  pub incremented: usize,
  /// Ids whose suppression counter was cleared.
  pub cleared: usize,
  /// Detached verify pings started for touched ids.
  pub pings: Vec<JoinHandle<PingOutcome>>,
}

impl DispatchSummary {
  fn skipped_with(reason: SkipReason, requested: usize) -> Self {
    Self {
      skip: Some(reason),
      requested,
      ..Default::default()
    }
  }
}

/// Split ids into consecutive batches of at most `batch_size`.
pub fn partition(ids: &[ItemId], batch_size: usize) -> std::slice::Chunks<'_, ItemId> {
  ids.chunks(batch_size.max(1))
}

/// Fire a best-effort verify call without waiting for it.
///
/// The handle may be dropped; awaiting it only reports the outcome.
pub fn ping_verify_detached<V: VerifyService + ?Sized + 'static>(
  verifier: Arc<V>,
  ids: Vec<ItemId>,
  metrics: Arc<MetricsRegistry>,
) -> JoinHandle<PingOutcome> {
  tokio::spawn(async move {
    let outcome = match verifier.verify(&ids).await {
      Some(_) => PingOutcome::Delivered,
      None => PingOutcome::Discarded,
    };
    let label = match outcome {
      PingOutcome::Delivered => "delivered",
      PingOutcome::Discarded => "discarded",
    };
    metrics.verify_pings.with_label_values(&[label]).inc();
    debug!(ids = ids.len(), outcome = label, "Verify ping finished");
    outcome
  })
}

/// Drives the executor for one mode at a time.
pub struct BatchDispatcher<E: TxExecutor + ?Sized, V: VerifyService + ?Sized + 'static> {
  executor: Arc<E>,
  verifier: Arc<V>,
  suppression: Arc<SuppressionStore>,
  settings: DispatchSettings,
  metrics: Arc<MetricsRegistry>,
}

impl<E: TxExecutor + ?Sized, V: VerifyService + ?Sized + 'static> BatchDispatcher<E, V> {
  pub fn new(
    executor: Arc<E>,
    verifier: Arc<V>,
    suppression: Arc<SuppressionStore>,
    settings: DispatchSettings,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    Self {
      executor,
      verifier,
      suppression,
      settings,
      metrics,
    }
  }

  /// Best-effort verify ping through this dispatcher's verifier.
  pub fn ping_verify_detached(&self, ids: Vec<ItemId>) -> JoinHandle<PingOutcome> {
    ping_verify_detached(Arc::clone(&self.verifier), ids, Arc::clone(&self.metrics))
  }

  /// Dispatch `request.ids` for `mode`.
  #[instrument(
    skip(self, mode, request),
    fields(mode = %mode, instrument = request.instrument, slot = request.slot)
  )]
  pub async fn run(&self, mode: ExecMode, request: DispatchRequest) -> DispatchSummary {
    let requested = request.ids.len();

    if request.ids.is_empty() {
      return self.skip(SkipReason::NoIds, requested);
    }
    let Some(credential) = request.credential.as_ref().filter(|c| !c.is_empty()) else {
      warn!("No credential for instrument; skipping dispatch");
      return self.skip(SkipReason::MissingCredential, requested);
    };
    let Some(proof) = request.proof.as_ref().filter(|p| !p.is_empty()) else {
      warn!("No proof available; skipping dispatch");
      return self.skip(SkipReason::MissingProof, requested);
    };

    let eligible = self
      .suppression
      .filter(request.instrument, request.slot, &request.ids);
    if eligible.is_empty() {
      debug!(requested, "All ids suppressed at this slot");
      return self.skip(SkipReason::FullySuppressed, requested);
    }

    let mut summary = DispatchSummary {
      requested,
      eligible: eligible.len(),
      ..Default::default()
    };

    let batches: Vec<&[ItemId]> = partition(&eligible, self.settings.batch_size).collect();
    let total = batches.len();

    for (index, batch) in batches.into_iter().enumerate() {
      summary.batches += 1;
      let started = Instant::now();

      let result = self
        .executor
        .submit(mode, request.instrument, batch, credential, proof)
        .await;

      self
        .metrics
        .executor_latency_ms
        .with_label_values(&[mode.as_str()])
        .observe(started.elapsed().as_millis() as f64);

      match result {
        Ok(report) => {
          summary.executed += report.count;
          summary.skipped += report.skipped;
          let label = if report.skipped > 0 { "partial" } else { "ok" };
          self
            .metrics
            .executor_calls
            .with_label_values(&[mode.as_str(), label])
            .inc();

          debug!(
            batch = index + 1,
            of = total,
            size = batch.len(),
            count = report.count,
            skipped = report.skipped,
            "Batch executed"
          );

          if !report.touched_ids.is_empty() {
            summary.pings.push(self.ping_verify_detached(report.touched_ids));
          }
          if report.skipped > 0 {
            self.apply_verify(request.instrument, request.slot, batch, &mut summary).await;
          }
        }
        Err(e) => {
          summary.failed_batches += 1;
          self
            .metrics
            .executor_calls
            .with_label_values(&[mode.as_str(), "error"])
            .inc();
          warn!(batch = index + 1, of = total, size = batch.len(), error = %e, "Batch failed");
          self.apply_verify(request.instrument, request.slot, batch, &mut summary).await;
        }
      }

      if index + 1 < total {
        tokio::time::sleep(self.settings.inter_batch_delay).await;
      }
    }

    info!(
      eligible = summary.eligible,
      batches = summary.batches,
      failed = summary.failed_batches,
      executed = summary.executed,
      skipped = summary.skipped,
      incremented = summary.incremented,
      cleared = summary.cleared,
      "Dispatch complete"
    );

    summary
  }

  /// Ask the verifier about `batch` and update suppression accordingly.
  async fn apply_verify(
    &self,
    instrument: InstrumentId,
    slot: PriceSlot,
    batch: &[ItemId],
    summary: &mut DispatchSummary,
  ) {
    let Some(report) = self.verifier.verify(batch).await else {
      debug!(size = batch.len(), "Verify unavailable; suppression unchanged");
      return;
    };

    if report.is_clean_noop() {
      self.suppression.increment(instrument, slot, batch);
      summary.incremented += batch.len();
      self
        .metrics
        .suppression_changes
        .with_label_values(&["increment"])
        .inc_by(batch.len() as u64);
    } else {
      self.suppression.clear(instrument, slot, batch);
      summary.cleared += batch.len();
      self
        .metrics
        .suppression_changes
        .with_label_values(&["clear"])
        .inc_by(batch.len() as u64);
    }

    self
      .metrics
      .suppressed_ids
      .set(self.suppression.suppressed_total() as i64);
  }

  fn skip(&self, reason: SkipReason, requested: usize) -> DispatchSummary {
    self
      .metrics
      .dispatch_skips
      .with_label_values(&[reason.label()])
      .inc();
    DispatchSummary::skipped_with(reason, requested)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partition_sizes() {
    let ids: Vec<ItemId> = (0..450).collect();
    let sizes: Vec<usize> = partition(&ids, 200).map(<[ItemId]>::len).collect();
    assert_eq!(sizes, vec![200, 200, 50]);
  }

  #[test]
  fn test_partition_zero_batch_size_is_one() {
    let ids = [1, 2, 3];
    assert_eq!(partition(&ids, 0).count(), 3);
  }
}
