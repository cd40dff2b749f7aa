//! Keeper Cycle - Proof, Range, Dispatch
//!
//! Cycle flow for one instrument at one price slot:
//! 1. Fetch a fresh proof (retries forever)
//! 2. Pause `request_delay`
//! 3. Fetch candidates in the band around the price; abort on error
//! 4. Dispatch limit fills, stop-losses, take-profits, liquidations,
//!    in that order, one after another

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use super::dispatcher::{BatchDispatcher, DispatchRequest};
use super::proof_retry::fetch_proof_forever;
use crate::adapters::metrics::MetricsRegistry;
use crate::config::credentials::CredentialStore;
use crate::domain::backoff::BackoffPolicy;
use crate::domain::range::ExecMode;
use crate::domain::slot::PriceBand;
use crate::ports::executor::TxExecutor;
use crate::ports::handler::{CycleHandler, CycleTrigger};
use crate::ports::proof::ProofSource;
use crate::ports::range::RangeSource;
use crate::ports::verify::VerifyService;

/// Keeper cycle tuning.
#[derive(Debug, Clone, Copy)]
pub struct KeeperSettings {
  /// Relative half-width of the range band.
  pub range_rate: f64,
  /// Pause between the proof fetch and the range fetch.
  pub request_delay: Duration,
  /// Proof retry policy.
  pub proof_policy: BackoffPolicy,
}

impl Default for KeeperSettings {
  fn default() -> Self {
    Self {
      range_rate: 0.0002,
      request_delay: Duration::from_millis(100),
      proof_policy: BackoffPolicy::PROOF,
    }
  }
}

/// The keeper's [`CycleHandler`].
pub struct KeeperCycle<P, R, E, V>
where
  P: ProofSource + ?Sized,
  R: RangeSource + ?Sized,
  E: TxExecutor + ?Sized,
  V: VerifyService + ?Sized + 'static,
{
  proofs: Arc<P>,
  ranges: Arc<R>,
  dispatcher: Arc<BatchDispatcher<E, V>>,
  credentials: Arc<CredentialStore>,
  settings: KeeperSettings,
  metrics: Arc<MetricsRegistry>,
}

impl<P, R, E, V> KeeperCycle<P, R, E, V>
where
  P: ProofSource + ?Sized,
  R: RangeSource + ?Sized,
  E: TxExecutor + ?Sized,
  V: VerifyService + ?Sized + 'static,
{
  pub fn new(
    proofs: Arc<P>,
    ranges: Arc<R>,
    dispatcher: Arc<BatchDispatcher<E, V>>,
    credentials: Arc<CredentialStore>,
    settings: KeeperSettings,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    Self {
      proofs,
      ranges,
      dispatcher,
      credentials,
      settings,
      metrics,
    }
  }

  async fn execute(&self, trigger: CycleTrigger) -> anyhow::Result<()> {
    let proof = fetch_proof_forever(
      self.proofs.as_ref(),
      trigger.instrument,
      &self.settings.proof_policy,
      &self.metrics,
    )
    .await;
    debug!(proof_len = proof.len(), "Proof ready");

    tokio::time::sleep(self.settings.request_delay).await;

    let band = PriceBand::around_f64(trigger.price, self.settings.range_rate);
    let range = self
      .ranges
      .fetch_range(trigger.instrument, band)
      .await
      .with_context(|| format!("Range fetch failed for instrument {}", trigger.instrument))?;

    info!(
      fills = range.fill_ids.len(),
      sl = range.stop_loss_ids.len(),
      tp = range.take_profit_ids.len(),
      liq = range.liquidation_ids.len(),
      "Range classified"
    );
    if range.is_empty() {
      debug!("No candidates in band");
      return Ok(());
    }

    let credential = self.credentials.get(trigger.instrument);

    for mode in ExecMode::ALL {
      let ids = range.ids(mode);
      if ids.is_empty() {
        continue;
      }

      let summary = self
        .dispatcher
        .run(
          mode,
          DispatchRequest {
            instrument: trigger.instrument,
            slot: trigger.slot,
            ids: ids.to_vec(),
            credential: credential.clone(),
            proof: Some(proof.clone()),
          },
        )
        .await;

      debug!(mode = %mode, skip = ?summary.skip, batches = summary.batches, "Mode dispatched");
    }

    Ok(())
  }
}

#[async_trait]
impl<P, R, E, V> CycleHandler for KeeperCycle<P, R, E, V>
where
  P: ProofSource + ?Sized,
  R: RangeSource + ?Sized,
  E: TxExecutor + ?Sized,
  V: VerifyService + ?Sized + 'static,
{
  async fn run_cycle(&self, trigger: CycleTrigger) -> anyhow::Result<()> {
    let cycle_id = Uuid::new_v4();
    let span = info_span!(
      "keeper_cycle",
      %cycle_id,
      instrument = trigger.instrument,
      price = %trigger.price,
      slot = trigger.slot
    );
    self.execute(trigger).instrument(span).await
  }
}
