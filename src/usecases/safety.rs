//! Safety Pinger - Throttled Verify Around the Price
//!
//! The safety listener runs this on coarser price slots with a wider
//! band. It never executes anything; it only nudges the verify service
//! about every id near the price, at most once per id per throttle
//! window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use super::dispatcher::ping_verify_detached;
use crate::adapters::metrics::MetricsRegistry;
use crate::domain::instrument::ItemId;
use crate::domain::slot::PriceBand;
use crate::ports::handler::{CycleHandler, CycleTrigger};
use crate::ports::range::RangeSource;
use crate::ports::verify::VerifyService;

/// Safety pinger tuning.
#[derive(Debug, Clone, Copy)]
pub struct SafetySettings {
  pub range_rate: f64,
  pub request_delay: Duration,
  /// Minimum gap between two pings of the same id.
  pub throttle: Duration,
  /// Throttle entries older than this are dropped.
  pub prune_age: Duration,
}

impl Default for SafetySettings {
  fn default() -> Self {
    Self {
      range_rate: 0.001,
      request_delay: Duration::from_millis(100),
      throttle: Duration::from_secs(60),
      prune_age: Duration::from_secs(600),
    }
  }
}

/// The safety listener's [`CycleHandler`].
pub struct SafetyPinger<R: RangeSource + ?Sized, V: VerifyService + ?Sized + 'static> {
  ranges: Arc<R>,
  verifier: Arc<V>,
  /// Last ping time per id.
  last_ping: Mutex<HashMap<ItemId, Instant>>,
  settings: SafetySettings,
  metrics: Arc<MetricsRegistry>,
}

impl<R: RangeSource + ?Sized, V: VerifyService + ?Sized + 'static> SafetyPinger<R, V> {
  pub fn new(
    ranges: Arc<R>,
    verifier: Arc<V>,
    settings: SafetySettings,
    metrics: Arc<MetricsRegistry>,
  ) -> Self {
    Self {
      ranges,
      verifier,
      last_ping: Mutex::new(HashMap::new()),
      settings,
      metrics,
    }
  }

  /// Prune stale entries, keep ids outside the throttle window, and
  /// mark the kept ids as pinged at `now`.
  pub fn take_unthrottled(&self, ids: &[ItemId], now: Instant) -> Vec<ItemId> {
    let mut last = self.last_ping.lock().unwrap_or_else(PoisonError::into_inner);
    last.retain(|_, at| now.saturating_duration_since(*at) <= self.settings.prune_age);

    let fresh: Vec<ItemId> = ids
      .iter()
      .copied()
      .filter(|id| {
        last
          .get(id)
          .is_none_or(|at| now.saturating_duration_since(*at) >= self.settings.throttle)
      })
      .collect();

    for id in &fresh {
      last.insert(*id, now);
    }
    fresh
  }

  /// Ids currently remembered by the throttle.
  pub fn tracked(&self) -> usize {
    self.last_ping.lock().unwrap_or_else(PoisonError::into_inner).len()
  }

  async fn execute(&self, trigger: CycleTrigger) -> anyhow::Result<()> {
    tokio::time::sleep(self.settings.request_delay).await;

    let band = PriceBand::around_f64(trigger.price, self.settings.range_rate);
    let range = self
      .ranges
      .fetch_range(trigger.instrument, band)
      .await
      .with_context(|| format!("Safety range fetch failed for instrument {}", trigger.instrument))?;

    let candidates = range.all_ids();
    let to_ping = self.take_unthrottled(&candidates, Instant::now());
    if to_ping.is_empty() {
      debug!(candidates = candidates.len(), "Nothing to ping");
      return Ok(());
    }

    info!(candidates = candidates.len(), pinged = to_ping.len(), "Safety verify ping");
    ping_verify_detached(Arc::clone(&self.verifier), to_ping, Arc::clone(&self.metrics));
    Ok(())
  }
}

#[async_trait]
impl<R: RangeSource + ?Sized, V: VerifyService + ?Sized + 'static> CycleHandler
  for SafetyPinger<R, V>
{
  async fn run_cycle(&self, trigger: CycleTrigger) -> anyhow::Result<()> {
    let span = info_span!(
      "safety_cycle",
      cycle_id = %Uuid::new_v4(),
      instrument = trigger.instrument,
      price = %trigger.price
    );
    self.execute(trigger).instrument(span).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::range::RangeSnapshot;
  use crate::ports::error::ApiError;
  use crate::ports::verify::VerifyReport;

  struct NoRange;

  #[async_trait]
  impl RangeSource for NoRange {
    async fn fetch_range(&self, _: u32, _: PriceBand) -> Result<RangeSnapshot, ApiError> {
      Ok(RangeSnapshot::default())
    }
  }

  struct NoVerify;

  #[async_trait]
  impl VerifyService for NoVerify {
    async fn verify(&self, _: &[ItemId]) -> Option<VerifyReport> {
      None
    }
  }

  fn pinger() -> SafetyPinger<NoRange, NoVerify> {
    SafetyPinger::new(
      Arc::new(NoRange),
      Arc::new(NoVerify),
      SafetySettings::default(),
      Arc::new(MetricsRegistry::new().unwrap()),
    )
  }

  #[test]
  fn test_throttle_window() {
    let p = pinger();
    let t0 = Instant::now();

    assert_eq!(p.take_unthrottled(&[1, 2], t0), vec![1, 2]);
    assert_eq!(p.take_unthrottled(&[1, 2, 3], t0 + Duration::from_secs(30)), vec![3]);
    assert_eq!(p.take_unthrottled(&[1, 2, 3], t0 + Duration::from_secs(60)), vec![1, 2]);
  }

  #[test]
  fn test_prune_drops_old_entries() {
    let p = pinger();
    let t0 = Instant::now();
    p.take_unthrottled(&[1, 2, 3], t0);
    assert_eq!(p.tracked(), 3);

    p.take_unthrottled(&[], t0 + Duration::from_secs(601));
    assert_eq!(p.tracked(), 0);
  }
}
