//! Cycle Handler Port - Work Triggered by a New Price Slot

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::domain::instrument::{InstrumentId, PriceSlot};

/// A price update that opened a new slot for its instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleTrigger {
  pub instrument: InstrumentId,
  pub price: Decimal,
  pub slot: PriceSlot,
}

/// Runs one orchestration cycle.
///
/// The feed listener guarantees at most one call in flight per
/// instrument. Errors are logged by the listener and end the cycle.
#[async_trait]
pub trait CycleHandler: Send + Sync {
  async fn run_cycle(&self, trigger: CycleTrigger) -> anyhow::Result<()>;
}
