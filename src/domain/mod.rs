//! Domain layer - Core keeper logic and models.
//!
//! Pure logic for the keeper: instrument identity, price quantization,
//! range classification, retry pacing, suppression bookkeeping and the
//! per-instrument cycle guard. No I/O happens here; adapters and
//! usecases drive these types.

pub mod backoff;
pub mod credential;
pub mod guard;
pub mod instrument;
pub mod proof;
pub mod range;
pub mod slot;
pub mod suppression;

// Re-export core types for convenience
pub use backoff::{Backoff, BackoffPolicy};
pub use credential::Credential;
pub use guard::{CycleGuard, CycleLease};
pub use instrument::{Instrument, InstrumentId, InstrumentRegistry, ItemId, PriceSlot, PriceUpdate};
pub use proof::Proof;
pub use range::{ExecMode, RangeSnapshot};
pub use slot::{PriceBand, SlotQuantizer};
pub use suppression::SuppressionStore;
