//! Price quantization and search bands.
//!
//! A price slot is `round(price × 10^decimals)` using half-away-from-zero
//! rounding. Updates mapping to the same slot for the same instrument are
//! equivalent. Bands are computed in `Decimal` so the range query sees
//! exactly the bounds we intended.

use rust_decimal::prelude::*;
use rust_decimal::{Decimal, RoundingStrategy};

use super::instrument::PriceSlot;

/// Quantizes prices into integer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotQuantizer {
    decimals: u32,
    scale: Decimal,
}

impl SlotQuantizer {
    /// Largest supported number of decimals.
    pub const MAX_DECIMALS: u32 = 12;

    /// Create a quantizer keeping `decimals` fractional digits.
    ///
    /// `decimals` is clamped to [`Self::MAX_DECIMALS`].
    pub fn new(decimals: u32) -> Self {
        let decimals = decimals.min(Self::MAX_DECIMALS);
        Self {
            decimals,
            scale: Decimal::from(10i64.pow(decimals)),
        }
    }

    /// Fractional digits kept by this quantizer.
    pub fn decimals(&self) -> u32 {
        self.decimals
    }

    /// Map a price to its slot. `None` on overflow.
    pub fn slot(&self, price: Decimal) -> Option<PriceSlot> {
        price
            .checked_mul(self.scale)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_i64()
    }
}

/// Symmetric relative band `[price × (1 - rate), price × (1 + rate)]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBand {
    /// Lower bound (inclusive).
    pub from: Decimal,
    /// Upper bound (inclusive).
    pub to: Decimal,
}

impl PriceBand {
    /// Build the band around `price` with relative half-width `rate`.
    pub fn around(price: Decimal, rate: Decimal) -> Self {
        Self {
            from: price * (Decimal::ONE - rate),
            to: price * (Decimal::ONE + rate),
        }
    }

    /// Convenience for rates held as `f64` in configuration.
    pub fn around_f64(price: Decimal, rate: f64) -> Self {
        // Shortest decimal rendering first, so 0.001 stays 0.001.
        let rate = Decimal::from_str(&rate.to_string())
            .ok()
            .or_else(|| Decimal::from_f64(rate))
            .unwrap_or(Decimal::ZERO);
        Self::around(price, rate)
    }
}
