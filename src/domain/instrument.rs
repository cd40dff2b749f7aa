//! Instrument catalogue and price updates.
//!
//! Instruments are defined once at startup from static configuration
//! and never change afterwards. The feed speaks in trading-pair names
//! (`btc_usdt`), everything downstream speaks in numeric instrument ids.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::*;
use serde_json::Value;

// ────────────────────────────────────────────
// Type aliases consumed by ports and adapters
// ────────────────────────────────────────────

/// Numeric instrument (pair index) identifier.
pub type InstrumentId = u32;

/// Identifier of a resting order, stop or liquidation record.
pub type ItemId = u64;

/// Quantized price bucket used for deduplication.
pub type PriceSlot = i64;

/// A tradable instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrument {
    /// Pair index understood by the oracle, range service and executor.
    pub id: InstrumentId,
    /// Feed symbol, lowercase (e.g. `btc_usdt`).
    pub pair: String,
    /// Human-readable name.
    pub name: String,
}

/// Immutable lookup from feed symbol to instrument.
#[derive(Debug, Clone, Default)]
pub struct InstrumentRegistry {
    by_pair: HashMap<String, Instrument>,
    /// Subscription order, as configured.
    pairs: Vec<String>,
}

impl InstrumentRegistry {
    /// Build the registry. Pair names are normalized to lowercase.
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let mut by_pair = HashMap::new();
        let mut pairs = Vec::new();

        for mut instrument in instruments {
            instrument.pair = instrument.pair.to_lowercase();
            if !by_pair.contains_key(&instrument.pair) {
                pairs.push(instrument.pair.clone());
            }
            by_pair.insert(instrument.pair.clone(), instrument);
        }

        Self { by_pair, pairs }
    }

    /// Resolve a feed symbol, case-insensitively.
    pub fn resolve(&self, pair: &str) -> Option<&Instrument> {
        self.by_pair.get(&pair.to_lowercase())
    }

    /// All configured feed symbols, in configuration order.
    pub fn pairs(&self) -> &[String] {
        &self.pairs
    }

    /// Number of configured instruments.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no instrument is configured.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

/// A validated price observation for one instrument.
#[derive(Debug, Clone)]
pub struct PriceUpdate {
    /// Instrument the price belongs to.
    pub instrument: InstrumentId,
    /// Strictly positive price.
    pub price: Decimal,
    /// Source timestamp, when the feed provides one.
    pub source_time: Option<DateTime<Utc>>,
}

/// Parse a feed price that may arrive as a JSON number or a string.
///
/// Returns `None` for anything that is not a strictly positive,
/// finite number.
pub fn parse_price(raw: &Value) -> Option<Decimal> {
    let price = match raw {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
                .or_else(|| n.as_f64().filter(|f| f.is_finite()).and_then(Decimal::from_f64))?
        }
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()?
        }
        _ => return None,
    };

    (price > Decimal::ZERO).then_some(price)
}

/// Below this a timestamp is read as Unix seconds (until year 2286).
const SECONDS_CUTOFF: i64 = 10_000_000_000;

/// Convert a feed timestamp in Unix seconds or milliseconds.
pub fn parse_source_time(raw: Option<&Value>) -> Option<DateTime<Utc>> {
    let value = raw?.as_i64()?;
    if value.abs() < SECONDS_CUTOFF {
        DateTime::from_timestamp(value, 0)
    } else {
        DateTime::from_timestamp_millis(value)
    }
}
