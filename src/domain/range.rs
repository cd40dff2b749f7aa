//! Range classification: candidate ids around a price.
//!
//! The range service returns raw order and stop records. This module
//! turns them into four deduplicated, ascending id lists, one per
//! execution mode.

use std::collections::BTreeSet;

use serde_json::Value;

use super::instrument::ItemId;

/// Execution category, mirrored 1:1 by the executor's CLI modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecMode {
    /// Fill resting limit orders.
    Limit,
    /// Trigger stop-losses.
    StopLoss,
    /// Trigger take-profits.
    TakeProfit,
    /// Liquidate under-collateralized positions.
    Liquidation,
}

impl ExecMode {
    /// All modes, in the order a cycle runs them.
    pub const ALL: [Self; 4] = [
        Self::Limit,
        Self::StopLoss,
        Self::TakeProfit,
        Self::Liquidation,
    ];

    /// Mode argument understood by the executor.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Limit => "limit",
            Self::StopLoss => "sl",
            Self::TakeProfit => "tp",
            Self::Liquidation => "liq",
        }
    }

    /// On-chain close reason for stop modes; `None` for limit fills.
    pub fn close_reason(self) -> Option<u8> {
        match self {
            Self::Limit => None,
            Self::StopLoss => Some(1),
            Self::TakeProfit => Some(2),
            Self::Liquidation => Some(3),
        }
    }

    /// Map a stop record's type tag, case-insensitively.
    pub fn from_stop_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "SL" => Some(Self::StopLoss),
            "TP" => Some(Self::TakeProfit),
            "LIQ" => Some(Self::Liquidation),
            _ => None,
        }
    }
}

impl std::fmt::Display for ExecMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate ids for one instrument around one price.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSnapshot {
    pub fill_ids: Vec<ItemId>,
    pub stop_loss_ids: Vec<ItemId>,
    pub take_profit_ids: Vec<ItemId>,
    pub liquidation_ids: Vec<ItemId>,
}

impl RangeSnapshot {
    /// Classify raw `items_orders` / `items_stops` records.
    pub fn classify(orders: &[Value], stops: &[Value]) -> Self {
        let fill_ids = uniq_sorted(orders.iter().filter_map(|o| item_id(o.get("id")?)));

        let mut sl = BTreeSet::new();
        let mut tp = BTreeSet::new();
        let mut liq = BTreeSet::new();

        for stop in stops {
            let Some(id) = stop.get("id").and_then(item_id) else {
                continue;
            };
            let tag = match stop.get("type") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => continue,
            };
            match ExecMode::from_stop_tag(&tag) {
                Some(ExecMode::StopLoss) => {
                    sl.insert(id);
                }
                Some(ExecMode::TakeProfit) => {
                    tp.insert(id);
                }
                Some(ExecMode::Liquidation) => {
                    liq.insert(id);
                }
                _ => {}
            }
        }

        Self {
            fill_ids,
            stop_loss_ids: sl.into_iter().collect(),
            take_profit_ids: tp.into_iter().collect(),
            liquidation_ids: liq.into_iter().collect(),
        }
    }

    /// Ids for one execution mode.
    pub fn ids(&self, mode: ExecMode) -> &[ItemId] {
        match mode {
            ExecMode::Limit => &self.fill_ids,
            ExecMode::StopLoss => &self.stop_loss_ids,
            ExecMode::TakeProfit => &self.take_profit_ids,
            ExecMode::Liquidation => &self.liquidation_ids,
        }
    }

    /// Every candidate, deduplicated and ascending.
    pub fn all_ids(&self) -> Vec<ItemId> {
        uniq_sorted(
            ExecMode::ALL
                .iter()
                .flat_map(|m| self.ids(*m).iter().copied()),
        )
    }

    /// Whether no mode has any candidate.
    pub fn is_empty(&self) -> bool {
        ExecMode::ALL.iter().all(|m| self.ids(*m).is_empty())
    }
}

/// Deduplicate and sort ascending.
pub fn uniq_sorted(ids: impl IntoIterator<Item = ItemId>) -> Vec<ItemId> {
    ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}

/// Accept non-negative integers, either as JSON numbers or numeric strings.
fn item_id(raw: &Value) -> Option<ItemId> {
    match raw {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_classify_scenario() {
        let orders = vec![json!({"id": 10})];
        let stops = vec![json!({"id": 11, "type": "SL"}), json!({"id": 12, "type": "TP"})];

        let snap = RangeSnapshot::classify(&orders, &stops);

        assert_eq!(snap.fill_ids, vec![10]);
        assert_eq!(snap.stop_loss_ids, vec![11]);
        assert_eq!(snap.take_profit_ids, vec![12]);
        assert!(snap.liquidation_ids.is_empty());
    }

    #[test]
    fn test_classify_dedups_sorts_and_drops_unknown_tags() {
        let orders = vec![json!({"id": 7}), json!({"id": "3"}), json!({"id": 7}), json!({"id": -1})];
        let stops = vec![
            json!({"id": 5, "type": "liq"}),
            json!({"id": 2, "type": "Liq"}),
            json!({"id": 9, "type": "trailing"}),
            json!({"id": 4}),
        ];

        let snap = RangeSnapshot::classify(&orders, &stops);

        assert_eq!(snap.fill_ids, vec![3, 7]);
        assert_eq!(snap.liquidation_ids, vec![2, 5]);
        assert!(snap.stop_loss_ids.is_empty());
        assert_eq!(snap.all_ids(), vec![2, 3, 5, 7]);
    }

    #[test]
    fn test_mode_strings_and_reasons() {
        assert_eq!(ExecMode::Limit.as_str(), "limit");
        assert_eq!(ExecMode::Liquidation.to_string(), "liq");
        assert_eq!(ExecMode::Limit.close_reason(), None);
        assert_eq!(ExecMode::TakeProfit.close_reason(), Some(2));
        assert_eq!(ExecMode::from_stop_tag(" tp "), Some(ExecMode::TakeProfit));
    }
}
