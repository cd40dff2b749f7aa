//! REST Request/Response Types
//!
//! Wire types for the range, verify and proof services. Ids stay as raw
//! JSON values here; classification in `domain::range` decides which
//! ones are usable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `GET /bucket/range` response. Missing arrays read as empty.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeResponse {
  #[serde(default, deserialize_with = "array_or_empty")]
  pub items_orders: Vec<Value>,
  #[serde(default, deserialize_with = "array_or_empty")]
  pub items_stops: Vec<Value>,
}

/// Proof request body.
#[derive(Debug, Clone, Serialize)]
pub struct ProofRequest {
  pub pair_indexes: Vec<u32>,
  pub chain_type: &'static str,
}

/// Proof response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProofResponse {
  #[serde(default)]
  pub proof_bytes: Option<String>,
}

/// Accept anything, keep it only if it is an array.
fn array_or_empty<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  Ok(match Value::deserialize(deserializer)? {
    Value::Array(items) => items,
    _ => Vec::new(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_range_response_tolerates_missing_and_non_array() {
    let r: RangeResponse = serde_json::from_str(r#"{"items_orders": null}"#).unwrap();
    assert!(r.items_orders.is_empty());
    assert!(r.items_stops.is_empty());

    let r: RangeResponse =
      serde_json::from_str(r#"{"items_orders": [{"id": 1}], "items_stops": "x"}"#).unwrap();
    assert_eq!(r.items_orders.len(), 1);
    assert!(r.items_stops.is_empty());
  }

  #[test]
  fn test_proof_request_shape() {
    let body = serde_json::to_value(ProofRequest { pair_indexes: vec![5500], chain_type: "evm" }).unwrap();
    assert_eq!(body, serde_json::json!({"pair_indexes": [5500], "chain_type": "evm"}));
  }
}
