//! Oracle Proof Client
//!
//! `POST <endpoint>` with `{"pair_indexes":[id],"chain_type":"evm"}`,
//! answered by `{"proof_bytes":"<hex>"}`. One attempt per call; the
//! caller owns retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::adapters::api::client::RestClient;
use crate::adapters::api::types::{ProofRequest, ProofResponse};
use crate::domain::instrument::InstrumentId;
use crate::domain::proof::Proof;
use crate::ports::error::ProofError;
use crate::ports::proof::ProofSource;

const CHAIN_TYPE: &str = "evm";

/// HTTP implementation of [`ProofSource`].
pub struct HttpProofClient {
    client: Arc<RestClient>,
    endpoint: String,
    timeout: Duration,
}

impl HttpProofClient {
    pub fn new(client: Arc<RestClient>, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProofSource for HttpProofClient {
    #[instrument(skip(self))]
    async fn fetch_proof(&self, instrument: InstrumentId) -> Result<Proof, ProofError> {
        let body = ProofRequest {
            pair_indexes: vec![instrument],
            chain_type: CHAIN_TYPE,
        };
        let response: ProofResponse = self
            .client
            .post_json(&self.endpoint, &body, Some(self.timeout))
            .await?;
        let proof = decode_proof(response)?;
        debug!(len = proof.len(), "Proof fetched");
        Ok(proof)
    }
}

/// Validate the `proof_bytes` field.
pub fn decode_proof(response: ProofResponse) -> Result<Proof, ProofError> {
    let raw = response
        .proof_bytes
        .filter(|s| !s.trim().is_empty() && s.trim() != "0x")
        .ok_or(ProofError::Missing)?;
    Proof::from_hex(&raw).map_err(|e| ProofError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(bytes: Option<&str>) -> ProofResponse {
        ProofResponse {
            proof_bytes: bytes.map(Into::into),
        }
    }

    #[test]
    fn test_decode_with_and_without_prefix() {
        assert_eq!(decode_proof(response(Some("0xabcd"))).unwrap().to_hex(), "0xabcd");
        assert_eq!(decode_proof(response(Some("abcd"))).unwrap().len(), 2);
    }

    #[test]
    fn test_missing_and_empty_are_missing() {
        assert!(matches!(decode_proof(response(None)), Err(ProofError::Missing)));
        assert!(matches!(decode_proof(response(Some(""))), Err(ProofError::Missing)));
        assert!(matches!(decode_proof(response(Some("0x"))), Err(ProofError::Missing)));
    }

    #[test]
    fn test_non_hex_is_malformed() {
        assert!(matches!(
            decode_proof(response(Some("0xnothex"))),
            Err(ProofError::Malformed(_))
        ));
    }
}
