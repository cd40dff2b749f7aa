//! Oracle freshness proof.

use alloy::hex;
use alloy::primitives::Bytes;

/// Opaque proof bytes bound to one instrument.
///
/// Always built from validated hex, so a `Proof` in hand is well-formed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof(Bytes);

impl Proof {
    /// Decode hex with or without a `0x` prefix.
    pub fn from_hex(raw: &str) -> Result<Self, hex::FromHexError> {
        let raw = raw.trim();
        let digits = raw.strip_prefix("0x").unwrap_or(raw);
        Ok(Self(Bytes::from(hex::decode(digits)?)))
    }

    /// `0x`-prefixed lowercase hex, as the executor expects.
    pub fn to_hex(&self) -> String {
        hex::encode_prefixed(&self.0)
    }

    /// Proof length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// An empty proof is never submitted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
