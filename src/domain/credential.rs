//! Signing credential handed to the executor.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

/// Private key material for one instrument.
///
/// Debug output is redacted by `SecretString`; the raw value is only
/// exposed when building the executor command line.
#[derive(Debug, Clone)]
pub struct Credential(Arc<SecretString>);

impl Credential {
    /// Wrap a raw key. Surrounding whitespace is trimmed.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(Arc::new(SecretString::from(raw.as_ref().trim().to_owned())))
    }

    /// The raw key material.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// An empty credential counts as missing.
    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }
}
