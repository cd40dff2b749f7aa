//! Per-instrument signing credentials.
//!
//! Resolved once at startup: `PK_<instrument id>` wins, otherwise the
//! shared `PRIVATE_KEY`. A missing credential is not fatal; dispatch
//! for that instrument is skipped and logged instead.

use std::collections::HashMap;

use tracing::warn;

use crate::domain::credential::Credential;
use crate::domain::instrument::InstrumentId;

/// Shared fallback key.
pub const ENV_PRIVATE_KEY: &str = "PRIVATE_KEY";

/// Per-instrument key variable, e.g. `PK_5500`.
pub fn instrument_key_var(instrument: InstrumentId) -> String {
  format!("PK_{instrument}")
}

/// Credentials keyed by instrument.
#[derive(Debug, Clone, Default)]
pub struct CredentialStore {
  by_instrument: HashMap<InstrumentId, Credential>,
}

impl CredentialStore {
  /// Resolve credentials for `instruments` from the process environment.
  pub fn from_env(instruments: impl IntoIterator<Item = InstrumentId>) -> Self {
    Self::resolve(instruments, |key| std::env::var(key).ok())
  }

  /// Resolve credentials with an injected lookup.
  pub fn resolve(
    instruments: impl IntoIterator<Item = InstrumentId>,
    lookup: impl Fn(&str) -> Option<String>,
  ) -> Self {
    let fallback = lookup(ENV_PRIVATE_KEY)
      .map(Credential::new)
      .filter(|c| !c.is_empty());

    let mut by_instrument = HashMap::new();
    for id in instruments {
      let specific = lookup(&instrument_key_var(id))
        .map(Credential::new)
        .filter(|c| !c.is_empty());

      match specific.or_else(|| fallback.clone()) {
        Some(credential) => {
          by_instrument.insert(id, credential);
        }
        None => warn!(instrument = id, "No credential configured; dispatch will be skipped"),
      }
    }

    Self { by_instrument }
  }

  /// Credential for one instrument.
  pub fn get(&self, instrument: InstrumentId) -> Option<Credential> {
    self.by_instrument.get(&instrument).cloned()
  }

  /// Number of instruments with a credential.
  pub fn len(&self) -> usize {
    self.by_instrument.len()
  }

  pub fn is_empty(&self) -> bool {
    self.by_instrument.is_empty()
  }
}
