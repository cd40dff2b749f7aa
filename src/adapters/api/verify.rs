//! Verify Service Adapter
//!
//! `GET {verify_base}/verify/<comma-separated ids>`. Every failure is
//! logged and reported as `None`, including a 200 answer with `ok: false`.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::client::{RestClient, join_url};
use crate::domain::instrument::ItemId;
use crate::ports::verify::{VerifyReport, VerifyService};

/// HTTP implementation of [`VerifyService`].
pub struct HttpVerifyService {
  client: Arc<RestClient>,
  base_url: String,
}

impl HttpVerifyService {
  pub fn new(client: Arc<RestClient>, base_url: impl Into<String>) -> Self {
    Self {
      client,
      base_url: base_url.into(),
    }
  }

  pub fn verify_url(&self, ids: &[ItemId]) -> String {
    let joined = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
    join_url(&self.base_url, &format!("verify/{joined}"))
  }
}

#[async_trait]
impl VerifyService for HttpVerifyService {
  async fn verify(&self, ids: &[ItemId]) -> Option<VerifyReport> {
    if ids.is_empty() {
      return None;
    }

    match self.client.get_json::<VerifyReport>(&self.verify_url(ids)).await {
      Ok(report) => {
        debug!(
          ids = ids.len(),
          ok = report.ok,
          checked = report.checked,
          updated = report.updated,
          mismatches = report.mismatches.len(),
          "Verify response"
        );
        healthy(report)
      }
      Err(e) => {
        warn!(error = %e, ids = ids.len(), "Verify failed");
        None
      }
    }
  }
}

/// Drop reports the service itself flags as unreliable.
fn healthy(report: VerifyReport) -> Option<VerifyReport> {
  if report.ok {
    Some(report)
  } else {
    warn!(checked = report.checked, "Verify service answered ok=false; ignoring report");
    None
  }
}
