//! Proof Retry - Infinite Jittered Backoff
//!
//! A cycle cannot act without a fresh proof, and the proof service is
//! known to flap, so the fetch never gives up. Each call owns its own
//! backoff state.

use tracing::{info, warn};

use crate::adapters::metrics::MetricsRegistry;
use crate::domain::backoff::{Backoff, BackoffPolicy};
use crate::domain::instrument::InstrumentId;
use crate::domain::proof::Proof;
use crate::ports::proof::ProofSource;

/// Fetch a proof for `instrument`, sleeping per `policy` between failures.
///
/// Never returns an error. An empty proof counts as a failure.
pub async fn fetch_proof_forever<P: ProofSource + ?Sized>(
  source: &P,
  instrument: InstrumentId,
  policy: &BackoffPolicy,
  metrics: &MetricsRegistry,
) -> Proof {
  let mut backoff = Backoff::new(*policy);
  let mut failures: u32 = 0;

  loop {
    let error = match source.fetch_proof(instrument).await {
      Ok(proof) if !proof.is_empty() => {
        if failures > 0 {
          info!(instrument, failures, "Proof obtained after retries");
        }
        return proof;
      }
      Ok(_) => "empty proof".to_string(),
      Err(e) => e.to_string(),
    };

    failures += 1;
    metrics
      .proof_retries
      .with_label_values(&[&instrument.to_string()])
      .inc();

    let delay = backoff.next_delay();
    warn!(
      instrument,
      attempt = failures,
      error = %error,
      retry_in_ms = delay.as_millis() as u64,
      "Proof fetch failed"
    );
    tokio::time::sleep(delay).await;
  }
}
