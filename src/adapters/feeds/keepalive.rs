//! Keepalive bookkeeping for one feed connection.
//!
//! A ping goes out every `interval`. If no pong arrives within `grace`
//! of the ping, the connection is considered dead.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Ping/pong state. Owned by a single session; rebuilt on reconnect.
#[derive(Debug, Clone)]
pub struct Keepalive {
    interval: Duration,
    grace: Duration,
    ping_sent_at: Option<Instant>,
}

impl Keepalive {
    pub fn new(interval: Duration, grace: Duration) -> Self {
        Self {
            interval,
            grace,
            ping_sent_at: None,
        }
    }

    /// Ping period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn on_ping_sent(&mut self, now: Instant) {
        self.ping_sent_at = Some(now);
    }

    pub fn on_pong(&mut self, now: Instant) {
        if let Some(sent) = self.ping_sent_at.take() {
            debug!(rtt_ms = now.saturating_duration_since(sent).as_millis() as u64, "Pong received");
        }
    }

    /// Whether a ping is waiting for its pong.
    pub fn awaiting_pong(&self) -> bool {
        self.ping_sent_at.is_some()
    }

    /// When the outstanding ping expires, if there is one.
    pub fn pong_deadline(&self) -> Option<Instant> {
        self.ping_sent_at.map(|sent| sent + self.grace)
    }

    pub fn is_overdue(&self, now: Instant) -> bool {
        self.pong_deadline().is_some_and(|deadline| now >= deadline)
    }
}
