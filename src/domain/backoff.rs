//! Exponential backoff with optional multiplicative jitter.
//!
//! Used both for the proof retry loop (jittered) and for feed
//! reconnection (no jitter). The sleep for attempt `n` is
//! `min(max, base_n × j)` with `j ∈ [1 - jitter, 1 + jitter]`, and
//! the base grows as `base_{n+1} = min(max, base_n × factor)`.

use std::time::Duration;

use rand::Rng;

/// Backoff parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    /// First delay.
    pub initial: Duration,
    /// Growth factor applied after each failure (≥ 1).
    pub factor: f64,
    /// Upper bound for every delay.
    pub max: Duration,
    /// Relative jitter half-width, in `[0, 1)`.
    pub jitter: f64,
}

impl BackoffPolicy {
    /// Proof retry defaults: 200ms × 1.8, capped at 15s, ±30%.
    pub const PROOF: Self = Self {
        initial: Duration::from_millis(200),
        factor: 1.8,
        max: Duration::from_secs(15),
        jitter: 0.3,
    };

    /// Feed reconnect defaults: 5s × 1.5, capped at 60s, no jitter.
    pub const RECONNECT: Self = Self {
        initial: Duration::from_secs(5),
        factor: 1.5,
        max: Duration::from_secs(60),
        jitter: 0.0,
    };

    /// Start a fresh backoff sequence.
    pub fn start(&self) -> Backoff {
        Backoff::new(*self)
    }
}

/// Stateful backoff sequence.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    /// Current base delay in milliseconds.
    base_ms: f64,
}

impl Backoff {
    /// Create a sequence positioned at the initial delay.
    pub fn new(policy: BackoffPolicy) -> Self {
        let base_ms = policy.initial.as_secs_f64() * 1000.0;
        Self { policy, base_ms }
    }

    /// Current base delay, before jitter.
    pub fn current(&self) -> Duration {
        Duration::from_millis(self.base_ms.round() as u64)
    }

    /// Next delay using the thread-local RNG.
    pub fn next_delay(&mut self) -> Duration {
        self.next_delay_with(&mut rand::thread_rng())
    }

    /// Next delay drawing jitter from `rng`, then grow the base.
    pub fn next_delay_with<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        let max_ms = self.policy.max.as_secs_f64() * 1000.0;
        let jitter = self.policy.jitter.clamp(0.0, 0.999);

        let factor = if jitter > 0.0 {
            rng.gen_range(1.0 - jitter..=1.0 + jitter)
        } else {
            1.0
        };

        let sleep_ms = (self.base_ms * factor).min(max_ms).round();
        self.base_ms = (self.base_ms * self.policy.factor.max(1.0)).min(max_ms);

        Duration::from_millis(sleep_ms as u64)
    }

    /// Return to the initial delay.
    pub fn reset(&mut self) {
        self.base_ms = self.policy.initial.as_secs_f64() * 1000.0;
    }
}
