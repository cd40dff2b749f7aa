//! Prometheus Metrics Registry - Keeper Observability
//!
//! Registers and exposes Prometheus metrics on :9090. Covers feed
//! health, cycle outcomes, executor latency, proof retries and the
//! suppression state machine.

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use tokio::sync::broadcast;
use tracing::{info, instrument, warn};

/// Centralized Prometheus metrics for the keeper.
///
/// All metrics follow the naming convention `keeper_*`. Each instance
/// owns its registry, so tests can build as many as they like.
pub struct MetricsRegistry {
    /// Prometheus registry.
    registry: Registry,
    /// Price updates by listener and outcome.
    pub price_updates: IntCounterVec,
    /// Completed cycles by listener and result.
    pub cycles: IntCounterVec,
    /// Cycle wall time (seconds).
    pub cycle_duration_seconds: HistogramVec,
    /// Executor invocations by mode and result.
    pub executor_calls: IntCounterVec,
    /// Executor latency (milliseconds).
    pub executor_latency_ms: HistogramVec,
    /// Dispatches skipped before reaching the executor, by reason.
    pub dispatch_skips: IntCounterVec,
    /// Suppression store writes by action (increment, clear).
    pub suppression_changes: IntCounterVec,
    /// Ids currently at or above the clean-skip limit.
    pub suppressed_ids: IntGauge,
    /// Failed proof attempts by instrument.
    pub proof_retries: IntCounterVec,
    /// Detached verify pings by outcome.
    pub verify_pings: IntCounterVec,
    /// Feed connection status (1 = connected, 0 = disconnected).
    pub feed_connected: IntGaugeVec,
    /// Feed reconnect attempts.
    pub feed_reconnects: IntCounterVec,
}

impl MetricsRegistry {
    /// Create and register all Prometheus metrics.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let price_updates = IntCounterVec::new(
            Opts::new("keeper_price_updates_total", "Price updates by outcome"),
            &["listener", "outcome"],
        )?;

        let cycles = IntCounterVec::new(
            Opts::new("keeper_cycles_total", "Orchestration cycles by result"),
            &["listener", "result"],
        )?;

        let cycle_duration_seconds = HistogramVec::new(
            HistogramOpts::new("keeper_cycle_duration_seconds", "Cycle wall time in seconds")
                .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
            &["listener"],
        )?;

        let executor_calls = IntCounterVec::new(
            Opts::new("keeper_executor_calls_total", "Executor invocations by result"),
            &["mode", "result"],
        )?;

        let executor_latency_ms = HistogramVec::new(
            HistogramOpts::new("keeper_executor_latency_ms", "Executor latency in milliseconds")
                .buckets(vec![
                    100.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0, 30000.0, 60000.0,
                ]),
            &["mode"],
        )?;

        let dispatch_skips = IntCounterVec::new(
            Opts::new("keeper_dispatch_skips_total", "Dispatches skipped before execution"),
            &["reason"],
        )?;

        let suppression_changes = IntCounterVec::new(
            Opts::new("keeper_suppression_changes_total", "Suppression store writes"),
            &["action"],
        )?;

        let suppressed_ids = IntGauge::new(
            "keeper_suppressed_ids",
            "Ids at or above the clean-skip limit",
        )?;

        let proof_retries = IntCounterVec::new(
            Opts::new("keeper_proof_retries_total", "Failed proof fetch attempts"),
            &["instrument"],
        )?;

        let verify_pings = IntCounterVec::new(
            Opts::new("keeper_verify_pings_total", "Detached verify pings by outcome"),
            &["outcome"],
        )?;

        let feed_connected = IntGaugeVec::new(
            Opts::new(
                "keeper_feed_connected",
                "Feed connection status (1=connected, 0=disconnected)",
            ),
            &["listener"],
        )?;

        let feed_reconnects = IntCounterVec::new(
            Opts::new("keeper_feed_reconnects_total", "Feed reconnect attempts"),
            &["listener"],
        )?;

        // Register all metrics
        registry.register(Box::new(price_updates.clone()))?;
        registry.register(Box::new(cycles.clone()))?;
        registry.register(Box::new(cycle_duration_seconds.clone()))?;
        registry.register(Box::new(executor_calls.clone()))?;
        registry.register(Box::new(executor_latency_ms.clone()))?;
        registry.register(Box::new(dispatch_skips.clone()))?;
        registry.register(Box::new(suppression_changes.clone()))?;
        registry.register(Box::new(suppressed_ids.clone()))?;
        registry.register(Box::new(proof_retries.clone()))?;
        registry.register(Box::new(verify_pings.clone()))?;
        registry.register(Box::new(feed_connected.clone()))?;
        registry.register(Box::new(feed_reconnects.clone()))?;

        Ok(Self {
            registry,
            price_updates,
            cycles,
            cycle_duration_seconds,
            executor_calls,
            executor_latency_ms,
            dispatch_skips,
            suppression_changes,
            suppressed_ids,
            proof_retries,
            verify_pings,
            feed_connected,
            feed_reconnects,
        })
    }

    /// Text exposition of every registered metric.
    pub fn render(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    /// Serve Prometheus metrics on the configured bind address.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn serve(
        self: Arc<Self>,
        bind_address: String,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let metrics_self = Arc::clone(&self);

        let app = Router::new().route(
            "/metrics",
            get(move || {
                let metrics = Arc::clone(&metrics_self);
                async move {
                    match metrics.render() {
                        Ok(body) => (StatusCode::OK, body),
                        Err(e) => {
                            warn!(error = %e, "Failed to encode metrics");
                            (StatusCode::INTERNAL_SERVER_ERROR, String::new())
                        }
                    }
                }
            }),
        );

        let listener = tokio::net::TcpListener::bind(&bind_address).await?;
        info!(address = %bind_address, "Prometheus metrics server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_contains_keeper_metrics() {
        let metrics = MetricsRegistry::new().unwrap();
        metrics.cycles.with_label_values(&["keeper", "ok"]).inc();
        metrics.suppressed_ids.set(2);

        let text = metrics.render().unwrap();
        assert!(text.contains("keeper_cycles_total"));
        assert!(text.contains("keeper_suppressed_ids 2"));
    }

    #[test]
    fn test_instances_are_independent() {
        let a = MetricsRegistry::new().unwrap();
        let b = MetricsRegistry::new().unwrap();
        a.feed_reconnects.with_label_values(&["keeper"]).inc();
        assert_eq!(b.feed_reconnects.with_label_values(&["keeper"]).get(), 0);
    }
}
