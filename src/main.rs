//! Oracle Keeper Bot - Entry Point
//!
//! Initializes configuration, logging and adapters, then runs the
//! keeper feed listener (and optionally the safety listener) until
//! SIGINT.
//!
//! Wiring sequence:
//! 1. Load `.env`, then config.toml (`KEEPER_CONFIG` overrides the path) + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Resolve per-instrument signing credentials (PK_<id>, PRIVATE_KEY)
//! 4. Create RestClient (timeout + concurrency cap + rate limit)
//! 5. Create range/verify/proof adapters and the executor
//! 6. Spawn metrics server and health server (/live + /ready)
//! 7. Spawn keeper listener (4-decimal slots)
//! 8. Spawn safety listener (3-decimal slots) when enabled
//! 9. Wait for SIGINT, then broadcast shutdown

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use oracle_keeper_bot::adapters::api::{HttpRangeSource, HttpVerifyService, RestClient, RestClientConfig};
use oracle_keeper_bot::adapters::executor::{DryRunExecutor, SubprocessExecutor, SubprocessExecutorConfig};
use oracle_keeper_bot::adapters::feeds::{FeedListener, FeedListenerConfig};
use oracle_keeper_bot::adapters::metrics::{HealthServer, HealthState, MetricsRegistry};
use oracle_keeper_bot::adapters::oracle::HttpProofClient;
use oracle_keeper_bot::config::{self, credentials::CredentialStore};
use oracle_keeper_bot::domain::instrument::InstrumentRegistry;
use oracle_keeper_bot::domain::suppression::SuppressionStore;
use oracle_keeper_bot::ports::executor::TxExecutor;
use oracle_keeper_bot::usecases::{
  BatchDispatcher, DispatchSettings, KeeperCycle, KeeperSettings, SafetyPinger, SafetySettings,
};

const ENV_CONFIG_PATH: &str = "KEEPER_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
  // ── 1. Load .env and configuration ──────────────────────
  dotenv::dotenv().ok();
  let config_path = std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| "config.toml".to_string());
  let config = config::loader::load_config(&config_path)
    .with_context(|| format!("Failed to load configuration from {config_path}"))?;

  // ── 2. Initialize structured JSON logging ───────────────
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.bot.log_level)),
    )
    .json()
    .init();

  info!(
    name = %config.bot.name,
    version = env!("CARGO_PKG_VERSION"),
    dry_run = config.bot.dry_run,
    instruments = config.instruments.len(),
    safety = config.safety.enabled,
    "Starting Oracle Keeper Bot"
  );

  let registry = Arc::new(InstrumentRegistry::new(
    config.instruments.iter().map(config::InstrumentConfig::to_instrument),
  ));

  // ── 3. Signing credentials ──────────────────────────────
  let credentials = Arc::new(CredentialStore::from_env(
    config.instruments.iter().map(|i| i.id),
  ));
  if credentials.len() < config.instruments.len() {
    warn!(
      resolved = credentials.len(),
      instruments = config.instruments.len(),
      "Some instruments have no signing key; their dispatches will be skipped"
    );
  }

  let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);
  let metrics = Arc::new(MetricsRegistry::new().context("Failed to create metrics registry")?);
  let health = Arc::new(HealthState::new());

  // ── 4. Shared REST client ───────────────────────────────
  let rest = Arc::new(
    RestClient::new(RestClientConfig {
      timeout: Duration::from_millis(config.api.timeout_ms),
      max_concurrent: config.api.max_concurrent,
      max_requests_per_second: config.api.max_requests_per_second,
    })
    .context("Failed to create REST client")?,
  );

  // ── 5. Adapters ─────────────────────────────────────────
  let ranges = Arc::new(HttpRangeSource::new(Arc::clone(&rest), config.api.base_url.clone()));
  let verifier = Arc::new(HttpVerifyService::new(
    Arc::clone(&rest),
    config.api.verify_base_url.clone(),
  ));
  let proofs = Arc::new(HttpProofClient::new(
    Arc::clone(&rest),
    config.proof.endpoint.clone(),
    Duration::from_millis(config.proof.timeout_ms),
  ));

  let executor: Arc<dyn TxExecutor> = if config.bot.dry_run {
    warn!("Dry-run mode: batches are logged, NO transactions are sent");
    Arc::new(DryRunExecutor)
  } else {
    let contract = config
      .executor
      .contract_address
      .parse()
      .context("Invalid executor.contract_address")?;
    Arc::new(SubprocessExecutor::new(SubprocessExecutorConfig {
      program: config.executor.program.clone(),
      script: config.executor.script.clone(),
      contract,
      rpc_url: config.executor.rpc_url.clone(),
      timeout: Duration::from_millis(config.executor.timeout_ms),
    }))
  };

  let suppression = Arc::new(SuppressionStore::new(
    config.dispatch.clean_skip_limit,
    config.dispatch.max_slots_per_instrument,
  ));
  let dispatcher = Arc::new(BatchDispatcher::new(
    executor,
    Arc::clone(&verifier),
    suppression,
    DispatchSettings {
      batch_size: config.dispatch.batch_size,
      inter_batch_delay: Duration::from_millis(config.dispatch.inter_batch_delay_ms),
    },
    Arc::clone(&metrics),
  ));

  // ── 6. Metrics and health servers ───────────────────────
  let mut handles = Vec::new();
  if config.metrics.enabled {
    let metrics_ref = Arc::clone(&metrics);
    let bind = config.metrics.bind_address.clone();
    let rx = shutdown_tx.subscribe();
    handles.push(tokio::spawn(async move {
      if let Err(e) = metrics_ref.serve(bind, rx).await {
        error!(error = %e, "Metrics server failed");
      }
    }));
  }
  let health_server = HealthServer::new(Arc::clone(&health), config.metrics.health_port);
  let health_rx = shutdown_tx.subscribe();
  handles.push(tokio::spawn(async move {
    if let Err(e) = health_server.run(health_rx).await {
      error!(error = %e, "Health server failed");
    }
  }));

  // ── 7. Keeper listener ──────────────────────────────────
  let keeper = Arc::new(KeeperCycle::new(
    proofs,
    Arc::clone(&ranges),
    dispatcher,
    credentials,
    KeeperSettings {
      range_rate: config.dispatch.range_rate,
      request_delay: Duration::from_millis(config.dispatch.request_delay_ms),
      proof_policy: config.proof.retry_policy(),
    },
    Arc::clone(&metrics),
  ));
  let keeper_listener = FeedListener::new(
    FeedListenerConfig::from_feed("keeper", &config.feed),
    Arc::clone(&registry),
    keeper,
    Arc::clone(&metrics),
    Arc::clone(&health.keeper_feed_connected),
  );
  let keeper_rx = shutdown_tx.subscribe();
  handles.push(tokio::spawn(async move {
    if let Err(e) = keeper_listener.run(keeper_rx).await {
      error!(error = %e, "Keeper listener failed");
    }
  }));

  // ── 8. Safety listener ──────────────────────────────────
  if config.safety.enabled {
    let pinger = Arc::new(SafetyPinger::new(
      ranges,
      verifier,
      SafetySettings {
        range_rate: config.safety.range_rate,
        request_delay: Duration::from_millis(config.dispatch.request_delay_ms),
        throttle: Duration::from_secs(config.safety.throttle_secs),
        prune_age: Duration::from_secs(config.safety.prune_age_secs),
      },
      Arc::clone(&metrics),
    ));
    let safety_listener = FeedListener::new(
      FeedListenerConfig::from_feed("safety", &config.feed)
        .with_slot_decimals(config.safety.slot_decimals),
      registry,
      pinger,
      Arc::clone(&metrics),
      Arc::clone(&health.safety_feed_connected),
    );
    let safety_rx = shutdown_tx.subscribe();
    handles.push(tokio::spawn(async move {
      if let Err(e) = safety_listener.run(safety_rx).await {
        error!(error = %e, "Safety listener failed");
      }
    }));
  }

  info!(tasks = handles.len(), "All tasks spawned, keeper is running");

  // ── 9. Wait for SIGINT ──────────────────────────────────
  if let Err(e) = signal::ctrl_c().await {
    error!(error = %e, "Failed to listen for SIGINT");
  }
  info!("SIGINT received, initiating graceful shutdown");
  let _ = shutdown_tx.send(());

  for handle in handles {
    if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
      warn!("Task did not stop within 5s");
    }
  }

  info!("Shutdown complete");
  Ok(())
}
