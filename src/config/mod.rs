//! Configuration Module - TOML-based Keeper Configuration
//!
//! Loads and validates configuration from `config.toml` with
//! environment variable overrides via `.env` files.
//! Endpoints, the contract address and every pacing constant are
//! externalized here - nothing is hardcoded in the domain layer.

pub mod credentials;
pub mod loader;

use std::time::Duration;

use serde::Deserialize;

use crate::domain::backoff::BackoffPolicy;
use crate::domain::instrument::{Instrument, InstrumentId};

/// Top-level keeper configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any connection is opened.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Bot identity and metadata.
  pub bot: BotConfig,
  /// Streaming price feed.
  pub feed: FeedConfig,
  /// Range and verify REST services.
  pub api: ApiConfig,
  /// Oracle proof service.
  #[serde(default)]
  pub proof: ProofConfig,
  /// Transaction executor.
  pub executor: ExecutorConfig,
  /// Batch dispatch and suppression tuning.
  #[serde(default)]
  pub dispatch: DispatchConfig,
  /// Optional safety verifier listener.
  #[serde(default)]
  pub safety: SafetyConfig,
  /// Metrics and monitoring.
  #[serde(default)]
  pub metrics: MetricsConfig,
  /// Instruments to watch.
  pub instruments: Vec<InstrumentConfig>,
}

/// Bot identity configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
  /// Human-readable bot name.
  pub name: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Log executor calls instead of running them.
  #[serde(default)]
  pub dry_run: bool,
}

/// Price feed configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
  /// WebSocket endpoint.
  pub ws_url: String,
  /// Sent as `x-api-key`. Overridden by `SUPRA_WS_API_KEY`.
  #[serde(default)]
  pub api_key: String,
  /// Subscription channel name.
  #[serde(default = "default_channel")]
  pub channel: String,
  /// Candle resolution requested on subscribe.
  #[serde(default = "default_resolution")]
  pub resolution: u32,
  /// Fractional digits kept when quantizing prices.
  #[serde(default = "default_slot_decimals")]
  pub slot_decimals: u32,
  #[serde(default = "default_reconnect_initial")]
  pub reconnect_initial_ms: u64,
  #[serde(default = "default_reconnect_factor")]
  pub reconnect_factor: f64,
  #[serde(default = "default_reconnect_max")]
  pub reconnect_max_ms: u64,
  /// Keepalive ping period.
  #[serde(default = "default_ping_interval")]
  pub ping_interval_ms: u64,
  /// How long to wait for a pong before dropping the connection.
  #[serde(default = "default_pong_grace")]
  pub pong_grace_ms: u64,
  /// Deadline for the WebSocket handshake plus the subscribe frame.
  #[serde(default = "default_connect_timeout")]
  pub connect_timeout_ms: u64,
}

impl FeedConfig {
  /// Reconnect backoff (no jitter).
  pub fn reconnect_policy(&self) -> BackoffPolicy {
    BackoffPolicy {
      initial: Duration::from_millis(self.reconnect_initial_ms),
      factor: self.reconnect_factor,
      max: Duration::from_millis(self.reconnect_max_ms),
      jitter: 0.0,
    }
  }

  pub fn ping_interval(&self) -> Duration {
    Duration::from_millis(self.ping_interval_ms)
  }

  pub fn pong_grace(&self) -> Duration {
    Duration::from_millis(self.pong_grace_ms)
  }

  pub fn connect_timeout(&self) -> Duration {
    Duration::from_millis(self.connect_timeout_ms)
  }
}

/// Range / verify service configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Range service base URL.
  pub base_url: String,
  /// Verify service base URL.
  pub verify_base_url: String,
  /// Per-request timeout (milliseconds).
  #[serde(default = "default_api_timeout")]
  pub timeout_ms: u64,
  /// Maximum requests in flight.
  #[serde(default = "default_max_concurrent")]
  pub max_concurrent: usize,
  /// Request-rate ceiling shared by range and verify calls.
  #[serde(default = "default_max_rps")]
  pub max_requests_per_second: u32,
}

/// Oracle proof configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProofConfig {
  /// Proof endpoint. Overridden by `SUPRA_PROOF_URL`.
  #[serde(default)]
  pub endpoint: String,
  #[serde(default = "default_proof_timeout")]
  pub timeout_ms: u64,
  #[serde(default = "default_proof_initial")]
  pub initial_delay_ms: u64,
  #[serde(default = "default_proof_factor")]
  pub backoff_factor: f64,
  #[serde(default = "default_proof_max")]
  pub max_delay_ms: u64,
  /// Relative jitter half-width in [0, 1).
  #[serde(default = "default_proof_jitter")]
  pub jitter: f64,
}

impl ProofConfig {
  /// Retry policy for `fetch_proof_forever`.
  pub fn retry_policy(&self) -> BackoffPolicy {
    BackoffPolicy {
      initial: Duration::from_millis(self.initial_delay_ms),
      factor: self.backoff_factor,
      max: Duration::from_millis(self.max_delay_ms),
      jitter: self.jitter,
    }
  }
}

impl Default for ProofConfig {
  fn default() -> Self {
    Self {
      endpoint: String::new(),
      timeout_ms: default_proof_timeout(),
      initial_delay_ms: default_proof_initial(),
      backoff_factor: default_proof_factor(),
      max_delay_ms: default_proof_max(),
      jitter: default_proof_jitter(),
    }
  }
}

/// Executor subprocess configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
  /// Program to run (e.g. `node`).
  #[serde(default = "default_executor_program")]
  pub program: String,
  /// Script passed as the first argument, if any.
  #[serde(default)]
  pub script: Option<String>,
  /// Target contract, `0x`-prefixed.
  pub contract_address: String,
  /// Chain RPC endpoint handed to the executor.
  pub rpc_url: String,
  /// Kill the executor after this long.
  #[serde(default = "default_executor_timeout")]
  pub timeout_ms: u64,
}

/// Dispatch and suppression tuning.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
  /// Relative half-width of the keeper's range band.
  #[serde(default = "default_range_rate")]
  pub range_rate: f64,
  /// Maximum ids per executor invocation.
  #[serde(default = "default_batch_size")]
  pub batch_size: usize,
  #[serde(default = "default_inter_batch_delay")]
  pub inter_batch_delay_ms: u64,
  /// Pause between the proof fetch and the range fetch.
  #[serde(default = "default_request_delay")]
  pub request_delay_ms: u64,
  /// Consecutive verified no-ops before an id is suppressed.
  #[serde(default = "default_clean_skip_limit")]
  pub clean_skip_limit: u32,
  /// Slot buckets retained per instrument.
  #[serde(default = "default_max_slots")]
  pub max_slots_per_instrument: usize,
}

impl Default for DispatchConfig {
  fn default() -> Self {
    Self {
      range_rate: default_range_rate(),
      batch_size: default_batch_size(),
      inter_batch_delay_ms: default_inter_batch_delay(),
      request_delay_ms: default_request_delay(),
      clean_skip_limit: default_clean_skip_limit(),
      max_slots_per_instrument: default_max_slots(),
    }
  }
}

/// Safety verifier configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SafetyConfig {
  #[serde(default)]
  pub enabled: bool,
  #[serde(default = "default_safety_rate")]
  pub range_rate: f64,
  #[serde(default = "default_safety_decimals")]
  pub slot_decimals: u32,
  /// Minimum seconds between two pings of the same id.
  #[serde(default = "default_throttle_secs")]
  pub throttle_secs: u64,
  /// Throttle entries older than this are forgotten.
  #[serde(default = "default_prune_age_secs")]
  pub prune_age_secs: u64,
}

impl Default for SafetyConfig {
  fn default() -> Self {
    Self {
      enabled: false,
      range_rate: default_safety_rate(),
      slot_decimals: default_safety_decimals(),
      throttle_secs: default_throttle_secs(),
      prune_age_secs: default_prune_age_secs(),
    }
  }
}

/// Metrics and monitoring configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
  /// Enable Prometheus metrics export.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Metrics server bind address.
  #[serde(default = "default_metrics_addr")]
  pub bind_address: String,
  /// Health check endpoint port.
  #[serde(default = "default_health_port")]
  pub health_port: u16,
}

impl Default for MetricsConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      bind_address: default_metrics_addr(),
      health_port: default_health_port(),
    }
  }
}

/// One watched instrument.
#[derive(Debug, Clone, Deserialize)]
pub struct InstrumentConfig {
  /// Feed symbol, e.g. `btc_usdt`.
  pub pair: String,
  /// Pair index.
  pub id: InstrumentId,
  /// Display name; defaults to the upper-cased pair.
  #[serde(default)]
  pub name: String,
}

impl InstrumentConfig {
  pub fn to_instrument(&self) -> Instrument {
    let name = if self.name.is_empty() {
      self.pair.to_uppercase()
    } else {
      self.name.clone()
    };
    Instrument {
      id: self.id,
      pair: self.pair.clone(),
      name,
    }
  }
}

// Default value functions for serde

fn default_log_level() -> String {
  "info".to_string()
}

fn default_true() -> bool {
  true
}

fn default_channel() -> String {
  "ohlc_datafeed".to_string()
}

fn default_resolution() -> u32 {
  5
}

fn default_slot_decimals() -> u32 {
  4
}

fn default_reconnect_initial() -> u64 {
  5_000
}

fn default_reconnect_factor() -> f64 {
  1.5
}

fn default_reconnect_max() -> u64 {
  60_000
}

fn default_connect_timeout() -> u64 {
  10_000
}

fn default_ping_interval() -> u64 {
  20_000
}

fn default_pong_grace() -> u64 {
  15_000
}

fn default_api_timeout() -> u64 {
  10_000
}

fn default_max_concurrent() -> usize {
  8
}

fn default_max_rps() -> u32 {
  20
}

fn default_proof_timeout() -> u64 {
  15_000
}

fn default_proof_initial() -> u64 {
  200
}

fn default_proof_factor() -> f64 {
  1.8
}

fn default_proof_max() -> u64 {
  15_000
}

fn default_proof_jitter() -> f64 {
  0.3
}

fn default_executor_program() -> String {
  "node".to_string()
}

fn default_executor_timeout() -> u64 {
  120_000
}

fn default_range_rate() -> f64 {
  0.0002
}

fn default_batch_size() -> usize {
  200
}

fn default_inter_batch_delay() -> u64 {
  1_000
}

fn default_request_delay() -> u64 {
  100
}

fn default_clean_skip_limit() -> u32 {
  3
}

fn default_max_slots() -> usize {
  64
}

fn default_safety_rate() -> f64 {
  0.001
}

fn default_safety_decimals() -> u32 {
  3
}

fn default_throttle_secs() -> u64 {
  60
}

fn default_prune_age_secs() -> u64 {
  600
}

fn default_metrics_addr() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_health_port() -> u16 {
  8080
}
