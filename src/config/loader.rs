//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, applying environment overrides,
//! validating all parameters, and providing clear error messages
//! for misconfiguration.

use std::collections::HashSet;
use std::path::Path;

use alloy::primitives::Address;
use anyhow::{Context, Result};
use tracing::info;

use super::AppConfig;

/// Feed API key override.
pub const ENV_WS_API_KEY: &str = "SUPRA_WS_API_KEY";
/// Proof endpoint override.
pub const ENV_PROOF_URL: &str = "SUPRA_PROOF_URL";

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let mut config = parse_config(&content)?;
  apply_env_overrides(&mut config, |key| std::env::var(key).ok());
  validate_config(&config)?;

  info!(
    instruments = config.instruments.len(),
    batch_size = config.dispatch.batch_size,
    clean_skip_limit = config.dispatch.clean_skip_limit,
    safety = config.safety.enabled,
    dry_run = config.bot.dry_run,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Parse TOML without validation.
pub fn parse_config(content: &str) -> Result<AppConfig> {
  toml::from_str(content).with_context(|| "Failed to parse config.toml")
}

/// Overlay secrets and endpoints from the environment.
///
/// `lookup` is injected so tests never touch the process environment.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
  if let Some(key) = lookup(ENV_WS_API_KEY).filter(|v| !v.trim().is_empty()) {
    config.feed.api_key = key.trim().to_string();
  }
  if let Some(url) = lookup(ENV_PROOF_URL).filter(|v| !v.trim().is_empty()) {
    config.proof.endpoint = url.trim().to_string();
  }
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty, unique instrument definitions
/// - Present endpoints and feed key
/// - A parseable contract address
/// - Sane pacing and backoff parameters
pub fn validate_config(config: &AppConfig) -> Result<()> {
  // Instrument validation
  anyhow::ensure!(
    !config.instruments.is_empty(),
    "At least one instrument must be configured"
  );

  let mut pairs = HashSet::new();
  let mut ids = HashSet::new();
  for (i, inst) in config.instruments.iter().enumerate() {
    anyhow::ensure!(!inst.pair.trim().is_empty(), "Instrument {} has empty pair", i);
    anyhow::ensure!(
      pairs.insert(inst.pair.to_lowercase()),
      "Instrument pair {} is configured twice",
      inst.pair
    );
    anyhow::ensure!(
      ids.insert(inst.id),
      "Instrument id {} is configured twice",
      inst.id
    );
  }

  // Feed validation
  anyhow::ensure!(!config.feed.ws_url.is_empty(), "Feed ws_url must not be empty");
  anyhow::ensure!(
    !config.feed.api_key.is_empty(),
    "Feed API key missing: set feed.api_key or {}",
    ENV_WS_API_KEY
  );
  anyhow::ensure!(
    config.feed.reconnect_factor >= 1.0,
    "reconnect_factor must be >= 1, got {}",
    config.feed.reconnect_factor
  );
  anyhow::ensure!(
    config.feed.reconnect_initial_ms > 0
      && config.feed.reconnect_initial_ms <= config.feed.reconnect_max_ms,
    "reconnect_initial_ms must be in (0, reconnect_max_ms]"
  );
  anyhow::ensure!(config.feed.ping_interval_ms > 0, "ping_interval_ms must be positive");
  anyhow::ensure!(config.feed.connect_timeout_ms > 0, "connect_timeout_ms must be positive");

  // API validation
  anyhow::ensure!(!config.api.base_url.is_empty(), "Range API base_url must not be empty");
  anyhow::ensure!(
    !config.api.verify_base_url.is_empty(),
    "Verify API base_url must not be empty"
  );
  anyhow::ensure!(config.api.max_concurrent > 0, "max_concurrent must be positive");
  anyhow::ensure!(
    config.api.max_requests_per_second > 0,
    "max_requests_per_second must be positive"
  );

  // Proof validation
  anyhow::ensure!(
    !config.proof.endpoint.is_empty(),
    "Proof endpoint missing: set proof.endpoint or {}",
    ENV_PROOF_URL
  );
  anyhow::ensure!(
    config.proof.backoff_factor >= 1.0,
    "proof backoff_factor must be >= 1, got {}",
    config.proof.backoff_factor
  );
  anyhow::ensure!(
    (0.0..1.0).contains(&config.proof.jitter),
    "proof jitter must be in [0, 1), got {}",
    config.proof.jitter
  );
  anyhow::ensure!(
    config.proof.initial_delay_ms > 0 && config.proof.initial_delay_ms <= config.proof.max_delay_ms,
    "proof initial_delay_ms must be in (0, max_delay_ms]"
  );

  // Executor validation
  anyhow::ensure!(!config.executor.program.is_empty(), "Executor program must not be empty");
  anyhow::ensure!(!config.executor.rpc_url.is_empty(), "Executor rpc_url must not be empty");
  config
    .executor
    .contract_address
    .parse::<Address>()
    .with_context(|| format!("Invalid contract_address: {}", config.executor.contract_address))?;

  // Dispatch validation
  anyhow::ensure!(
    config.dispatch.range_rate > 0.0 && config.dispatch.range_rate < 1.0,
    "dispatch range_rate must be in (0, 1), got {}",
    config.dispatch.range_rate
  );
  anyhow::ensure!(config.dispatch.batch_size > 0, "batch_size must be positive");
  anyhow::ensure!(config.dispatch.clean_skip_limit > 0, "clean_skip_limit must be positive");
  anyhow::ensure!(
    config.dispatch.max_slots_per_instrument > 0,
    "max_slots_per_instrument must be positive"
  );

  // Safety validation
  if config.safety.enabled {
    anyhow::ensure!(
      config.safety.range_rate > 0.0 && config.safety.range_rate < 1.0,
      "safety range_rate must be in (0, 1), got {}",
      config.safety.range_rate
    );
    anyhow::ensure!(
      config.safety.prune_age_secs >= config.safety.throttle_secs,
      "safety prune_age_secs must be >= throttle_secs"
    );
  }

  Ok(())
}
