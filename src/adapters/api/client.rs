//! REST HTTP Client - Rate-limited JSON Client
//!
//! Wraps reqwest with a concurrency cap and a request-rate limiter.
//! Every call is a single attempt; retry policy belongs to the caller
//! (the proof loop retries forever, range failures abort the cycle,
//! verify failures are advisory).

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::ports::error::ApiError;

/// Configuration for the REST client.
#[derive(Debug, Clone)]
pub struct RestClientConfig {
  /// Default request timeout.
  pub timeout: Duration,
  /// Maximum concurrent requests.
  pub max_concurrent: usize,
  /// Maximum requests started per second.
  pub max_requests_per_second: u32,
}

impl Default for RestClientConfig {
  fn default() -> Self {
    Self {
      timeout: Duration::from_secs(10),
      max_concurrent: 8,
      max_requests_per_second: 20,
    }
  }
}

/// Shared HTTP client for all REST collaborators.
pub struct RestClient {
  /// Underlying HTTP client.
  http: Client,
  /// Concurrency limiter.
  semaphore: Arc<Semaphore>,
  /// Request-rate limiter.
  limiter: DefaultDirectRateLimiter,
}

impl RestClient {
  /// Create a new client.
  pub fn new(config: RestClientConfig) -> Result<Self> {
    let http = Client::builder()
      .timeout(config.timeout)
      .pool_max_idle_per_host(5)
      .build()
      .context("Failed to build HTTP client")?;

    let rps = NonZeroU32::new(config.max_requests_per_second).unwrap_or(NonZeroU32::MIN);

    Ok(Self {
      http,
      semaphore: Arc::new(Semaphore::new(config.max_concurrent.max(1))),
      limiter: RateLimiter::direct(Quota::per_second(rps)),
    })
  }

  /// GET `url` and decode the JSON body.
  pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
    self.execute(self.http.get(url), url).await
  }

  /// POST a JSON body to `url` and decode the JSON response.
  ///
  /// `timeout` overrides the client default for this request only.
  pub async fn post_json<B, T>(
    &self,
    url: &str,
    body: &B,
    timeout: Option<Duration>,
  ) -> Result<T, ApiError>
  where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
  {
    let mut request = self.http.post(url).json(body);
    if let Some(timeout) = timeout {
      request = request.timeout(timeout);
    }
    self.execute(request, url).await
  }

  /// Send one request under the concurrency and rate limits.
  async fn execute<T: DeserializeOwned>(
    &self,
    request: RequestBuilder,
    url: &str,
  ) -> Result<T, ApiError> {
    let _permit = self
      .semaphore
      .acquire()
      .await
      .map_err(|e| ApiError::Transport(e.to_string()))?;
    self.limiter.until_ready().await;

    debug!(url, "HTTP request");
    let response = request.send().await.map_err(map_transport)?;
    let status = response.status();
    let text = response.text().await.map_err(map_transport)?;

    if !status.is_success() {
      return Err(ApiError::Status {
        status: status.as_u16(),
        body: truncate(&text, 512),
      });
    }

    // Some services answer 200 with an empty body.
    let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
    serde_json::from_str(text).map_err(|e| ApiError::Decode(e.to_string()))
  }
}

fn map_transport(e: reqwest::Error) -> ApiError {
  if e.is_timeout() {
    ApiError::Timeout
  } else {
    ApiError::Transport(e.to_string())
  }
}

fn truncate(text: &str, max: usize) -> String {
  match text.char_indices().nth(max) {
    Some((idx, _)) => format!("{}…", &text[..idx]),
    None => text.to_string(),
  }
}

/// Join a base URL and a path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
  format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_join_url() {
    assert_eq!(join_url("https://a.b/", "/bucket/range"), "https://a.b/bucket/range");
    assert_eq!(join_url("https://a.b", "verify/1,2"), "https://a.b/verify/1,2");
  }

  #[test]
  fn test_truncate_is_char_safe() {
    assert_eq!(truncate("héllo", 2), "hé…");
    assert_eq!(truncate("ok", 10), "ok");
  }

  #[tokio::test]
  async fn test_unreachable_host_is_transport_error() {
    let client = RestClient::new(RestClientConfig {
      timeout: Duration::from_millis(500),
      ..Default::default()
    })
    .unwrap();

    let result: Result<serde_json::Value, _> = client.get_json("http://127.0.0.1:1/none").await;
    assert!(matches!(result, Err(ApiError::Transport(_)) | Err(ApiError::Timeout)));
  }
}
