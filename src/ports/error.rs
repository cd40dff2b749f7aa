//! Typed errors crossing port boundaries.

use std::time::Duration;

use thiserror::Error;

/// Failure talking to an HTTP collaborator.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Connection, DNS or TLS failure.
  #[error("transport error: {0}")]
  Transport(String),

  /// The request exceeded its deadline.
  #[error("request timed out")]
  Timeout,

  /// Non-2xx response.
  #[error("HTTP {status}: {body}")]
  Status { status: u16, body: String },

  /// The body could not be decoded.
  #[error("decode error: {0}")]
  Decode(String),
}

/// Failure of a single proof fetch attempt.
#[derive(Debug, Error)]
pub enum ProofError {
  #[error(transparent)]
  Api(#[from] ApiError),

  /// Response had no usable `proof_bytes`.
  #[error("proof_bytes missing from response")]
  Missing,

  #[error("proof_bytes is not valid hex: {0}")]
  Malformed(String),
}

/// Failure of a single executor invocation.
#[derive(Debug, Error)]
pub enum ExecutorError {
  /// The executor could not be started.
  #[error("failed to spawn executor: {0}")]
  Spawn(String),

  #[error("executor timed out after {0:?}")]
  Timeout(Duration),

  /// Non-zero exit.
  #[error("executor exited with {code:?}: {stderr}")]
  Failed { code: Option<i32>, stderr: String },
}
