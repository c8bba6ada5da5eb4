//! Gateway error types

use thiserror::Error;

/// Why a cached payload could not be turned back into an entity
#[derive(Debug, Error)]
pub enum DecodeError {
  #[error("malformed record: {0}")]
  Malformed(#[from] serde_json::Error),

  #[error("record version {0} is newer than this build understands")]
  UnsupportedVersion(u32),

  #[error("expected a list payload")]
  NotAList,

  #[error("list record without an id")]
  MissingId,

  #[error("content digest mismatch")]
  DigestMismatch,
}

/// Errors of the reading gateway.
///
/// Only `get_book` hands these to callers; every other read degrades to an
/// empty result and logs the error instead.
#[derive(Debug, Error)]
pub enum GatewayError {
  /// Remote document absent
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: String },

  /// Malformed cached payload
  #[error("malformed cache entry {key}: {source}")]
  ParseFailure {
    key: String,
    #[source]
    source: DecodeError,
  },

  /// Network or store error on the remote side
  #[error("remote store unavailable: {0}")]
  RemoteUnavailable(color_eyre::Report),

  /// Local cache store error
  #[error("cache store unavailable: {0}")]
  CacheUnavailable(color_eyre::Report),

  /// A detached refresh failed; only ever logged
  #[error("background refresh of {key} failed: {reason}")]
  BackgroundTaskFailure { key: String, reason: String },
}

impl GatewayError {
  /// Returns `true` if retrying the same call might succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      GatewayError::RemoteUnavailable(_) | GatewayError::BackgroundTaskFailure { .. }
    )
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, GatewayError::NotFound { .. })
  }
}
