use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Core domain error taxonomy.
///
/// These are tagged result variants, not exceptions: a caller matches
/// on the variant to decide whether to retry, repair, or surface the
/// failure to a user. Only `ConfigInvalid` and an initial store/broker
/// connect failure are fatal to the process; everything else is
/// recovered locally or routed back through the coordinator.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum CoreError {
  /// Fatal at startup: malformed or missing configuration.
  #[error("invalid configuration: {0}")]
  ConfigInvalid(String),

  /// A store (document or relational) failed after its internal
  /// retries were exhausted.
  #[error("store unavailable: {0}")]
  StoreUnavailable(String),

  /// A document/relational pair was observed out of sync. Never
  /// surfaced to chat users; repaired lazily on next read.
  #[error("data inconsistency: {0}")]
  DataInconsistency(String),

  /// Normal "absent" condition for read operations.
  #[error("not found: {0}")]
  NotFound(String),

  /// A record the caller tried to create already exists.
  #[error("duplicate: {0}")]
  Duplicate(String),

  /// Narrative checkpoint unlock conditions were not met.
  #[error("progression denied: {0}")]
  ProgressionDenied(String),

  /// VIP-gated content requested by a non-VIP (or anonymous) user.
  #[error("vip access required")]
  VipAccessRequired,

  /// A besitos debit would take the balance negative.
  #[error("insufficient funds: balance {balance}, requested {requested}")]
  InsufficientFunds { balance: i64, requested: i64 },

  /// A downstream HTTP collaborator (gamification) could not be
  /// reached. Event processing continues regardless.
  #[error("api unavailable: {0}")]
  ApiUnavailable(String),

  /// A single buffered event's handler failed; the event is dropped,
  /// not retried, to avoid poison-pill loops.
  #[error("event processing failed: {0}")]
  EventProcessingFailed(String),

  /// The event bus local queue dropped an event because it was full.
  #[error("queue overflow: {0}")]
  QueueOverflow(String),

  /// The ordering buffer dropped an event because it was full.
  #[error("buffer overflow: {0}")]
  BufferOverflow(String),

  /// Validation of caller-supplied input failed.
  #[error("validation error: {0}")]
  Validation(String),

  /// Anything else. Kept narrow — prefer a specific variant above.
  #[error("internal error: {0}")]
  Internal(String),
}

impl CoreError {
  /// Whether retrying the operation that produced this error is
  /// plausibly worthwhile (used by the Store Pair's retry loops).
  pub fn is_retryable(&self) -> bool {
    matches!(self, CoreError::StoreUnavailable(_) | CoreError::ApiUnavailable(_))
  }
}

impl From<anyhow::Error> for CoreError {
  fn from(err: anyhow::Error) -> Self {
    CoreError::Internal(err.to_string())
  }
}

impl From<sqlx::Error> for CoreError {
  fn from(err: sqlx::Error) -> Self {
    match &err {
      sqlx::Error::RowNotFound => CoreError::NotFound("row not found".to_string()),
      sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
        CoreError::Duplicate(db_err.message().to_string())
      }
      _ => CoreError::StoreUnavailable(err.to_string()),
    }
  }
}

impl From<mongodb::error::Error> for CoreError {
  fn from(err: mongodb::error::Error) -> Self {
    CoreError::StoreUnavailable(err.to_string())
  }
}

impl From<serde_json::Error> for CoreError {
  fn from(err: serde_json::Error) -> Self {
    CoreError::Validation(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_transient_kinds_are_retryable() {
    assert!(CoreError::StoreUnavailable("down".into()).is_retryable());
    assert!(CoreError::ApiUnavailable("down".into()).is_retryable());
    assert!(!CoreError::NotFound("x".into()).is_retryable());
    assert!(!CoreError::VipAccessRequired.is_retryable());
  }
}
