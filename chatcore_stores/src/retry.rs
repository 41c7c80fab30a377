use std::future::Future;
use std::time::Duration;

use chatcore_core::error::CoreError;
use tokio::time::sleep;
use tracing::warn;

/// Exponential backoff used for store connect loops: base 1s, capped
/// attempts, doubling delay each time.
#[derive(Debug, Clone)]
pub struct ExponentialBackoffRetry {
  pub base_delay_ms: u64,
  pub max_retries: u32,
  pub backoff_multiplier: f64,
  pub max_delay_ms: u64,
}

impl Default for ExponentialBackoffRetry {
  fn default() -> Self {
    Self {
      base_delay_ms: 1000,
      max_retries: 5,
      backoff_multiplier: 2.0,
      max_delay_ms: 30_000,
    }
  }
}

impl ExponentialBackoffRetry {
  pub fn new(base_delay_ms: u64, max_retries: u32) -> Self {
    Self {
      base_delay_ms,
      max_retries,
      ..Default::default()
    }
  }

  fn calculate_delay(&self, attempt: u32) -> Duration {
    let delay_ms = (self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32)) as u64;
    Duration::from_millis(delay_ms.min(self.max_delay_ms))
  }

  pub async fn retry<F, Fut, T>(&self, label: &str, operation: F) -> Result<T, CoreError>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
  {
    let mut last_error = None;

    for attempt in 0..=self.max_retries {
      match operation().await {
        Ok(result) => return Ok(result),
        Err(error) => {
          if !error.is_retryable() {
            return Err(error);
          }
          if attempt == self.max_retries {
            return Err(error);
          }
          let delay = self.calculate_delay(attempt);
          warn!(
            operation = label,
            attempt = attempt + 1,
            max_retries = self.max_retries,
            ?delay,
            %error,
            "transient failure, retrying"
          );
          last_error = Some(error);
          sleep(delay).await;
        }
      }
    }

    Err(last_error.unwrap_or(CoreError::Internal("retry loop exited without result".into())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  #[tokio::test]
  async fn retries_transient_errors_until_success() {
    let retry = ExponentialBackoffRetry::new(1, 5);
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();

    let result = retry
      .retry("connect", || {
        let c = c.clone();
        async move {
          let n = c.fetch_add(1, Ordering::SeqCst);
          if n < 2 {
            Err(CoreError::StoreUnavailable("not yet".into()))
          } else {
            Ok("connected")
          }
        }
      })
      .await;

    assert_eq!(result.unwrap(), "connected");
    assert_eq!(counter.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn permanent_errors_are_not_retried() {
    let retry = ExponentialBackoffRetry::new(1, 5);
    let counter = Arc::new(AtomicU32::new(0));
    let c = counter.clone();

    let result: Result<(), CoreError> = retry
      .retry("connect", || {
        let c = c.clone();
        async move {
          c.fetch_add(1, Ordering::SeqCst);
          Err(CoreError::ConfigInvalid("bad uri".into()))
        }
      })
      .await;

    assert!(result.is_err());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
  }
}
