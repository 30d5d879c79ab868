//! Bounded retry for reads that tolerate transient failures.

use std::future::Future;
use std::time::Duration;

use super::error::{SpotifyError, SpotifyResult};

/// Retry policy with exponential backoff.
///
/// Backoff doubles with each retry: 1s → 2s → 4s, capped at `max_delay`.
/// Terminal failures (403, missing credential) are never retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
  /// Retries after the first attempt
  max_retries: u32,
  base_delay: Duration,
  max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries: 3,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  pub fn new(max_retries: u32, base_delay: Duration) -> Self {
    Self {
      max_retries,
      base_delay,
      ..Self::default()
    }
  }

  /// No retries at all.
  pub fn none() -> Self {
    Self::new(0, Duration::ZERO)
  }

  /// Whether to try again after `failures` failed attempts ending in `error`.
  pub fn should_retry(&self, failures: u32, error: &SpotifyError) -> bool {
    failures <= self.max_retries && !error.is_terminal()
  }

  /// Delay before the retry that follows `failures` failed attempts.
  fn delay(&self, failures: u32) -> Duration {
    let factor = 2u32.saturating_pow(failures.saturating_sub(1));
    self.base_delay.saturating_mul(factor).min(self.max_delay)
  }

  /// Run `operation` until it succeeds, fails terminally, or retries run out.
  pub async fn run<T, F, Fut>(&self, mut operation: F) -> SpotifyResult<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = SpotifyResult<T>>,
  {
    let mut failures = 0;
    loop {
      match operation().await {
        Ok(value) => return Ok(value),
        Err(e) => {
          failures += 1;
          if !self.should_retry(failures, &e) {
            return Err(e);
          }

          let delay = match &e {
            SpotifyError::RateLimited {
              retry_after: Some(secs),
            } => Duration::from_secs(*secs).min(self.max_delay),
            _ => self.delay(failures),
          };
          tracing::warn!(
            attempt = failures,
            max_retries = self.max_retries,
            delay_ms = delay.as_millis() as u64,
            error = %e,
            "request failed, retrying"
          );
          tokio::time::sleep(delay).await;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  fn transient() -> SpotifyError {
    SpotifyError::Status {
      status: 503,
      message: "unavailable".into(),
    }
  }

  #[test]
  fn test_backoff_doubles_and_caps() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay(1), Duration::from_secs(1));
    assert_eq!(policy.delay(2), Duration::from_secs(2));
    assert_eq!(policy.delay(3), Duration::from_secs(4));
    assert_eq!(policy.delay(10), Duration::from_secs(30));
  }

  #[test]
  fn test_should_retry_bounds() {
    let policy = RetryPolicy::default();
    assert!(policy.should_retry(1, &transient()));
    assert!(policy.should_retry(3, &transient()));
    assert!(!policy.should_retry(4, &transient()));
    assert!(!policy.should_retry(1, &SpotifyError::Forbidden(String::new())));
    assert!(!policy.should_retry(1, &SpotifyError::MissingCredential));
  }

  #[tokio::test]
  async fn test_transient_failures_retry_three_times() {
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_millis(1));

    let result: SpotifyResult<()> = policy
      .run(|| async {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(transient())
      })
      .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn test_forbidden_stops_immediately() {
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_millis(1));

    let result: SpotifyResult<()> = policy
      .run(|| async {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(SpotifyError::Forbidden("no".into()))
      })
      .await;

    assert!(matches!(result, Err(SpotifyError::Forbidden(_))));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_recovers_after_transient_failure() {
    let attempts = AtomicU32::new(0);
    let policy = RetryPolicy::new(3, Duration::from_millis(1));

    let result = policy
      .run(|| async {
        if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
          Err(transient())
        } else {
          Ok(7)
        }
      })
      .await;

    assert_eq!(result.unwrap(), 7);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_none_never_retries() {
    let attempts = AtomicU32::new(0);
    let result: SpotifyResult<()> = RetryPolicy::none()
      .run(|| async {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(transient())
      })
      .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
  }
}
