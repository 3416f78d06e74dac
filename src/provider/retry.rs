//! Retry policy for transient provider failures.
//!
//! Wraps provider calls with capped exponential backoff. Only errors the
//! error hierarchy marks as retryable (throttling, network, timeout) are
//! retried; everything else propagates on the first attempt. Throttling
//! responses carrying their own retry-after hint override the computed
//! backoff.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::{KeyplaneError, ProviderError, Result};

/// Backoff configuration for provider calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt limit.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Returns the backoff delay before retry number `retry` (1-based).
    ///
    /// Doubles per retry, capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs an async provider call, retrying transient failures.
    ///
    /// # Errors
    ///
    /// Returns the original error when it is not retryable, or
    /// [`ProviderError::RetriesExhausted`] when every attempt failed.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = err
                        .retry_delay_secs()
                        .map_or_else(|| self.delay_for(attempt), Duration::from_secs)
                        .min(self.max_delay);
                    warn!(
                        operation,
                        attempt,
                        delay_secs = delay.as_secs(),
                        error = %err,
                        "Transient provider error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(KeyplaneError::Provider(source)) if source.is_retryable() => {
                    return Err(ProviderError::RetriesExhausted {
                        attempts: attempt,
                        source: Box::new(source),
                    }
                    .into());
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 6,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
        };
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(5), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_error_is_retried_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result = policy
            .run("get_resource", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderError::network("connection reset").into())
                } else {
                    Ok(42)
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<()> = policy
            .run("mutate", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(KeyplaneError::Provider(ProviderError::MutationRejected {
                    operation: String::from("attach_managed_policy"),
                    resource: String::from("engineering"),
                    message: String::from("policy does not exist"),
                }))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_attempt_count() {
        let policy = RetryPolicy::with_max_attempts(3);
        let result: Result<()> = policy
            .run("get_resource", || async {
                Err(ProviderError::Timeout {
                    operation: String::from("get_resource"),
                }
                .into())
            })
            .await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("after 3 attempts"));
        assert!(err.to_string().contains("timed out"));
    }
}
