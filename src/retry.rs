//! Retry policy for remote API calls.
//!
//! The policy is an explicit object injected into the CRUD orchestrator,
//! not inline looping at the call sites. Only errors classified as
//! retryable ([`ProviderError::is_retryable`]) are retried; validation and
//! remote 4xx rejections surface immediately.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::ProviderError;

/// Bounded exponential backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first (1 = no retries).
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
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries. Useful in tests.
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    /// The delay before retry number `attempt` (1-based), capped at
    /// `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.base_delay.as_millis() as u64;
        let cap = self.max_delay.as_millis() as u64;
        let exp = attempt.saturating_sub(1).min(16);
        let delay = base.saturating_mul(1u64 << exp).min(cap);
        Duration::from_millis(delay)
    }

    /// Run `f`, retrying transient failures with backoff until either it
    /// succeeds, a non-retryable error occurs, or attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, op: &str, mut f: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 1;
        loop {
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        operation = op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                },
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
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(9), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_run_retries_transient_until_success() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);

        let result: Result<&str, ProviderError> = policy
            .run("create", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(ProviderError::Transient("503".to_string()))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_run_does_not_retry_remote_rejection() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), ProviderError> = policy
            .run("update", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(ProviderError::RemoteRejected {
                        status: 400,
                        message: "bad field".to_string(),
                        field: None,
                    })
                }
            })
            .await;

        assert!(matches!(
            result,
            Err(ProviderError::RemoteRejected { status: 400, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_exhausts_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let calls = AtomicU32::new(0);

        let result: Result<(), ProviderError> = policy
            .run("read", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderError::Transient("timeout".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
