//! Retry executor with exponential backoff and jitter
//!
//! Applied at two levels: inside each source client around individual
//! provider calls, and at the per-gene level so a single failing gene is
//! retried independently while its siblings proceed.

use crate::config::RetryConfig;
use rand::Rng;
use std::time::Duration;

/// Errors that can tell the executor whether another attempt makes sense
pub trait Retryable {
    /// Transient errors (timeouts, 5xx, rate-limit responses) are retried;
    /// everything else fails immediately.
    fn is_transient(&self) -> bool;
}

/// Configurable retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Run `operation` until it succeeds, fails terminally, or attempts are
    /// exhausted. Backoff doubles per attempt, capped, with added jitter so
    /// concurrent retries against the same provider do not re-align.
    pub async fn execute<F, Fut, T, E>(&self, operation_name: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable + std::fmt::Display,
    {
        let mut backoff = self.initial_backoff;

        for attempt in 1..=self.max_attempts {
            match operation().await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(
                            operation = operation_name,
                            attempt,
                            "Operation succeeded after retry"
                        );
                    }
                    return Ok(result);
                }
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.with_jitter(backoff);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, will retry after backoff"
                    );
                    tokio::time::sleep(delay).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                }
                Err(err) => {
                    if err.is_transient() {
                        tracing::error!(
                            operation = operation_name,
                            attempts = self.max_attempts,
                            error = %err,
                            "Retries exhausted"
                        );
                    }
                    return Err(err);
                }
            }
        }

        unreachable!("retry loop returns from within");
    }

    /// Full jitter in [delay/2, delay]
    fn with_jitter(&self, delay: Duration) -> Duration {
        let millis = delay.as_millis() as u64;
        if millis < 2 {
            return delay;
        }
        let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
        Duration::from_millis(jittered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        transient: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error (transient: {})", self.transient)
        }
    }

    impl Retryable for TestError {
        fn is_transient(&self) -> bool {
            self.transient
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(&crate::config::RetryConfig {
            max_attempts,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
        })
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let policy = fast_policy(3);
        let result: Result<i32, TestError> = policy.execute("op", || async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let policy = fast_policy(4);
        let attempts = AtomicU32::new(0);

        let result = policy
            .execute("op", || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(TestError { transient: true })
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_error_fails_immediately() {
        let policy = fast_policy(5);
        let attempts = AtomicU32::new(0);

        let result: Result<i32, TestError> = policy
            .execute("op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { transient: false }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let policy = fast_policy(3);
        let attempts = AtomicU32::new(0);

        let result: Result<i32, TestError> = policy
            .execute("op", || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(TestError { transient: true }) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
