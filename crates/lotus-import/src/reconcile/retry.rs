//! Bounded retries with selective error matching

use lotus_common::{Classify, ErrorKind};
use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts for remote operations
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default pause between attempts (in milliseconds)
pub const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;

/// How an operation is retried.
///
/// Only failures whose kind is in `recoverable` are retried. Anything else is
/// returned after the first attempt. Once `max_attempts` is reached the last
/// failure is returned as is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
    recoverable: BTreeSet<ErrorKind>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            recoverable: BTreeSet::from([ErrorKind::Network]),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            ..Self::default()
        }
    }

    /// Try once, never retry
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Replace the set of kinds that are retried
    pub fn recovering(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.recoverable = kinds.into_iter().collect();
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn is_recoverable(&self, kind: ErrorKind) -> bool {
        self.recoverable.contains(&kind)
    }

    /// Run `operation` until it succeeds, fails unrecoverably, or runs out of
    /// attempts. The successful value is returned unchanged.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let kind = err.error_kind();
            if !self.is_recoverable(kind) {
                debug!(operation = label, kind = %kind, error = %err, "Unrecoverable failure");
                return Err(err);
            }

            if attempt >= self.max_attempts {
                warn!(
                    operation = label,
                    attempts = attempt,
                    kind = %kind,
                    error = %err,
                    "Giving up after {} attempts",
                    attempt
                );
                return Err(err);
            }

            warn!(
                operation = label,
                attempt = attempt,
                max_attempts = self.max_attempts,
                kind = %kind,
                error = %err,
                "Attempt {}/{} failed, retrying in {:?}",
                attempt,
                self.max_attempts,
                self.delay
            );

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use lotus_common::LotusError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn test_recoverable_failure_uses_all_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LotusError> = counting_policy(3)
            .run("always-down", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LotusError::network("connection refused"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Network);
    }

    #[tokio::test]
    async fn test_unrecoverable_failure_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LotusError> = counting_policy(3)
            .run("missing", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LotusError::NotFound("Q1".to_string()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_success_value_passes_through() {
        let calls = AtomicU32::new(0);
        let result = counting_policy(3)
            .run("flaky", || async {
                if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LotusError::network("reset"))
                } else {
                    Ok(vec!["Q1", "Q2"])
                }
            })
            .await
            .unwrap();

        assert_eq!(result, vec!["Q1", "Q2"]);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_never_retries() {
        let calls = AtomicU32::new(0);
        let _ = RetryPolicy::once()
            .run("once", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(LotusError::network("reset"))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_custom_recoverable_set() {
        let calls = AtomicU32::new(0);
        let policy = counting_policy(2)
            .recovering([ErrorKind::Network, ErrorKind::RateLimitExceeded]);
        let result: Result<(), LotusError> = policy
            .run("throttled", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LotusError::RateLimitExceeded("429".to_string()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::RateLimitExceeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_between_attempts() {
        let started = tokio::time::Instant::now();
        let _: Result<(), LotusError> = RetryPolicy::new(3, Duration::from_secs(5))
            .run("slow", || async { Err(LotusError::network("reset")) })
            .await;

        // two pauses between three attempts
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(10));
        assert!(elapsed < Duration::from_secs(11));
    }
}
