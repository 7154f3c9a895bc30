use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;
use crate::{Error, Result};

/// Retry configuration for outbound calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt, doubled after every failure
    pub base_delay: Duration,
    /// Upper bound for a single backoff delay
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Backoff before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error,
/// or runs out of attempts. The last error is returned unchanged.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, what: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= max_attempts || !error.is_retryable() {
                    return Err(error);
                }

                let delay = config.delay_for(attempt);
                warn!(
                    "⚠️ {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                    what, attempt, max_attempts, error, delay
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Wraps the final error of an exhausted retry loop with the attempt count.
pub fn exhausted(what: &str, config: &RetryConfig, error: Error) -> Error {
    if error.is_retryable() {
        Error::Fetch(format!("{} failed after {} attempts: {}", what, config.max_attempts, error))
    } else {
        Error::Fetch(format!("{} failed: {}", what, error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig::new(3, Duration::from_millis(1))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for(1), Duration::from_secs(1));
        assert_eq!(config.delay_for(2), Duration::from_secs(2));
        assert_eq!(config.delay_for(3), Duration::from_secs(4));
        assert_eq!(config.delay_for(10), Duration::from_secs(8));
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_exhausted() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(&fast(), "ping", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Upstream { status: 500, body: "boom".into() })
        })
        .await;

        assert!(matches!(result, Err(Error::Upstream { status: 500, .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry(&fast(), "ping", move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::Upstream { status: 401, body: "bad key".into() })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failure() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry(&fast(), "ping", move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::Upstream { status: 503, body: String::new() })
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_exhausted_message() {
        let err = exhausted("page 1", &fast(), Error::Upstream { status: 500, body: String::new() });
        assert!(matches!(err, Error::Fetch(_)));
        assert!(err.to_string().contains("after 3 attempts"));
    }
}
