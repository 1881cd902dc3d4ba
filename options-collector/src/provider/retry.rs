//! Fixed-interval retry for provider requests.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

/// Bounded retry with a fixed sleep between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    /// Budget for the nested-map REST chain API.
    pub fn rest() -> Self {
        Self::new(10, Duration::from_secs(3))
    }

    /// Budget for the finance-ticker provider.
    pub fn ticker() -> Self {
        Self::new(3, Duration::from_secs(3))
    }

    /// Run `op` until it succeeds, `retryable` rejects the error, or the
    /// attempt budget is spent. The last error is returned on exhaustion.
    pub async fn retry_async<F, Fut, T, E, R>(&self, label: &str, mut op: F, retryable: R) -> Result<T, E>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
        R: Fn(&E) -> bool,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(val) => return Ok(val),
                Err(err) => {
                    attempt += 1;
                    if !retryable(&err) {
                        return Err(err);
                    }
                    if attempt >= self.max_attempts {
                        warn!(
                            target: "options_collector::provider",
                            request = label,
                            attempts = attempt,
                            error = %err,
                            "Retry budget exhausted"
                        );
                        return Err(err);
                    }
                    warn!(
                        target: "options_collector::provider",
                        request = label,
                        attempt,
                        max_attempts = self.max_attempts,
                        error = %err,
                        "Request failed, retrying in {:?}",
                        self.delay
                    );
                    sleep(self.delay).await;
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::rest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_new_clamps_attempts() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(RetryPolicy::rest().max_attempts, 10);
        assert_eq!(RetryPolicy::ticker().max_attempts, 3);
        assert_eq!(RetryPolicy::ticker().delay, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let policy = RetryPolicy::rest();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<&str, String> = policy
            .retry_async(
                "SPY",
                |attempt| {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        if attempt < 4 {
                            Err("connection reset".to_string())
                        } else {
                            Ok("chain")
                        }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result.unwrap(), "chain");
        // K = 4 failures, so exactly K + 1 attempts
        assert_eq!(attempts.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_budget() {
        let policy = RetryPolicy::ticker();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), String> = policy
            .retry_async(
                "QQQ",
                |_| {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err("timeout".to_string())
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Err("timeout".to_string()));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_returns_immediately() {
        let policy = RetryPolicy::rest();
        let attempts = Arc::new(AtomicUsize::new(0));

        let result: Result<(), String> = policy
            .retry_async(
                "BAD",
                |_| {
                    let attempts = attempts.clone();
                    async move {
                        attempts.fetch_add(1, Ordering::SeqCst);
                        Err("unknown symbol".to_string())
                    }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
