//! Exponential backoff for batch delivery.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry schedule: after failed attempt `k` (1-based) the next attempt
/// waits `2^k * base`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, base: Duration) -> Self {
        Self { attempts, base }
    }

    /// Delay to wait after attempt `attempt` failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op` until it succeeds or the attempts are used up, returning
    /// the last error.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "Delivery attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, self.attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(2));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
        assert_eq!(policy.delay_after(3), Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_error_after_all_attempts() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = Cell::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), String> = policy
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move { Err(format!("failure {}", n)) }
            })
            .await;

        assert_eq!(result, Err("failure 3".to_string()));
        assert_eq!(calls.get(), 3);
        // 2s + 4s of backoff, no sleep after the final attempt.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(6));
        assert!(elapsed < Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_on_first_success() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        let calls = Cell::new(0);

        let result: Result<u32, String> = policy
            .run(|| {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 2 {
                        Err("not yet".to_string())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        let value = tokio_test::assert_ok!(result);
        assert_eq!(value, 2);
        assert_eq!(calls.get(), 2);
    }

    #[tokio::test]
    async fn test_single_attempt_does_not_sleep() {
        let policy = RetryPolicy::new(1, Duration::from_secs(3600));
        let result: Result<(), &str> = policy.run(|| async { Err("once") }).await;
        assert_eq!(result, Err("once"));
    }
}
