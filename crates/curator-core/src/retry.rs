//! Call-site retry with exponential backoff for external-service calls.
//!
//! Each call owns its own attempt budget; exhausting it surfaces the last
//! error to the caller, which decides what a failed call means for the
//! segment.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Bounded exponential backoff policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Delay doubles after each failed attempt, capped at 60 s.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: Duration::from_secs(60),
            multiplier: 2,
        }
    }

    /// A single attempt, no waiting.
    pub fn none() -> Self {
        Self::exponential(1, Duration::ZERO)
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based) failed.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Run `f` until it succeeds, `should_retry` rejects the error, or the
    /// attempt budget is spent.
    pub async fn retry_if<F, Fut, T, E, P>(&self, mut f: F, mut should_retry: P) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: FnMut(&E) -> bool,
        E: std::fmt::Display,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(attempt, "retry: call succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(e) => {
                    let retryable = should_retry(&e);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        retryable,
                        error = %e,
                        "retry: call failed"
                    );
                    if !retryable || attempt >= self.max_attempts {
                        return Err(e);
                    }
                    let delay = self.delay_after(attempt);
                    debug!(delay_ms = delay.as_millis() as u64, "retry: backing off");
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

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::exponential(5, Duration::from_secs(1));
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(policy.delay_after(3), Duration::from_secs(4));
        assert_eq!(policy.delay_after(10), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(3, Duration::from_millis(10));
        let result: Result<u32, String> = policy
            .retry_if(
                || async {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(format!("transient {n}"))
                    } else {
                        Ok(n)
                    }
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_error_stops_immediately() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(5, Duration::from_millis(10));
        let result: Result<(), String> = policy
            .retry_if(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("bad request".to_string())
                },
                |_| false,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::exponential(2, Duration::from_millis(10));
        let result: Result<(), String> = policy
            .retry_if(
                || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err("timeout".to_string())
                },
                |_| true,
            )
            .await;
        assert_eq!(result, Err("timeout".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
