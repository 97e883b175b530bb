//! Shared spacing between segment-level completion calls.
//!
//! Segments run concurrently, but their classification requests hit the same
//! upstream rate limit. The gate is a single-cell GCRA limiter: callers queue
//! on `until_ready` and are released at least `spacing` apart.

use std::time::Duration;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use tracing::debug;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct RateGate {
    spacing: Duration,
    /// `None` when the spacing is zero.
    limiter: Option<DirectLimiter>,
}

impl std::fmt::Debug for RateGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateGate")
            .field("spacing", &self.spacing)
            .field("limited", &self.limiter.is_some())
            .finish()
    }
}

impl RateGate {
    pub fn new(spacing: Duration) -> Self {
        // with_period rejects a zero period, which doubles as "unlimited".
        let limiter = Quota::with_period(spacing).map(RateLimiter::direct);
        Self { spacing, limiter }
    }

    /// A gate that never waits.
    pub fn unlimited() -> Self {
        Self::new(Duration::ZERO)
    }

    pub fn spacing(&self) -> Duration {
        self.spacing
    }

    /// Wait until this caller's slot opens.
    pub async fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check().is_ok() {
            return;
        }
        debug!(spacing_ms = self.spacing.as_millis() as u64, "rate gate: waiting for slot");
        limiter.until_ready().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[tokio::test]
    async fn test_first_caller_does_not_wait() {
        let gate = RateGate::new(Duration::from_secs(5));
        let start = Instant::now();
        gate.acquire().await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        let spacing = Duration::from_millis(60);
        let gate = Arc::new(RateGate::new(spacing));
        let start = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                gate.acquire().await;
                start.elapsed()
            }));
        }
        let mut waits = Vec::new();
        for h in handles {
            waits.push(h.await.expect("join"));
        }
        waits.sort();
        assert!(waits[0] < spacing);
        assert!(waits[2] >= spacing * 2 - Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_unlimited_gate_never_waits() {
        let gate = RateGate::unlimited();
        assert_eq!(gate.spacing(), Duration::ZERO);
        let start = Instant::now();
        for _ in 0..100 {
            gate.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
