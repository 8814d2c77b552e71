//! Bounded retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::warn;

use crate::error::VenueError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least one is always made.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Single attempt, no waiting.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Delay before retry number `attempt` (1-based): `base * 2^(attempt-1)`, capped.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(1000), Duration::from_millis(10_000))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are exhausted. The last error is returned unchanged.
pub async fn retry<T, F, Fut>(policy: RetryPolicy, operation: &str, mut op: F) -> Result<T, VenueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, VenueError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts && err.is_transient() => {
                let delay = policy.delay_for(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Request failed, retrying"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(150))
    }

    // -------------------------------------------------------------------------
    // Backoff Tests
    // -------------------------------------------------------------------------

    #[test]
    fn delay_doubles_then_caps() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_millis(350));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(350));
        assert_eq!(policy.delay_for(30), Duration::from_millis(350));
    }

    // -------------------------------------------------------------------------
    // Retry Tests
    // -------------------------------------------------------------------------

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_until_success() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = retry(policy(), "ticker", move || async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(VenueError::Timeout("slow".into()))
            } else {
                Ok(7)
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(policy(), "ticker", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(VenueError::Network("reset".into()))
        })
        .await;

        assert_eq!(result, Err(VenueError::Network("reset".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = retry(policy(), "create_order", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(VenueError::rejected("insufficient balance"))
        })
        .await;

        assert!(matches!(result, Err(VenueError::Rejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_tries_once() {
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let policy = RetryPolicy::new(0, Duration::ZERO, Duration::ZERO);
        let _ = retry(policy, "ping", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(VenueError::Network("down".into()))
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
