//! Per-connector request limiter.
//!
//! One `governor` GCRA limiter per configured window (hour, minute, second),
//! each allowing its full quota as a burst and refilling at the quota's rate.
//! A request passes the widest window first and waits on each in turn, so it
//! is admitted only once every window has room. The limiter only delays; it
//! never rejects.
//!
//! The limiters are clocked by `tokio::time`, so waits honour a paused test
//! runtime.

use std::num::NonZeroU32;
use std::ops::Add;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use governor::clock::{Clock, Reference};
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovernorRateLimiter};
use tokio::time::Instant;
use tracing::debug;

use crate::domain::RateQuota;

type Window = GovernorRateLimiter<NotKeyed, InMemoryState, TokioClock, NoOpMiddleware<Tick>>;

/// Nanoseconds since the owning clock's anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Tick(u64);

impl Add<Nanos> for Tick {
    type Output = Self;

    fn add(self, other: Nanos) -> Self {
        Self(self.0.saturating_add(other.as_u64()))
    }
}

impl Reference for Tick {
    fn duration_since(&self, earlier: Self) -> Nanos {
        Nanos::from(self.0.saturating_sub(earlier.0))
    }

    fn saturating_sub(&self, duration: Nanos) -> Self {
        Self(self.0.saturating_sub(duration.as_u64()))
    }
}

/// Governor clock reading `tokio::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: Instant,
}

impl TokioClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            anchor: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    type Instant = Tick;

    fn now(&self) -> Tick {
        Tick(u64::try_from(self.anchor.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }
}

pub struct RateLimiter {
    clock: TokioClock,
    /// Widest window first. Windows with a zero cap are left out.
    windows: Vec<(&'static str, Window)>,
    admitted: AtomicU64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(quota: RateQuota) -> Self {
        let clock = TokioClock::new();
        let windows = [
            ("hour", NonZeroU32::new(quota.per_hour).map(Quota::per_hour)),
            ("minute", NonZeroU32::new(quota.per_minute).map(Quota::per_minute)),
            ("second", NonZeroU32::new(quota.per_second).map(Quota::per_second)),
        ]
        .into_iter()
        .filter_map(|(name, quota)| quota.map(|q| (name, Window::direct_with_clock(q, clock))))
        .collect();

        Self {
            clock,
            windows,
            admitted: AtomicU64::new(0),
        }
    }

    /// Wait until one more request fits every window.
    ///
    /// A caller dropped mid-wait may already have spent capacity in the
    /// wider windows.
    pub async fn acquire(&self) {
        for (window, limiter) in &self.windows {
            while let Err(not_until) = limiter.check() {
                let wait = not_until
                    .wait_time_from(self.clock.now())
                    .max(Duration::from_millis(1));
                debug!(window, wait_ms = wait.as_millis() as u64, "Rate limit reached, delaying request");
                tokio::time::sleep(wait).await;
            }
        }
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests admitted since creation.
    #[must_use]
    pub fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Relaxed)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateQuota::default())
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let windows: Vec<&str> = self.windows.iter().map(|(name, _)| *name).collect();
        f.debug_struct("RateLimiter")
            .field("windows", &windows)
            .field("admitted", &self.admitted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn quota(per_second: u32, per_minute: u32) -> RateQuota {
        RateQuota {
            per_second,
            per_minute,
            per_hour: 36_000,
        }
    }

    async fn issue(limiter: &RateLimiter, count: usize) -> Duration {
        let start = Instant::now();
        for _ in 0..count {
            limiter.acquire().await;
        }
        start.elapsed()
    }

    #[tokio::test(start_paused = true)]
    async fn under_quota_is_immediate() {
        let limiter = RateLimiter::new(quota(10, 600));
        assert_eq!(issue(&limiter, 10).await, Duration::ZERO);
        assert_eq!(limiter.admitted(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn excess_over_per_second_is_delayed() {
        let limiter = RateLimiter::new(quota(10, 600));
        let elapsed = issue(&limiter, 11).await;
        assert!(elapsed >= Duration::from_millis(100), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(1), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_load_is_paced_at_the_per_second_quota() {
        let limiter = RateLimiter::new(quota(10, 600));
        // A burst of ten, then one every 100ms.
        let elapsed = issue(&limiter, 30).await;
        assert!(elapsed >= Duration::from_millis(1900), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(3), "elapsed {elapsed:?}");
        assert_eq!(limiter.admitted(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn blocked_acquire_is_pending_and_unrecorded() {
        let limiter = RateLimiter::new(quota(1, 600));
        limiter.acquire().await;

        let mut blocked = tokio_test::task::spawn(limiter.acquire());
        tokio_test::assert_pending!(blocked.poll());
        assert_eq!(limiter.admitted(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn per_minute_window_also_enforced() {
        let limiter = RateLimiter::new(quota(100, 3));
        // Three per minute refill one every 20s.
        let elapsed = issue(&limiter, 4).await;
        assert!(elapsed >= Duration::from_secs(20), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_are_delayed_not_dropped() {
        let limiter = Arc::new(RateLimiter::new(quota(5, 600)));
        let start = Instant::now();
        let handles: Vec<_> = (0..12)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.acquire().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(limiter.admitted(), 12);
        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_caps_leave_the_window_unlimited() {
        let limiter = RateLimiter::new(RateQuota {
            per_second: 0,
            per_minute: 0,
            per_hour: 0,
        });
        assert_eq!(issue(&limiter, 500).await, Duration::ZERO);
    }

    #[test]
    fn clock_ticks_are_saturating() {
        let tick = Tick(5);
        assert_eq!(tick.duration_since(Tick(9)), Nanos::from(0));
        assert_eq!(Reference::saturating_sub(&tick, Nanos::from(10)), Tick(0));
        assert_eq!(tick + Nanos::from(3), Tick(8));
    }
}
