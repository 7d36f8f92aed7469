//! Spacing for outbound calls to the collection service
//!
//! Submit and analyze share one limiter. The last request time is persisted,
//! so the spacing also holds across a restart.

use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::{Quota, RateLimiter, clock::DefaultClock, state::{InMemoryState, direct::NotKeyed}};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub struct OutboundRateLimiter {
    /// `None` when the interval is zero
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    /// Earliest moment the next request may start
    next_allowed: Mutex<Option<Instant>>,
    interval: Duration,
}

impl OutboundRateLimiter {
    /// One request per `interval`, no burst
    pub fn new(interval: Duration) -> Self {
        let limiter = Quota::with_period(interval).map(RateLimiter::direct);
        Self { limiter, next_allowed: Mutex::new(None), interval }
    }

    /// Limiter that remembers a request finished at `last_request`
    pub fn seeded(interval: Duration, last_request: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        let remaining = last_request.and_then(|last| {
            let elapsed = now.signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
            interval.checked_sub(elapsed).filter(|d| !d.is_zero())
        });

        let mut limiter = Self::new(interval);
        if let Some(remaining) = remaining {
            debug!(remaining_ms = remaining.as_millis(), "rate limiter seeded from persisted request time");
            // persisted times are truncated to the millisecond
            limiter.next_allowed = Mutex::new(Some(Instant::now() + remaining + Duration::from_millis(1)));
        }
        limiter
    }

    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until another outbound request is allowed
    ///
    /// Concurrent callers queue on the lock, so each one starts at least one
    /// interval after the previous.
    pub async fn acquire(&self) {
        if self.interval.is_zero() {
            return;
        }
        let mut next_allowed = self.next_allowed.lock().await;
        if let Some(deadline) = *next_allowed {
            tokio::time::sleep_until(deadline).await;
        }
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
        *next_allowed = Some(Instant::now() + self.interval);
    }

    /// Push the next slot to one interval after a request that just finished
    pub async fn finished(&self) {
        if self.interval.is_zero() {
            return;
        }
        let deadline = Instant::now() + self.interval;
        let mut next_allowed = self.next_allowed.lock().await;
        if next_allowed.is_none_or(|current| current < deadline) {
            *next_allowed = Some(deadline);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn consecutive_acquires_are_spaced() {
        let limiter = OutboundRateLimiter::new(Duration::from_millis(120));
        let start = std::time::Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(230));
    }

    #[tokio::test]
    async fn no_gap_is_shorter_than_the_interval() {
        let interval = Duration::from_millis(40);
        let limiter = OutboundRateLimiter::new(interval);

        let mut starts = Vec::new();
        for _ in 0..10 {
            limiter.acquire().await;
            starts.push(std::time::Instant::now());
            limiter.finished().await;
        }
        for pair in starts.windows(2) {
            let gap = pair[1].duration_since(pair[0]);
            assert!(gap >= interval, "gap {gap:?} shorter than {interval:?}");
        }
    }

    #[tokio::test]
    async fn finished_request_pushes_the_next_slot() {
        let interval = Duration::from_millis(60);
        let limiter = OutboundRateLimiter::new(interval);

        limiter.acquire().await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        limiter.finished().await;
        let done = std::time::Instant::now();

        limiter.acquire().await;
        assert!(done.elapsed() >= interval);
    }

    #[tokio::test]
    async fn seeded_limiter_waits_out_the_remainder() {
        let now = Utc::now();
        let last = now - chrono::Duration::milliseconds(50);
        let limiter = OutboundRateLimiter::seeded(Duration::from_millis(200), Some(last), now);

        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(140));
    }

    #[tokio::test]
    async fn stale_seed_does_not_delay() {
        let now = Utc::now();
        let last = now - chrono::Duration::seconds(10);
        let limiter = OutboundRateLimiter::seeded(Duration::from_millis(200), Some(last), now);

        let start = std::time::Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn zero_interval_never_waits() {
        let limiter = OutboundRateLimiter::new(Duration::ZERO);
        assert_eq!(limiter.interval(), Duration::ZERO);
        let start = std::time::Instant::now();
        for _ in 0..5 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
