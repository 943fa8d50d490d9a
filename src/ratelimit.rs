//! # Dispatch Rate Limiting
//!
//! A token-bucket limiter capping how many reconciliations per second
//! the source controllers dispatch cluster-wide. Failure retries are
//! paced separately (per-item exponential backoff); this bucket bounds
//! the steady-state load a burst of watch events can put on the API
//! server. Disabled unless a QPS cap is configured.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Bucket state: available tokens and the last refill instant.
#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    refilled_at: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<Bucket>,
    tokens_per_sec: f64,
    burst: f64,
}

impl RateLimiter {
    /// `qps` tokens per second, allowing bursts up to `burst` tokens.
    #[must_use]
    pub fn new(qps: f64, burst: u16) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            bucket: Mutex::new(Bucket {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
            tokens_per_sec: qps.max(f64::MIN_POSITIVE),
            burst,
        }
    }

    /// Take one token, waiting for the bucket to refill if necessary.
    pub async fn acquire(&self) {
        loop {
            let wait = self.try_take(Instant::now());
            match wait {
                None => return,
                Some(delay) => tokio::time::sleep(delay).await,
            }
        }
    }

    /// Refill against `now` and attempt to take one token. Returns the
    /// time to wait before the next attempt when the bucket is empty.
    fn try_take(&self, now: Instant) -> Option<Duration> {
        let mut bucket = self
            .bucket
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let elapsed = now.saturating_duration_since(bucket.refilled_at);
        bucket.tokens =
            (bucket.tokens + elapsed.as_secs_f64() * self.tokens_per_sec).min(self.burst);
        bucket.refilled_at = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            None
        } else {
            let deficit = 1.0 - bucket.tokens;
            Some(Duration::from_secs_f64(deficit / self.tokens_per_sec))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_is_available_immediately() {
        let limiter = RateLimiter::new(10.0, 3);
        let now = Instant::now();
        assert!(limiter.try_take(now).is_none());
        assert!(limiter.try_take(now).is_none());
        assert!(limiter.try_take(now).is_none());
        assert!(limiter.try_take(now).is_some(), "burst exhausted");
    }

    #[test]
    fn test_refill_restores_tokens() {
        let limiter = RateLimiter::new(10.0, 1);
        let start = Instant::now();
        assert!(limiter.try_take(start).is_none());
        assert!(limiter.try_take(start).is_some());
        // 100ms at 10 qps refills one token
        assert!(limiter
            .try_take(start + Duration::from_millis(100))
            .is_none());
    }

    #[test]
    fn test_wait_matches_deficit() {
        let limiter = RateLimiter::new(2.0, 1);
        let start = Instant::now();
        assert!(limiter.try_take(start).is_none());
        let wait = limiter.try_take(start).expect("bucket empty");
        // One token at 2 qps takes 500ms to mint
        assert!(wait <= Duration::from_millis(500));
        assert!(wait >= Duration::from_millis(450));
    }

    #[test]
    fn test_tokens_cap_at_burst() {
        let limiter = RateLimiter::new(100.0, 2);
        let start = Instant::now();
        // A long idle period must not accumulate beyond the burst size
        let later = start + Duration::from_secs(60);
        assert!(limiter.try_take(later).is_none());
        assert!(limiter.try_take(later).is_none());
        assert!(limiter.try_take(later).is_some());
    }

    #[tokio::test]
    async fn test_acquire_returns_under_load() {
        let limiter = RateLimiter::new(1000.0, 2);
        for _ in 0..5 {
            limiter.acquire().await;
        }
    }
}
