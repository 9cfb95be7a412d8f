//! Token Bucket
//!
//! Action requests are gated by token buckets: one per session and,
//! optionally, one per action. A bucket holds at most `burst` tokens and
//! refills at `rate` tokens per second. Each allowed request takes one.
//!
//! Buckets are shared by every concurrent invocation on a session, so the
//! state sits behind a mutex.

use std::time::Instant;

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

#[derive(Debug)]
struct Bucket {
    available: f64,
    last_refill: Instant,
}

/// Internally synchronized token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    rate: f64,
    burst: u32,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    /// Create a full bucket.
    pub fn new(rate: f64, burst: u32) -> Self {
        let burst = burst.max(1);
        Self {
            rate,
            burst,
            bucket: Mutex::new(Bucket {
                available: f64::from(burst),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Build a limiter from configuration, or `None` when limiting is
    /// disabled.
    pub fn from_config(config: &RateLimitConfig) -> Option<Self> {
        config.resolve().map(|(rate, burst)| Self::new(rate, burst))
    }

    /// Refill rate in tokens per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Take a token now.
    pub fn allow(&self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Take a token at the given instant.
    pub fn allow_at(&self, now: Instant) -> bool {
        let mut bucket = self.bucket.lock();

        if now > bucket.last_refill {
            let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
            bucket.available = (bucket.available + elapsed * self.rate).min(f64::from(self.burst));
            bucket.last_refill = now;
        }

        if bucket.available >= 1.0 {
            bucket.available -= 1.0;
            true
        } else {
            false
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_ACTION_BURST, DEFAULT_ACTION_RATE};
    use std::time::Duration;

    #[test]
    fn defaults_applied() {
        let limiter = RateLimiter::from_config(&RateLimitConfig::default()).unwrap();
        assert_eq!(limiter.rate(), DEFAULT_ACTION_RATE);
        assert_eq!(limiter.burst(), DEFAULT_ACTION_BURST);
    }

    #[test]
    fn disabled_with_negative_rate() {
        assert!(RateLimiter::from_config(&RateLimitConfig::DISABLED).is_none());
    }

    #[test]
    fn allows_burst_then_rejects() {
        let limiter = RateLimiter::new(1.0, 3);
        let now = Instant::now();

        for i in 0..3 {
            assert!(limiter.allow_at(now), "request {i} should be allowed within burst");
        }
        assert!(!limiter.allow_at(now), "request beyond burst should be rejected");
    }

    #[test]
    fn refills_over_time() {
        let limiter = RateLimiter::new(2.0, 2);
        let start = Instant::now();

        assert!(limiter.allow_at(start));
        assert!(limiter.allow_at(start));
        assert!(!limiter.allow_at(start));

        let later = start + Duration::from_millis(500);
        assert!(limiter.allow_at(later));
        assert!(!limiter.allow_at(later));

        // Refill never exceeds the burst.
        let much_later = later + Duration::from_secs(60);
        assert!(limiter.allow_at(much_later));
        assert!(limiter.allow_at(much_later));
        assert!(!limiter.allow_at(much_later));
    }
}
