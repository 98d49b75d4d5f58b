//! Per-user rate limiting for queue uploads and submissions
//!
//! Uses a simple token bucket algorithm with in-memory storage.
//! Tokens are stored per user id and refill over time.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::{Duration, Instant};

use uuid::Uuid;

/// Rate limiter configuration
pub struct RateLimitConfig {
    /// Maximum tokens (burst capacity)
    pub max_tokens: u32,
    /// Tokens added per second
    pub refill_rate: f64,
}

struct UserBucket {
    tokens: f64,
    last_update: Instant,
}

/// Per-user rate limiter using token bucket algorithm
pub struct UserRateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<Uuid, UserBucket>>,
}

impl UserRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Check if a request is allowed for the given user.
    /// Returns true if allowed, false if rate limited.
    pub fn check(&self, user_id: Uuid) -> bool {
        self.check_at(user_id, Instant::now())
    }

    fn check_at(&self, user_id: Uuid, now: Instant) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);

        let bucket = buckets.entry(user_id).or_insert_with(|| UserBucket {
            tokens: self.config.max_tokens as f64,
            last_update: now,
        });

        // Refill tokens based on time elapsed
        let elapsed = now.saturating_duration_since(bucket.last_update);
        let refill = elapsed.as_secs_f64() * self.config.refill_rate;
        bucket.tokens = (bucket.tokens + refill).min(self.config.max_tokens as f64);
        bucket.last_update = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop buckets of users idle for longer than `max_age`
    pub fn cleanup(&self, max_age: Duration) {
        let mut buckets = self.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        buckets.retain(|_, bucket| now.duration_since(bucket.last_update) < max_age);
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

/// Queue uploads (file picker and webcam clips)
/// - Burst of 30 files
/// - Sustained 1 file/second
pub static UPLOAD_RATE_LIMITER: LazyLock<UserRateLimiter> = LazyLock::new(|| {
    UserRateLimiter::new(RateLimitConfig {
        max_tokens: 30,
        refill_rate: 1.0,
    })
});

/// Batch submissions
/// - Burst of 5
/// - Sustained 1 every 10 seconds
pub static SUBMIT_RATE_LIMITER: LazyLock<UserRateLimiter> = LazyLock::new(|| {
    UserRateLimiter::new(RateLimitConfig {
        max_tokens: 5,
        refill_rate: 0.1,
    })
});

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_then_refill() {
        let limiter = UserRateLimiter::new(RateLimitConfig {
            max_tokens: 2,
            refill_rate: 1.0,
        });
        let user = Uuid::new_v4();
        let t0 = Instant::now();

        assert!(limiter.check_at(user, t0));
        assert!(limiter.check_at(user, t0));
        assert!(!limiter.check_at(user, t0));

        // Other users have their own bucket
        assert!(limiter.check_at(Uuid::new_v4(), t0));

        assert!(limiter.check_at(user, t0 + Duration::from_millis(1100)));
    }

    #[test]
    fn cleanup_forgets_idle_users() {
        let limiter = UserRateLimiter::new(RateLimitConfig {
            max_tokens: 1,
            refill_rate: 1.0,
        });
        limiter.check(Uuid::new_v4());
        assert_eq!(limiter.tracked(), 1);
        limiter.cleanup(Duration::ZERO);
        assert_eq!(limiter.tracked(), 0);
    }
}
