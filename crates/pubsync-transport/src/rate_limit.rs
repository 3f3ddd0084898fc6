//! Per-connection rate limiting using a token bucket

use parking_lot::Mutex;
use std::time::Instant;

/// Rate limiter configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained polls per second
    pub requests_per_second: u32,
    /// Bucket capacity
    pub burst_size: u32,
}

impl RateLimitConfig {
    pub fn new(requests_per_second: u32, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    /// Burst defaults to twice the rate
    pub fn from_rate(requests_per_second: u32) -> Self {
        Self::new(requests_per_second, requests_per_second.saturating_mul(2))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(50, 100)
    }
}

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token bucket rate limiter
///
/// Starts full. Tokens refill continuously at `requests_per_second` up to
/// `burst_size`; each request costs one token.
pub struct RateLimiter {
    config: RateLimitConfig,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            bucket: Mutex::new(Bucket {
                tokens: f64::from(config.burst_size),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Take a token. Returns false when the caller is over the limit.
    pub fn try_acquire(&self) -> bool {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole tokens currently available
    pub fn available_tokens(&self) -> u32 {
        let mut bucket = self.bucket.lock();
        self.refill(&mut bucket);
        bucket.tokens as u32
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    fn refill(&self, bucket: &mut Bucket) {
        let now = Instant::now();
        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.last_refill = now;

        let refilled = bucket.tokens + elapsed * f64::from(self.config.requests_per_second);
        bucket.tokens = refilled.min(f64::from(self.config.burst_size));
    }
}
