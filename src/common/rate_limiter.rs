//! Rate Limiter implementation using token bucket algorithm
//!
//! An alternative [`Throttle`] to fixed sleeps: every request takes a token,
//! requests run back to back until the bucket is empty, then wait for the
//! next refill.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::throttle::{Pace, Throttle};

/// Configuration for the rate limiter
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Maximum requests allowed per refill interval
    pub max_requests_per_second: usize,
    /// Refill interval for tokens
    pub refill_interval: Duration,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests_per_second: 10,
            refill_interval: Duration::from_secs(1),
        }
    }
}

impl RateLimiterConfig {
    pub fn with_rate(mut self, requests_per_second: usize) -> Self {
        self.max_requests_per_second = requests_per_second;
        self
    }

    pub fn with_refill_interval(mut self, interval: Duration) -> Self {
        self.refill_interval = interval;
        self
    }
}

#[derive(Debug)]
struct Bucket {
    tokens: usize,
    last_refill: Instant,
}

/// Rate limiter using token bucket algorithm
///
/// # Example
///
/// ```
/// use kline_downloader::common::{RateLimiter, RateLimiterConfig};
///
/// #[tokio::main]
/// async fn main() {
///     let limiter = RateLimiter::new(RateLimiterConfig::default().with_rate(5));
///
///     // Acquire a token before making a request
///     limiter.acquire().await;
/// }
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    refill_interval: Duration,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(config: RateLimiterConfig) -> Self {
        // A zero-capacity bucket would never hand out a token
        let capacity = config.max_requests_per_second.max(1);
        Self {
            capacity,
            refill_interval: config.refill_interval,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Create a rate limiter with a specific requests-per-second limit
    pub fn with_rate(requests_per_second: usize) -> Self {
        Self::new(RateLimiterConfig::default().with_rate(requests_per_second))
    }

    /// Maximum number of tokens (rate limit)
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until a token is available and consume it
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut bucket = self.bucket.lock().await;
                self.refill(&mut bucket);

                if bucket.tokens > 0 {
                    bucket.tokens -= 1;
                    return;
                }
                self.refill_interval
                    .saturating_sub(bucket.last_refill.elapsed())
            };

            tokio::time::sleep(wait).await;
        }
    }

    fn refill(&self, bucket: &mut Bucket) {
        if bucket.last_refill.elapsed() >= self.refill_interval {
            bucket.tokens = self.capacity;
            bucket.last_refill = Instant::now();
        }
    }
}

#[async_trait]
impl Throttle for RateLimiter {
    async fn pace(&self, pace: Pace) {
        match pace {
            Pace::Request => self.acquire().await,
            Pace::Page | Pace::Retry | Pace::Pair => {}
        }
    }
}
