//! Scheduling policy between exchange requests
//!
//! The fetcher never sleeps on its own; it calls [`Throttle::pace`] at each
//! suspension point and the injected policy decides how long to wait.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Suspension points in a download run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pace {
    /// Right before any request goes out, retries included
    Request,
    /// Between two pages of the same (symbol, timeframe) pair
    Page,
    /// Before repeating a failed page request
    Retry,
    /// After a pair's dataset has been written
    Pair,
}

/// Pacing policy awaited by the fetcher
#[async_trait]
pub trait Throttle: Send + Sync {
    async fn pace(&self, pace: Pace);
}

#[async_trait]
impl<T: Throttle + ?Sized> Throttle for Arc<T> {
    async fn pace(&self, pace: Pace) {
        (**self).pace(pace).await
    }
}

/// Plain wall-clock sleeps with one fixed delay per suspension point
///
/// Individual requests are not delayed; the page, retry and pair pauses
/// already separate them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedDelay {
    pub page: Duration,
    pub retry: Duration,
    pub pair: Duration,
}

impl Default for FixedDelay {
    fn default() -> Self {
        Self {
            page: Duration::from_millis(500),
            retry: Duration::from_secs(1),
            pair: Duration::from_secs(1),
        }
    }
}

impl FixedDelay {
    pub fn new(page: Duration, retry: Duration, pair: Duration) -> Self {
        Self { page, retry, pair }
    }

    /// Delay applied at the given suspension point
    pub fn delay_for(&self, pace: Pace) -> Duration {
        match pace {
            Pace::Request => Duration::ZERO,
            Pace::Page => self.page,
            Pace::Retry => self.retry,
            Pace::Pair => self.pair,
        }
    }
}

#[async_trait]
impl Throttle for FixedDelay {
    async fn pace(&self, pace: Pace) {
        let delay = self.delay_for(pace);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
