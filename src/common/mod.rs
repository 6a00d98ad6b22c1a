//! Request pacing shared by the fetcher
//!
//! - Throttle trait with a fixed-delay policy
//! - Rate limiter using token bucket algorithm

pub mod rate_limiter;
pub mod throttle;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
pub use throttle::{FixedDelay, Pace, Throttle};
