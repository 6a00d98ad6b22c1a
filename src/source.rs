//! Exchange seam: where pages of raw klines come from
//!
//! The fetcher only talks to a [`KlineSource`], so tests can replace the
//! Binance client with a scripted endpoint.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::types::RawKline;

/// Failure of a single kline request
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("exchange returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode klines: {0}")]
    Decode(#[from] serde_json::Error),
}

impl FetchError {
    /// Whether repeating the same request may succeed
    ///
    /// Network errors, rate limiting (429, and 418 once Binance bans an IP)
    /// and server errors are retryable. Other client errors, such as an
    /// unknown symbol, and undecodable bodies are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Status { status, .. } => {
                matches!(*status, 418 | 429) || (500..600).contains(status)
            }
            FetchError::Decode(_) => false,
        }
    }
}

/// Result of one page request
#[derive(Debug)]
pub enum PageOutcome {
    /// A non-empty page of klines, ascending by open time
    Page(Vec<RawKline>),
    /// The request succeeded but there are no klines at or after the cursor
    EndOfHistory,
    /// The request failed; the caller decides whether to retry
    TransientFailure(FetchError),
}

impl PageOutcome {
    /// Classify a successful response body
    pub fn from_klines(klines: Vec<RawKline>) -> Self {
        if klines.is_empty() {
            PageOutcome::EndOfHistory
        } else {
            PageOutcome::Page(klines)
        }
    }
}

impl From<Result<Vec<RawKline>, FetchError>> for PageOutcome {
    fn from(result: Result<Vec<RawKline>, FetchError>) -> Self {
        match result {
            Ok(klines) => PageOutcome::from_klines(klines),
            Err(e) => PageOutcome::TransientFailure(e),
        }
    }
}

/// A paginated kline endpoint
#[async_trait]
pub trait KlineSource: Send + Sync {
    /// Fetch up to `limit` klines with open time in `[start_ms, end_ms]`
    ///
    /// `end_ms` of `None` leaves the window open towards the present.
    async fn fetch_window(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: Option<i64>,
        limit: u32,
    ) -> PageOutcome;
}

#[async_trait]
impl<S: KlineSource + ?Sized> KlineSource for Arc<S> {
    async fn fetch_window(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: Option<i64>,
        limit: u32,
    ) -> PageOutcome {
        (**self)
            .fetch_window(symbol, interval, start_ms, end_ms, limit)
            .await
    }
}
