//! Binance API client for fetching historical kline (candlestick) data
//!
//! No API key required for public market data endpoints.
//!
//! # Example
//! ```no_run
//! use kline_downloader::binance::BinanceClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = BinanceClient::new()?;
//!     let klines = client.get_klines("BTCUSDT", "1h", 0, None, 100).await?;
//!     println!("Fetched {} klines", klines.len());
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration as StdDuration;
use tracing::{debug, error};

use super::types::MAX_KLINES_PER_REQUEST;
use crate::source::{FetchError, KlineSource, PageOutcome};
use crate::types::RawKline;

/// Default base URL for the Binance spot API
pub const BINANCE_API_BASE: &str = "https://api.binance.com";

/// Binance API client
#[derive(Debug, Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
}

impl BinanceClient {
    /// Create a client against the public Binance endpoint
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(BINANCE_API_BASE)
    }

    /// Create a client against another host (mirrors, testnets)
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(30))
            .build()?;

        Ok(BinanceClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch klines (candlestick data) from Binance
    ///
    /// # Arguments
    /// * `symbol` - Binance trading pair (e.g., "BTCUSDT")
    /// * `interval` - Timeframe (e.g., "1h", "4h", "1d")
    /// * `start_time` - Start time in milliseconds
    /// * `end_time` - Optional end time in milliseconds
    /// * `limit` - Number of klines to fetch (clamped to 1000)
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        start_time: i64,
        end_time: Option<i64>,
        limit: u32,
    ) -> Result<Vec<RawKline>, FetchError> {
        let url = format!("{}/api/v3/klines", self.base_url);

        let limit = limit.min(MAX_KLINES_PER_REQUEST);
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("startTime", start_time.to_string()),
        ];
        if let Some(end) = end_time {
            params.push(("endTime", end.to_string()));
        }
        params.push(("limit", limit.to_string()));

        debug!(
            "Fetching klines: symbol={}, interval={}, start={}, end={:?}, limit={}",
            symbol, interval, start_time, end_time, limit
        );

        let response = self.client.get(&url).query(&params).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!("Error fetching data: {} - {}", status.as_u16(), body);
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl KlineSource for BinanceClient {
    async fn fetch_window(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: Option<i64>,
        limit: u32,
    ) -> PageOutcome {
        self.get_klines(symbol, interval, start_ms, end_ms, limit)
            .await
            .into()
    }
}
