//! Historical Kline Downloader
//!
//! Downloads OHLCV candles from the Binance public kline endpoint and stores
//! them as JSON datasets (`<SYMBOL>_<timeframe>.json`) for a backtester.
//!
//! # Example
//! ```no_run
//! use kline_downloader::binance::BinanceClient;
//! use kline_downloader::{FetcherConfig, HistoricalDataFetcher};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = FetcherConfig::hourly();
//!     let throttle = config.fixed_delay();
//!     let fetcher = HistoricalDataFetcher::new(config, BinanceClient::new()?, throttle);
//!     let summary = fetcher.run().await?;
//!     println!("Created {} data files", summary.produced());
//!     Ok(())
//! }
//! ```

pub mod binance;
pub mod common;
pub mod config;
pub mod fetcher;
pub mod source;
pub mod storage;
pub mod types;

pub use config::{FetcherConfig, PaginationMode, Preset, TimeframeSpec};
pub use fetcher::{DownloadError, HistoricalDataFetcher, PairOutcome, RunSummary};
pub use source::{FetchError, KlineSource, PageOutcome};
pub use types::*;

// Re-export exchange client for convenience
pub use binance::BinanceClient;
