//! Configuration management
//!
//! Handles the download plan (symbols, timeframes, output directory) and the
//! pacing knobs, with two built-in presets and optional JSON config files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::binance::{interval_millis, is_valid_interval, MAX_KLINES_PER_REQUEST};
use crate::common::FixedDelay;

/// One timeframe to download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeframeSpec {
    /// Name used in the output file (`BTCUSDT_<name>.json`)
    pub name: String,
    /// Interval code sent to the exchange
    pub interval_code: String,
    /// How many days of history to request
    pub lookback_days: u32,
}

impl TimeframeSpec {
    pub fn new(name: &str, interval_code: &str, lookback_days: u32) -> Self {
        TimeframeSpec {
            name: name.to_string(),
            interval_code: interval_code.to_string(),
            lookback_days,
        }
    }

    /// Timeframe whose file name and exchange code are the same
    pub fn simple(code: &str, lookback_days: u32) -> Self {
        Self::new(code, code, lookback_days)
    }

    /// Candle duration in milliseconds; unknown codes count as one minute
    pub fn interval_ms(&self) -> i64 {
        interval_millis(&self.interval_code).unwrap_or(60_000)
    }
}

/// How the fetcher walks through a lookback window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaginationMode {
    /// Each request covers at most one page worth of candles and a short
    /// page means the present has been reached
    #[default]
    Windowed,
    /// Each request spans to the end of the window; only an empty page or
    /// the cursor passing the end stops the walk
    Cursor,
}

/// Built-in download plans
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Preset {
    /// Every timeframe from 1m to 1d, skipping datasets already on disk
    #[default]
    AllTimeframes,
    /// One year of 1h candles, always re-downloaded
    Hourly,
}

impl std::str::FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all-timeframes" | "all" => Ok(Preset::AllTimeframes),
            "hourly" | "1h" => Ok(Preset::Hourly),
            _ => Err(format!(
                "Unknown preset: {}. Use 'all-timeframes' or 'hourly'",
                s
            )),
        }
    }
}

impl std::fmt::Display for Preset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preset::AllTimeframes => write!(f, "all-timeframes"),
            Preset::Hourly => write!(f, "hourly"),
        }
    }
}

/// Full configuration for a download run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetcherConfig {
    pub symbols: Vec<String>,
    pub timeframes: Vec<TimeframeSpec>,
    pub data_dir: PathBuf,
    /// Klines requested per page (exchange maximum is 1000)
    pub page_limit: u32,
    pub pagination: PaginationMode,
    /// Treat an existing dataset file as already downloaded
    pub skip_existing: bool,
    /// Retries of a transient page failure before the pair is abandoned
    pub max_retries: u32,
    pub page_delay_ms: u64,
    pub retry_delay_ms: u64,
    pub pair_delay_ms: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self::all_timeframes()
    }
}

impl FetcherConfig {
    /// Multi-timeframe plan: 1m back to 1d with growing lookbacks
    pub fn all_timeframes() -> Self {
        FetcherConfig {
            symbols: default_symbols(),
            timeframes: vec![
                TimeframeSpec::simple("1m", 7),
                TimeframeSpec::simple("5m", 30),
                TimeframeSpec::simple("15m", 90),
                TimeframeSpec::simple("1h", 365),
                TimeframeSpec::simple("4h", 365 * 2),
                TimeframeSpec::simple("1d", 365 * 3),
            ],
            data_dir: default_data_dir(),
            page_limit: MAX_KLINES_PER_REQUEST,
            pagination: PaginationMode::Windowed,
            skip_existing: true,
            max_retries: 3,
            page_delay_ms: 500,
            retry_delay_ms: 1000,
            pair_delay_ms: 1000,
        }
    }

    /// Single-timeframe plan: one year of hourly candles
    pub fn hourly() -> Self {
        FetcherConfig {
            timeframes: vec![TimeframeSpec::simple("1h", 365)],
            pagination: PaginationMode::Cursor,
            skip_existing: false,
            ..Self::all_timeframes()
        }
    }

    pub fn from_preset(preset: Preset) -> Self {
        match preset {
            Preset::AllTimeframes => Self::all_timeframes(),
            Preset::Hourly => Self::hourly(),
        }
    }

    /// Load configuration from JSON file; missing fields take the
    /// all-timeframes defaults
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: FetcherConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Apply `KLINE_DATA_DIR` from the environment, if set
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("KLINE_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.data_dir = PathBuf::from(dir);
            }
        }
    }

    /// Reject plans that cannot produce any request
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("No symbols configured");
        }
        if self.timeframes.is_empty() {
            anyhow::bail!("No timeframes configured");
        }
        if self.page_limit == 0 || self.page_limit > MAX_KLINES_PER_REQUEST {
            anyhow::bail!(
                "page_limit must be between 1 and {}, got {}",
                MAX_KLINES_PER_REQUEST,
                self.page_limit
            );
        }

        for tf in &self.timeframes {
            if !is_valid_interval(&tf.interval_code) {
                warn!(
                    "Interval '{}' for timeframe '{}' is not a known Binance interval",
                    tf.interval_code, tf.name
                );
            }
            if interval_millis(&tf.interval_code).is_none() {
                warn!(
                    "Cannot derive a duration for interval '{}', paging as 1m",
                    tf.interval_code
                );
            }
        }

        Ok(())
    }

    /// Fixed-delay pacing built from the configured delays
    pub fn fixed_delay(&self) -> FixedDelay {
        FixedDelay::new(
            Duration::from_millis(self.page_delay_ms),
            Duration::from_millis(self.retry_delay_ms),
            Duration::from_millis(self.pair_delay_ms),
        )
    }

    /// Number of (symbol, timeframe) pairs in the plan
    pub fn pair_count(&self) -> usize {
        self.symbols.len() * self.timeframes.len()
    }
}

fn default_symbols() -> Vec<String> {
    ["BTCUSDT", "ETHUSDT", "SOLUSDT", "XRPUSDT"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// `public/data` under the project root
pub fn default_data_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("public").join("data")
}
