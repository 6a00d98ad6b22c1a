//! Download command - fetch kline history from Binance into JSON datasets

use anyhow::{Context, Result};
use kline_downloader::binance::{BinanceClient, BINANCE_API_BASE};
use kline_downloader::common::{RateLimiter, RateLimiterConfig, Throttle};
use kline_downloader::{FetcherConfig, HistoricalDataFetcher, KlineSource, RunSummary};
use tracing::info;

pub fn run(config: FetcherConfig, rate_limit: Option<usize>) -> Result<()> {
    config.validate()?;

    let base_url =
        std::env::var("BINANCE_API_BASE").unwrap_or_else(|_| BINANCE_API_BASE.to_string());
    let client =
        BinanceClient::with_base_url(base_url).context("Failed to create HTTP client")?;

    info!("Data will be saved to {}", config.data_dir.display());

    let timeframes: Vec<&str> = config.timeframes.iter().map(|t| t.name.as_str()).collect();

    println!("\n{}", "=".repeat(60));
    println!("DOWNLOADING HISTORICAL DATA FROM BINANCE");
    println!("{}", "=".repeat(60));
    println!("  Endpoint:   {}", client.base_url());
    println!("  Symbols:    {:?}", config.symbols);
    println!("  Timeframes: {:?}", timeframes);
    println!("  Output:     {}", config.data_dir.display());
    let limiter =
        rate_limit.map(|rps| RateLimiter::new(RateLimiterConfig::default().with_rate(rps)));
    let pacing = match &limiter {
        Some(limiter) => format!("{} requests/s", limiter.capacity()),
        None => format!("{} ms between pages", config.page_delay_ms),
    };
    println!("  Pacing:     {}", pacing);
    println!("{}\n", "=".repeat(60));

    // Create a tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    let summary = match limiter {
        Some(limiter) => rt.block_on(download(config, client, limiter))?,
        None => {
            let delay = config.fixed_delay();
            rt.block_on(download(config, client, delay))?
        }
    };

    print_summary(&summary);
    Ok(())
}

async fn download<S: KlineSource, T: Throttle>(
    config: FetcherConfig,
    source: S,
    throttle: T,
) -> Result<RunSummary> {
    let fetcher = HistoricalDataFetcher::new(config, source, throttle);
    let summary = fetcher.run().await?;
    Ok(summary)
}

fn print_summary(summary: &RunSummary) {
    println!("\n{}", "=".repeat(60));
    println!("DOWNLOAD COMPLETE");
    println!("{}", "=".repeat(60));
    println!("  Written:       {}", summary.written);
    println!("  Skipped:       {}", summary.skipped);
    println!("  Failed:        {}", summary.failed());
    println!("  Total candles: {}", summary.total_candles);
    for failure in &summary.failures {
        println!("  ✗ {} {}: {}", failure.symbol, failure.timeframe, failure.error);
    }
    println!("{}", "=".repeat(60));
}
