//! Kline downloader - main entry point
//!
//! Downloads historical Binance klines for every configured symbol and
//! timeframe and writes one JSON dataset per pair.

use anyhow::{Context, Result};
use clap::Parser;
use kline_downloader::{FetcherConfig, Preset};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "kline-downloader")]
#[command(about = "Download historical OHLCV klines from Binance into JSON datasets", long_about = None)]
#[command(version)]
struct Cli {
    /// Download plan: "all-timeframes" (1m..1d, skips existing files) or "hourly"
    #[arg(short, long, default_value = "all-timeframes")]
    preset: String,

    /// JSON configuration file (replaces the preset)
    #[arg(short, long)]
    config: Option<String>,

    /// Symbols to download (comma-separated). E.g., "BTCUSDT,ETHUSDT"
    #[arg(short, long)]
    symbols: Option<String>,

    /// Output directory (default: public/data under the project root)
    #[arg(short, long)]
    output: Option<String>,

    /// Use a token bucket of N requests/second instead of fixed delays
    #[arg(long)]
    rate_limit: Option<usize>,

    /// Retries of a failed page before the pair is abandoned
    #[arg(long)]
    max_retries: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    // Set log level - filter out noisy external crates
    let level = if verbose { "debug" } else { "info" };
    let filter_str = format!(
        "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn,h2=warn",
        level
    );
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // Same format as the console, without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn build_config(cli: &Cli) -> Result<FetcherConfig> {
    let mut config = match &cli.config {
        Some(path) => FetcherConfig::from_file(path)?,
        None => {
            let preset: Preset = cli.preset.parse().map_err(anyhow::Error::msg)?;
            FetcherConfig::from_preset(preset)
        }
    };

    config.apply_env();

    if let Some(symbols) = &cli.symbols {
        config.symbols = symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(output) = &cli.output {
        config.data_dir = PathBuf::from(output);
    }
    if let Some(retries) = cli.max_retries {
        config.max_retries = retries;
    }

    Ok(config)
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    setup_logging(cli.verbose, "download")?;

    let config = build_config(&cli)?;
    info!(
        "Starting download of historical crypto data at {}",
        chrono::Local::now()
    );

    commands::download::run(config, cli.rate_limit)
}
