//! Binance API client for downloading historical klines
//! No API key needed for public market data endpoints.

mod client;
mod types;

pub use client::{BinanceClient, BINANCE_API_BASE};
pub use types::*;
