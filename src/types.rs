//! Core data types: raw exchange klines and the candle records written to disk

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Number of leading kline fields the remap reads (open time + OHLCV)
const KLINE_FIELDS: usize = 6;

/// Errors raised while remapping a raw kline into a [`CandleRecord`]
#[derive(Debug, Error, PartialEq)]
pub enum KlineError {
    #[error("kline {index} has {len} fields, expected at least 6")]
    TooShort { index: usize, len: usize },

    #[error("kline {index} has a non-integer open time: {value}")]
    BadOpenTime { index: usize, value: String },

    #[error("kline {index} field `{field}` is not numeric: {value}")]
    BadNumber {
        index: usize,
        field: &'static str,
        value: String,
    },
}

/// Raw kline as returned by the exchange
///
/// Binance sends a positional array:
/// `[open_time, open, high, low, close, volume, close_time, quote_volume,
///   trades, taker_buy_base, taker_buy_quote, ignore]`.
/// Only the first six positions are ever read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawKline(pub Vec<Value>);

impl RawKline {
    /// Open time in epoch milliseconds, if position 0 holds an integer
    pub fn open_time(&self) -> Option<i64> {
        self.0.first().and_then(as_millis)
    }
}

impl From<Vec<Value>> for RawKline {
    fn from(fields: Vec<Value>) -> Self {
        RawKline(fields)
    }
}

/// OHLCV candle in the layout the backtester reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleRecord {
    /// Open time, epoch milliseconds
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl CandleRecord {
    /// Remap one raw kline. `index` is only used for error reporting.
    pub fn from_raw(index: usize, raw: &RawKline) -> Result<Self, KlineError> {
        let fields = &raw.0;
        if fields.len() < KLINE_FIELDS {
            return Err(KlineError::TooShort {
                index,
                len: fields.len(),
            });
        }

        let timestamp = as_millis(&fields[0]).ok_or_else(|| KlineError::BadOpenTime {
            index,
            value: fields[0].to_string(),
        })?;

        let number = |pos: usize, field: &'static str| {
            as_float(&fields[pos]).ok_or_else(|| KlineError::BadNumber {
                index,
                field,
                value: fields[pos].to_string(),
            })
        };

        Ok(CandleRecord {
            timestamp,
            open: number(1, "open")?,
            high: number(2, "high")?,
            low: number(3, "low")?,
            close: number(4, "close")?,
            volume: number(5, "volume")?,
        })
    }
}

/// Remap raw klines into candle records, preserving order
///
/// No filtering, sorting or OHLC validation happens here; the exchange
/// already returns pages in ascending open-time order.
pub fn to_records(raw: &[RawKline]) -> Result<Vec<CandleRecord>, KlineError> {
    raw.iter()
        .enumerate()
        .map(|(index, kline)| CandleRecord::from_raw(index, kline))
        .collect()
}

fn as_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// Prices arrive as decimal strings; plain numbers are accepted too.
fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
