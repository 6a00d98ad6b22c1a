//! Binance interval codes and request limits

/// Maximum klines per request (Binance limit)
pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

/// Valid Binance intervals
pub const BINANCE_INTERVALS: &[&str] = &[
    "1s", "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w",
    "1M",
];

const SECOND_MS: i64 = 1000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Check if interval is valid for Binance
pub fn is_valid_interval(interval: &str) -> bool {
    BINANCE_INTERVALS.contains(&interval)
}

/// Duration of one candle in milliseconds, parsed from the interval suffix
///
/// `"15m"` -> 900_000, `"4h"` -> 14_400_000. A month (`"1M"`) counts as
/// 30 days. Returns `None` for codes that do not parse.
pub fn interval_millis(interval: &str) -> Option<i64> {
    let split = interval.len().checked_sub(1)?;
    if !interval.is_char_boundary(split) {
        return None;
    }
    let (count, unit) = interval.split_at(split);
    let count: i64 = count.parse().ok().filter(|n| *n > 0)?;

    let unit_ms = match unit {
        "s" => SECOND_MS,
        "m" => MINUTE_MS,
        "h" => HOUR_MS,
        "d" => DAY_MS,
        "w" => 7 * DAY_MS,
        "M" => 30 * DAY_MS,
        _ => return None,
    };

    count.checked_mul(unit_ms)
}
