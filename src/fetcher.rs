//! Historical kline downloader
//!
//! Walks each configured (symbol, timeframe) pair through its lookback
//! window one page at a time, remaps the klines into candle records and
//! writes one JSON dataset per pair. Pairs and pages run strictly in
//! sequence; all waiting goes through the injected [`Throttle`].

use chrono::{DateTime, Duration, Utc};
use itertools::iproduct;
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::common::{Pace, Throttle};
use crate::config::{FetcherConfig, PaginationMode, TimeframeSpec};
use crate::source::{FetchError, KlineSource, PageOutcome};
use crate::storage::{dataset_path, write_dataset};
use crate::types::{to_records, KlineError, RawKline};

/// Why a pair produced no dataset
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("download interrupted after {fetched} klines: {source}")]
    Interrupted {
        fetched: usize,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Kline(#[from] KlineError),

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to create data directory {}: {source}", .path.display())]
    DataDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What happened to one (symbol, timeframe) pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Written { path: PathBuf, candles: usize },
    Skipped { path: PathBuf },
}

/// A pair that failed, kept for the end-of-run report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairFailure {
    pub symbol: String,
    pub timeframe: String,
    pub error: String,
}

/// Totals for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub written: usize,
    pub skipped: usize,
    pub total_candles: usize,
    pub failures: Vec<PairFailure>,
}

impl RunSummary {
    /// Datasets present after the run: freshly written plus already on disk
    pub fn produced(&self) -> usize {
        self.written + self.skipped
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

/// `[now - lookback_days, now]` in epoch milliseconds
pub fn lookback_window(lookback_days: u32, now: DateTime<Utc>) -> (i64, i64) {
    let end = now.timestamp_millis();
    let start = (now - Duration::days(i64::from(lookback_days))).timestamp_millis();
    (start, end)
}

/// Downloads kline history for every pair in a [`FetcherConfig`]
pub struct HistoricalDataFetcher<S, T> {
    config: FetcherConfig,
    source: S,
    throttle: T,
}

impl<S: KlineSource, T: Throttle> HistoricalDataFetcher<S, T> {
    pub fn new(config: FetcherConfig, source: S, throttle: T) -> Self {
        HistoricalDataFetcher {
            config,
            source,
            throttle,
        }
    }

    /// Request one page of klines with open time in `[start_ms, end_ms]`
    ///
    /// Every request, first page and retries included, waits on
    /// [`Pace::Request`] before it goes out.
    pub async fn fetch_window(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> PageOutcome {
        self.throttle.pace(Pace::Request).await;
        self.source
            .fetch_window(
                symbol,
                interval,
                start_ms,
                Some(end_ms),
                self.config.page_limit,
            )
            .await
    }

    /// Fetch the timeframe's full lookback window, ending now
    pub async fn fetch_all_history(
        &self,
        symbol: &str,
        timeframe: &TimeframeSpec,
    ) -> Result<Vec<RawKline>, DownloadError> {
        let (start_ms, end_ms) = lookback_window(timeframe.lookback_days, Utc::now());

        info!(
            "Downloading {} days of {} data for {}...",
            timeframe.lookback_days, timeframe.interval_code, symbol
        );

        let klines = self.fetch_range(symbol, timeframe, start_ms, end_ms).await?;

        info!(
            "Downloaded {} candles for {} {}",
            klines.len(),
            symbol,
            timeframe.interval_code
        );
        Ok(klines)
    }

    /// Page through `[start_ms, end_ms)` and return every kline in order
    ///
    /// The cursor moves to one millisecond past the last open time of each
    /// page, so consecutive pages never overlap. The walk ends on an empty
    /// page, once the cursor reaches `end_ms`, or (windowed mode) on a page
    /// shorter than the page limit. A page that does not move the cursor
    /// forward is dropped and ends the walk.
    pub async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: &TimeframeSpec,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<RawKline>, DownloadError> {
        let limit = self.config.page_limit as usize;
        let page_span = i64::from(self.config.page_limit).saturating_mul(timeframe.interval_ms());

        let mut all_klines: Vec<RawKline> = Vec::new();
        let mut current_start = start_ms;
        let mut pages = 0usize;

        while current_start < end_ms {
            if pages > 0 {
                self.throttle.pace(Pace::Page).await;
            }

            let batch_end = match self.config.pagination {
                PaginationMode::Windowed => current_start.saturating_add(page_span).min(end_ms),
                PaginationMode::Cursor => end_ms,
            };

            let klines = match self
                .fetch_page(
                    symbol,
                    &timeframe.interval_code,
                    current_start,
                    batch_end,
                    all_klines.len(),
                )
                .await?
            {
                Some(klines) => klines,
                None => break,
            };
            pages += 1;

            let page_len = klines.len();
            let last_open = match klines.last().map(|k| (k.open_time(), k.0.first())) {
                Some((Some(open_time), _)) => open_time,
                Some((None, raw)) => {
                    return Err(KlineError::BadOpenTime {
                        index: all_klines.len() + page_len - 1,
                        value: raw.map(|v| v.to_string()).unwrap_or_default(),
                    }
                    .into());
                }
                None => break,
            };

            // Start from the next timestamp after the last received candle
            let next_start = last_open.saturating_add(1);
            if next_start <= current_start {
                warn!(
                    "{} {}: page ended at {} before cursor {}, dropping it and stopping",
                    symbol, timeframe.interval_code, last_open, current_start
                );
                break;
            }

            all_klines.extend(klines);
            debug!(
                "Downloaded {} candles, total: {}",
                page_len,
                all_klines.len()
            );

            if self.config.pagination == PaginationMode::Windowed && page_len < limit {
                break;
            }

            current_start = next_start;
        }

        Ok(all_klines)
    }

    /// One page, retrying transient failures up to `max_retries` times.
    /// `Ok(None)` means the exchange has no more history.
    async fn fetch_page(
        &self,
        symbol: &str,
        interval: &str,
        start_ms: i64,
        end_ms: i64,
        fetched: usize,
    ) -> Result<Option<Vec<RawKline>>, DownloadError> {
        let mut attempt = 0u32;

        loop {
            match self.fetch_window(symbol, interval, start_ms, end_ms).await {
                PageOutcome::Page(klines) => return Ok(Some(klines)),
                PageOutcome::EndOfHistory => return Ok(None),
                PageOutcome::TransientFailure(e) => {
                    if !e.is_retryable() || attempt >= self.config.max_retries {
                        return Err(DownloadError::Interrupted { fetched, source: e });
                    }
                    attempt += 1;
                    warn!(
                        "Error fetching {} {} from {}: {} (retry {}/{})",
                        symbol, interval, start_ms, e, attempt, self.config.max_retries
                    );
                    self.throttle.pace(Pace::Retry).await;
                }
            }
        }
    }

    /// Download one pair and write its dataset, unless it is already on disk
    pub async fn download_pair(
        &self,
        symbol: &str,
        timeframe: &TimeframeSpec,
    ) -> Result<PairOutcome, DownloadError> {
        let path = dataset_path(&self.config.data_dir, symbol, &timeframe.name);

        if self.config.skip_existing && path.exists() {
            info!("File {} already exists, skipping...", path.display());
            return Ok(PairOutcome::Skipped { path });
        }

        let raw_klines = self.fetch_all_history(symbol, timeframe).await?;
        let records = to_records(&raw_klines)?;

        write_dataset(&path, &records).map_err(|source| DownloadError::Write {
            path: path.clone(),
            source,
        })?;

        info!("Saved {} candles to {}", records.len(), path.display());
        Ok(PairOutcome::Written {
            path,
            candles: records.len(),
        })
    }

    /// Download every configured pair
    ///
    /// A failing pair is logged and recorded in the summary; the run always
    /// moves on to the next pair.
    pub async fn run(&self) -> Result<RunSummary, DownloadError> {
        let data_dir = &self.config.data_dir;
        fs::create_dir_all(data_dir).map_err(|source| DownloadError::DataDir {
            path: data_dir.clone(),
            source,
        })?;

        info!(
            "Starting download of {} pairs into {}",
            self.config.pair_count(),
            data_dir.display()
        );

        let mut summary = RunSummary::default();

        for (symbol, timeframe) in iproduct!(&self.config.symbols, &self.config.timeframes) {
            match self.download_pair(symbol, timeframe).await {
                Ok(PairOutcome::Written { candles, .. }) => {
                    summary.written += 1;
                    summary.total_candles += candles;
                    self.throttle.pace(Pace::Pair).await;
                }
                Ok(PairOutcome::Skipped { .. }) => summary.skipped += 1,
                Err(e) => {
                    error!("Error downloading {} {}: {}", symbol, timeframe.name, e);
                    summary.failures.push(PairFailure {
                        symbol: symbol.clone(),
                        timeframe: timeframe.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Download complete! Created {} data files in {} ({} written, {} skipped, {} failed)",
            summary.produced(),
            data_dir.display(),
            summary.written,
            summary.skipped,
            summary.failed()
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    const HOUR_MS: i64 = 3_600_000;

    /// Endpoint that replays a fixed list of outcomes and records requests
    struct ScriptedSource {
        outcomes: Mutex<VecDeque<PageOutcome>>,
        requests: Mutex<Vec<(i64, Option<i64>)>>,
    }

    impl ScriptedSource {
        fn new(outcomes: Vec<PageOutcome>) -> Self {
            Self {
                outcomes: Mutex::new(outcomes.into()),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(i64, Option<i64>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KlineSource for ScriptedSource {
        async fn fetch_window(
            &self,
            _symbol: &str,
            _interval: &str,
            start_ms: i64,
            end_ms: Option<i64>,
            _limit: u32,
        ) -> PageOutcome {
            self.requests.lock().unwrap().push((start_ms, end_ms));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(PageOutcome::EndOfHistory)
        }
    }

    #[derive(Default)]
    struct RecordingThrottle {
        paces: Mutex<Vec<Pace>>,
    }

    #[async_trait]
    impl Throttle for RecordingThrottle {
        async fn pace(&self, pace: Pace) {
            self.paces.lock().unwrap().push(pace);
        }
    }

    fn page(open_times: &[i64]) -> PageOutcome {
        PageOutcome::Page(
            open_times
                .iter()
                .map(|t| {
                    serde_json::from_value(json!([t, "1", "2", "0.5", "1.5", "10"])).unwrap()
                })
                .collect(),
        )
    }

    fn failure(status: u16) -> PageOutcome {
        PageOutcome::TransientFailure(FetchError::Status {
            status,
            body: "{}".to_string(),
        })
    }

    fn config(pagination: PaginationMode, page_limit: u32) -> FetcherConfig {
        FetcherConfig {
            page_limit,
            pagination,
            max_retries: 2,
            ..FetcherConfig::hourly()
        }
    }

    fn open_times(klines: &[RawKline]) -> Vec<i64> {
        klines.iter().filter_map(RawKline::open_time).collect()
    }

    #[test]
    fn test_lookback_window() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let (start, end) = lookback_window(7, now);
        assert_eq!(end, now.timestamp_millis());
        assert_eq!(end - start, 7 * 24 * HOUR_MS);
    }

    #[tokio::test]
    async fn test_windowed_stops_on_partial_page() {
        let source = ScriptedSource::new(vec![page(&[0, 1, 2]), page(&[3, 4])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Windowed, 3),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let klines = fetcher.fetch_range("BTCUSDT", &tf, 0, 100).await.unwrap();

        assert_eq!(open_times(&klines), vec![0, 1, 2, 3, 4]);
        assert_eq!(fetcher.source.requests().len(), 2);
        assert_eq!(
            *fetcher.throttle.paces.lock().unwrap(),
            vec![Pace::Request, Pace::Page, Pace::Request]
        );
    }

    #[tokio::test]
    async fn test_windowed_batch_end() {
        let source = ScriptedSource::new(vec![page(&[0, HOUR_MS]), page(&[2 * HOUR_MS])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Windowed, 2),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        fetcher
            .fetch_range("BTCUSDT", &tf, 0, 3 * HOUR_MS)
            .await
            .unwrap();

        let requests = fetcher.source.requests();
        assert_eq!(requests[0], (0, Some(2 * HOUR_MS)));
        // second window is clamped to the end of the lookback
        assert_eq!(requests[1], (HOUR_MS + 1, Some(3 * HOUR_MS)));
    }

    #[tokio::test]
    async fn test_cursor_continues_past_partial_page() {
        let source =
            ScriptedSource::new(vec![page(&[0, 1]), page(&[2]), PageOutcome::EndOfHistory]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 3),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let klines = fetcher.fetch_range("BTCUSDT", &tf, 0, 100).await.unwrap();

        assert_eq!(open_times(&klines), vec![0, 1, 2]);
        let requests = fetcher.source.requests();
        assert_eq!(requests, vec![(0, Some(100)), (2, Some(100)), (3, Some(100))]);
    }

    #[tokio::test]
    async fn test_cursor_stops_at_window_end() {
        let source = ScriptedSource::new(vec![page(&[10, 50]), page(&[99])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 1000),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let klines = fetcher.fetch_range("BTCUSDT", &tf, 0, 100).await.unwrap();

        assert_eq!(open_times(&klines), vec![10, 50, 99]);
        assert_eq!(fetcher.source.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_window_makes_no_request() {
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 1000),
            ScriptedSource::new(vec![]),
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 0);

        let klines = fetcher.fetch_range("BTCUSDT", &tf, 500, 500).await.unwrap();
        assert!(klines.is_empty());
        assert!(fetcher.source.requests().is_empty());
    }

    #[tokio::test]
    async fn test_stalled_cursor_stops() {
        // endpoint ignores startTime and keeps returning the same page
        let source = ScriptedSource::new(vec![page(&[5, 6]), page(&[5, 6]), page(&[5, 6])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 2),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let klines = fetcher.fetch_range("BTCUSDT", &tf, 0, 100).await.unwrap();
        // the repeated page is dropped, not appended
        assert_eq!(open_times(&klines), vec![5, 6]);
        assert_eq!(fetcher.source.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_page_behind_cursor_is_dropped() {
        let source = ScriptedSource::new(vec![page(&[10, 20]), page(&[3, 4])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Windowed, 2),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let klines = fetcher.fetch_range("BTCUSDT", &tf, 0, 100).await.unwrap();
        assert_eq!(open_times(&klines), vec![10, 20]);
    }

    #[tokio::test]
    async fn test_every_request_is_paced() {
        let source = ScriptedSource::new(vec![page(&[0, 1]), failure(503), page(&[2])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 2),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        fetcher.fetch_range("BTCUSDT", &tf, 0, 100).await.unwrap();

        let paces = fetcher.throttle.paces.lock().unwrap();
        let request_paces = paces.iter().filter(|p| **p == Pace::Request).count();
        assert_eq!(request_paces, fetcher.source.requests().len());
        assert_eq!(paces.first(), Some(&Pace::Request));
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let source = ScriptedSource::new(vec![failure(503), failure(429), page(&[0, 1])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Windowed, 5),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let klines = fetcher.fetch_range("BTCUSDT", &tf, 0, 100).await.unwrap();

        assert_eq!(open_times(&klines), vec![0, 1]);
        let requests = fetcher.source.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|(start, _)| *start == 0));
        assert_eq!(
            *fetcher.throttle.paces.lock().unwrap(),
            vec![
                Pace::Request,
                Pace::Retry,
                Pace::Request,
                Pace::Retry,
                Pace::Request
            ]
        );
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let source = ScriptedSource::new(vec![
            page(&[0, 1]),
            failure(500),
            failure(500),
            failure(500),
        ]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 2),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let err = fetcher
            .fetch_range("BTCUSDT", &tf, 0, 100)
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::Interrupted { fetched: 2, .. }));
        // first page, then one attempt plus two retries
        assert_eq!(fetcher.source.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let source = ScriptedSource::new(vec![failure(400), page(&[0])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 2),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let err = fetcher
            .fetch_range("BTCUSDT", &tf, 0, 100)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            DownloadError::Interrupted {
                fetched: 0,
                source: FetchError::Status { status: 400, .. }
            }
        ));
        assert_eq!(fetcher.source.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_open_time_fails() {
        let source = ScriptedSource::new(vec![PageOutcome::Page(vec![RawKline(vec![
            json!("soon"),
            json!("1"),
        ])])]);
        let fetcher = HistoricalDataFetcher::new(
            config(PaginationMode::Cursor, 2),
            source,
            RecordingThrottle::default(),
        );
        let tf = TimeframeSpec::simple("1h", 1);

        let err = fetcher
            .fetch_range("BTCUSDT", &tf, 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DownloadError::Kline(KlineError::BadOpenTime { index: 0, .. })
        ));
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary {
            written: 3,
            skipped: 2,
            total_candles: 10,
            failures: vec![PairFailure {
                symbol: "BTCUSDT".into(),
                timeframe: "1h".into(),
                error: "boom".into(),
            }],
        };
        assert_eq!(summary.produced(), 5);
        assert_eq!(summary.failed(), 1);
    }
}
