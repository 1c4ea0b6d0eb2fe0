//! Yahoo Finance bar loader.
//!
//! Loads daily bars from Yahoo Finance's chart API. Wrap it in a
//! [`PriceSource`](crate::PriceSource) or
//! [`IndicatorSource`](crate::IndicatorSource) to expose it as a data source.
//!
//! ```no_run
//! use std::sync::Arc;
//! use ingest_sources::{PriceSource, YahooBarLoader};
//!
//! let source = PriceSource::new(Arc::new(YahooBarLoader::new()));
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use ingest_core::{IngestError, OhlcvBar, Result, Symbol};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};

use crate::price::BarLoader;

const CHART_ENDPOINT: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Minimum spacing between two requests from one loader.
const MIN_REQUEST_SPACING: Duration = Duration::from_secs(1);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Yahoo rejects requests without a browser-like agent.
const BROWSER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36";

/// Suggested back-off when Yahoo answers 429.
const THROTTLE_BACKOFF: Duration = Duration::from_secs(60);

const PROVIDER: &str = "Yahoo Finance";

/// Spaces requests at least `spacing` apart.
///
/// The lock is held while waiting, so concurrent callers queue up in order.
#[derive(Debug)]
struct RequestPacer {
    spacing: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RequestPacer {
    fn new(spacing: Duration) -> Self {
        Self {
            spacing,
            next_slot: Mutex::new(None),
        }
    }

    async fn wait_turn(&self) {
        let mut next_slot = self.next_slot.lock().await;
        if let Some(slot) = *next_slot {
            if slot > Instant::now() {
                debug!(wait_ms = (slot - Instant::now()).as_millis() as u64, "Pacing request");
                sleep_until(slot).await;
            }
        }
        *next_slot = Some(Instant::now() + self.spacing);
    }
}

/// Daily bar loader backed by the Yahoo Finance chart API.
#[derive(Debug)]
pub struct YahooBarLoader {
    client: reqwest::Client,
    pacer: RequestPacer,
}

impl YahooBarLoader {
    /// A loader issuing at most one request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(MIN_REQUEST_SPACING)
    }

    /// A loader using `client` as is; pass one with a browser user agent.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            pacer: RequestPacer::new(MIN_REQUEST_SPACING),
        }
    }

    /// A loader spacing requests at least `spacing` apart.
    #[must_use]
    pub fn with_rate_limit(spacing: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(BROWSER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            client,
            pacer: RequestPacer::new(spacing),
        }
    }

    /// Query pairs covering whole days from `start` to `end`, inclusive.
    fn chart_query(start: NaiveDate, end: NaiveDate) -> [(&'static str, String); 4] {
        let epoch = |date: NaiveDate, time: NaiveTime| {
            Utc.from_utc_datetime(&date.and_time(time)).timestamp()
        };
        let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        [
            ("period1", epoch(start, NaiveTime::MIN).to_string()),
            ("period2", epoch(end, last_second).to_string()),
            ("interval", "1d".to_string()),
            ("includeAdjustedClose", "true".to_string()),
        ]
    }

    fn request_error(e: &reqwest::Error) -> IngestError {
        if e.is_timeout() {
            IngestError::Timeout {
                operation: format!("{PROVIDER} request"),
                seconds: REQUEST_TIMEOUT.as_secs(),
            }
        } else {
            IngestError::Network(e.to_string())
        }
    }

    fn status_error(status: reqwest::StatusCode, symbol: &Symbol) -> Option<IngestError> {
        use reqwest::StatusCode;

        match status {
            s if s.is_success() => None,
            StatusCode::TOO_MANY_REQUESTS => Some(IngestError::RateLimited {
                provider: PROVIDER.to_string(),
                retry_after: Some(THROTTLE_BACKOFF),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(
                IngestError::PermissionDenied(format!("HTTP {status} from {PROVIDER} for {symbol}")),
            ),
            StatusCode::NOT_FOUND => Some(IngestError::SymbolNotFound(symbol.to_string())),
            _ => Some(IngestError::Network(format!("HTTP {status} for {symbol}"))),
        }
    }
}

impl Default for YahooBarLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Parses a chart API payload into bars.
///
/// Rows with any missing OHLC value are dropped; Yahoo emits them for halted
/// sessions.
pub(crate) fn parse_chart(symbol: &Symbol, body: &str) -> Result<Vec<OhlcvBar>> {
    let response: ChartResponse =
        serde_json::from_str(body).map_err(|e| IngestError::Parse(e.to_string()))?;

    if let Some(error) = response.chart.error {
        if error.code == "Not Found" {
            return Err(IngestError::SymbolNotFound(symbol.to_string()));
        }
        return Err(IngestError::Other(format!(
            "{}: {}",
            error.code, error.description
        )));
    }

    let result = response
        .chart
        .result
        .into_iter()
        .flatten()
        .next()
        .ok_or_else(|| IngestError::SymbolNotFound(symbol.to_string()))?;

    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| IngestError::Parse("Missing quote data".to_string()))?;
    let adj_close = result
        .indicators
        .adjclose
        .and_then(|ac| ac.into_iter().next())
        .map(|ac| ac.adjclose)
        .unwrap_or_default();

    let cell = |v: &[Option<f64>], i: usize| v.get(i).copied().flatten();
    let mut bars = Vec::with_capacity(timestamps.len());
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(date) = Utc.timestamp_opt(*ts, 0).single().map(|dt| dt.date_naive()) else {
            continue;
        };
        let (Some(open), Some(high), Some(low), Some(close)) = (
            cell(&quote.open[..], i),
            cell(&quote.high[..], i),
            cell(&quote.low[..], i),
            cell(&quote.close[..], i),
        ) else {
            continue;
        };
        let volume = quote.volume.get(i).copied().flatten().unwrap_or(0) as f64;
        let mut bar = OhlcvBar::new(date, open, high, low, close, volume);
        if let Some(adj) = cell(&adj_close[..], i) {
            bar = bar.with_adjusted_close(adj);
        }
        bars.push(bar);
    }

    if timestamps.len() > bars.len() {
        debug!(
            symbol = %symbol,
            dropped = timestamps.len() - bars.len(),
            "Dropped incomplete chart rows"
        );
    }

    Ok(bars)
}

#[async_trait]
impl BarLoader for YahooBarLoader {
    async fn load_bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>> {
        if end < start {
            return Err(IngestError::InvalidParameter(format!(
                "Chart range for {symbol} ends ({end}) before it starts ({start})"
            )));
        }

        self.pacer.wait_turn().await;
        debug!(symbol = %symbol, %start, %end, "Requesting chart");

        let response = self
            .client
            .get(format!("{CHART_ENDPOINT}/{symbol}"))
            .query(&Self::chart_query(start, end))
            .send()
            .await
            .map_err(|e| Self::request_error(&e))?;

        if let Some(err) = Self::status_error(response.status(), symbol) {
            return Err(err);
        }

        let body = response.text().await.map_err(|e| Self::request_error(&e))?;
        let mut bars = parse_chart(symbol, &body)?;
        bars.retain(|b| (start..=end).contains(&b.date));
        Ok(bars)
    }
}

// Wire shape of the chart endpoint.

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Option<Vec<ChartData>>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<u64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    adjclose: Vec<Option<f64>>,
}
