//! Technical indicator source.
//!
//! Indicators need history before the first requested date to warm up, so
//! [`IndicatorSource`] loads bars from `start - lookback_days`, computes every
//! series over the full history, then trims the result to `[start, end]`.
//! Rows still inside a warm-up window hold `NaN`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use ingest_core::{
    DataSource, DateRange, FeatureTable, IngestError, OhlcvBar, Result, SourceState, Symbol,
};
use tracing::debug;

use crate::price::BarLoader;

/// Columns produced by [`IndicatorSource`].
pub const INDICATOR_COLUMNS: [&str; 19] = [
    "sma_5",
    "sma_10",
    "sma_20",
    "sma_50",
    "ema_12",
    "ema_26",
    "macd",
    "macd_signal",
    "macd_hist",
    "rsi_14",
    "bb_upper",
    "bb_middle",
    "bb_lower",
    "bb_width",
    "atr_14",
    "volatility_20",
    "return_pct",
    "volume_sma_20",
    "volume_ratio",
];

/// Simple moving average. The first `period - 1` values are `NaN`.
#[must_use]
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Exponential moving average seeded with the SMA of the first `period` values.
#[must_use]
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// EMA over a series that starts with `NaN` warm-up values.
fn ema_skip_nan(values: &[f64], period: usize) -> Vec<f64> {
    let first = values.iter().position(|v| !v.is_nan()).unwrap_or(values.len());
    let mut out = vec![f64::NAN; first];
    out.extend(ema(&values[first..], period));
    out
}

/// Rolling population standard deviation.
#[must_use]
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 {
        return out;
    }
    for i in (period.saturating_sub(1))..values.len() {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        out[i] = var.sqrt();
    }
    out
}

/// Wilder's RSI. Values lie in `[0, 100]`; the first `period` rows are `NaN`.
#[must_use]
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }
    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let mut avg_gain = changes[..period].iter().map(|c| c.max(0.0)).sum::<f64>() / period as f64;
    let mut avg_loss = changes[..period].iter().map(|c| (-c).max(0.0)).sum::<f64>() / period as f64;

    let to_rsi = |gain: f64, loss: f64| {
        if loss == 0.0 {
            if gain == 0.0 { 50.0 } else { 100.0 }
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        }
    };

    out[period] = to_rsi(avg_gain, avg_loss);
    for i in period..changes.len() {
        let change = changes[i];
        avg_gain = (avg_gain * (period as f64 - 1.0) + change.max(0.0)) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + (-change).max(0.0)) / period as f64;
        out[i + 1] = to_rsi(avg_gain, avg_loss);
    }
    out
}

/// Average true range with Wilder smoothing.
#[must_use]
pub fn atr(bars: &[OhlcvBar], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; bars.len()];
    if period == 0 || bars.len() < period {
        return out;
    }
    let true_ranges: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            let range = bar.high - bar.low;
            match i.checked_sub(1).map(|p| bars[p].close) {
                Some(prev_close) => range
                    .max((bar.high - prev_close).abs())
                    .max((bar.low - prev_close).abs()),
                None => range,
            }
        })
        .collect();
    let mut prev = true_ranges[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    for i in period..bars.len() {
        prev = (prev * (period as f64 - 1.0) + true_ranges[i]) / period as f64;
        out[i] = prev;
    }
    out
}

/// Day-over-day percentage change. The first row is `NaN`.
#[must_use]
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in 1..values.len() {
        if values[i - 1] != 0.0 {
            out[i] = (values[i] / values[i - 1] - 1.0) * 100.0;
        }
    }
    out
}

/// Computes every indicator column over `bars`, which must be date-sorted.
pub fn indicator_table(bars: &[OhlcvBar]) -> Result<FeatureTable> {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let ema_12 = ema(&closes, 12);
    let ema_26 = ema(&closes, 26);
    let macd: Vec<f64> = ema_12.iter().zip(&ema_26).map(|(f, s)| f - s).collect();
    let macd_signal = ema_skip_nan(&macd, 9);
    let macd_hist: Vec<f64> = macd.iter().zip(&macd_signal).map(|(m, s)| m - s).collect();

    let bb_middle = sma(&closes, 20);
    let bb_std = rolling_std(&closes, 20);
    let bb_upper: Vec<f64> = bb_middle.iter().zip(&bb_std).map(|(m, s)| m + 2.0 * s).collect();
    let bb_lower: Vec<f64> = bb_middle.iter().zip(&bb_std).map(|(m, s)| m - 2.0 * s).collect();
    let bb_width: Vec<f64> = bb_upper
        .iter()
        .zip(&bb_lower)
        .zip(&bb_middle)
        .map(|((u, l), m)| if *m == 0.0 { f64::NAN } else { (u - l) / m })
        .collect();

    let returns = pct_change(&closes);
    let volatility_20 = rolling_std(&returns, 20);

    let volume_sma_20 = sma(&volumes, 20);
    let volume_ratio: Vec<f64> = volumes
        .iter()
        .zip(&volume_sma_20)
        .map(|(v, avg)| if *avg > 0.0 { v / avg } else { f64::NAN })
        .collect();

    FeatureTable::from_columns(
        bars.iter().map(|b| b.date).collect(),
        vec![
            ("sma_5", sma(&closes, 5)),
            ("sma_10", sma(&closes, 10)),
            ("sma_20", bb_middle.clone()),
            ("sma_50", sma(&closes, 50)),
            ("ema_12", ema_12),
            ("ema_26", ema_26),
            ("macd", macd),
            ("macd_signal", macd_signal),
            ("macd_hist", macd_hist),
            ("rsi_14", rsi(&closes, 14)),
            ("bb_upper", bb_upper),
            ("bb_middle", bb_middle),
            ("bb_lower", bb_lower),
            ("bb_width", bb_width),
            ("atr_14", atr(bars, 14)),
            ("volatility_20", volatility_20),
            ("return_pct", returns),
            ("volume_sma_20", volume_sma_20),
            ("volume_ratio", volume_ratio),
        ],
    )
}

/// Technical indicators computed from daily bars.
#[derive(Debug)]
pub struct IndicatorSource {
    name: String,
    priority: i32,
    lookback_days: i64,
    loader: Arc<dyn BarLoader>,
    state: SourceState,
}

impl IndicatorSource {
    /// Default priority: below prices.
    pub const DEFAULT_PRIORITY: i32 = 1;

    /// Calendar days loaded before `start` to warm up the slowest indicator.
    pub const DEFAULT_LOOKBACK_DAYS: i64 = 100;

    /// Creates an indicator source named `"indicators"` over `loader`.
    #[must_use]
    pub fn new(loader: Arc<dyn BarLoader>) -> Self {
        Self {
            name: "indicators".to_string(),
            priority: Self::DEFAULT_PRIORITY,
            lookback_days: Self::DEFAULT_LOOKBACK_DAYS,
            loader,
            state: SourceState::new(),
        }
    }

    /// Renames the source.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the merge priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the warm-up lookback.
    #[must_use]
    pub const fn with_lookback_days(mut self, days: i64) -> Self {
        self.lookback_days = days;
        self
    }
}

#[async_trait]
impl DataSource for IndicatorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn feature_columns(&self) -> Vec<String> {
        INDICATOR_COLUMNS.iter().map(|c| (*c).to_string()).collect()
    }

    fn state(&self) -> &SourceState {
        &self.state
    }

    async fn fetch(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<FeatureTable> {
        let range = DateRange::new(start, end)?;
        let warm_start = start - Duration::days(self.lookback_days);
        let mut bars = self.loader.load_bars(symbol, warm_start, end).await?;
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);

        if !bars.iter().any(|b| range.contains(b.date)) {
            return Err(IngestError::DataNotAvailable {
                symbol: symbol.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        debug!(
            source = %self.name,
            symbol = %symbol,
            bars = bars.len(),
            "Computing indicators"
        );
        indicator_table(&bars)?.filter_range(range)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::price::StaticBarLoader;

    fn bars(n: usize) -> Vec<OhlcvBar> {
        let first = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
        (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.7).sin() * 5.0 + i as f64 * 0.1;
                OhlcvBar::new(
                    first + Duration::days(i as i64),
                    close - 0.5,
                    close + 1.0,
                    close - 1.0,
                    close,
                    1_000.0 + i as f64,
                )
            })
            .collect()
    }

    #[test]
    fn test_sma_and_ema_warm_up() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        let s = sma(&values, 3);
        assert!(s[1].is_nan());
        assert_eq!(&s[2..], &[2.0, 3.0, 4.0]);

        let e = ema(&values, 3);
        assert!(e[1].is_nan());
        assert_eq!(e[2], 2.0);
        assert!((e[3] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_rsi_bounds() {
        let rising: Vec<f64> = (0..30).map(f64::from).collect();
        let r = rsi(&rising, 14);
        assert!(r[13].is_nan());
        assert_eq!(r[14], 100.0);

        let closes: Vec<f64> = bars(120).iter().map(|b| b.close).collect();
        assert!(
            rsi(&closes, 14)
                .iter()
                .filter(|v| !v.is_nan())
                .all(|v| (0.0..=100.0).contains(v))
        );
    }

    #[test]
    fn test_atr_uses_previous_close() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let bars = vec![
            OhlcvBar::new(d, 10.0, 11.0, 9.0, 10.0, 1.0),
            OhlcvBar::new(d + Duration::days(1), 14.0, 15.0, 13.0, 14.0, 1.0),
        ];
        let a = atr(&bars, 2);
        // true ranges: 2.0, then max(2, |15-10|, |13-10|) = 5.0
        assert_eq!(a[1], 3.5);
    }

    #[tokio::test]
    async fn test_indicator_source_trims_to_range_after_warm_up() {
        let history = bars(200);
        let loader = Arc::new(StaticBarLoader::new().with_bars("AAPL", history.clone()));
        let source = IndicatorSource::new(loader);

        let start = history[150].date;
        let end = history[159].date;
        let table = source.fetch(&Symbol::new("AAPL"), start, end).await.unwrap();

        assert_eq!(table.height(), 10);
        assert_eq!(table.dates()[0], start);
        assert_eq!(table.width(), INDICATOR_COLUMNS.len());
        // 100 lookback days cover the 50-day SMA warm-up.
        assert!(table.value(0, "sma_50").is_some());
        assert!(table.value(0, "macd_signal").is_some());
    }

    #[tokio::test]
    async fn test_range_without_bars_fails() {
        let loader = Arc::new(StaticBarLoader::new().with_bars("AAPL", bars(10)));
        let source = IndicatorSource::new(loader);
        let start = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let result = source
            .fetch(&Symbol::new("AAPL"), start, start + Duration::days(5))
            .await;
        assert!(matches!(result, Err(IngestError::DataNotAvailable { .. })));
    }
}
