//! Daily price source.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use ingest_core::{
    DataSource, FeatureTable, IngestError, OhlcvBar, Result, SourceState, Symbol,
};
use tracing::debug;

/// Columns produced by [`PriceSource`].
pub const PRICE_COLUMNS: [&str; 6] = ["open", "high", "low", "close", "volume", "adj_close"];

/// Loads daily bars from some backing store.
///
/// Loaders return bars for `[start, end]` in any order; callers sort.
#[async_trait]
pub trait BarLoader: Send + Sync + std::fmt::Debug {
    /// Loads bars for `symbol` between `start` and `end`, inclusive.
    async fn load_bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>>;
}

/// Serves bars from memory.
///
/// Useful for replaying stored history and for tests.
#[derive(Debug, Default, Clone)]
pub struct StaticBarLoader {
    bars: HashMap<Symbol, Vec<OhlcvBar>>,
}

impl StaticBarLoader {
    /// Creates an empty loader.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds bars for a symbol, builder style.
    #[must_use]
    pub fn with_bars(mut self, symbol: impl Into<Symbol>, bars: Vec<OhlcvBar>) -> Self {
        self.bars.entry(symbol.into()).or_default().extend(bars);
        self
    }
}

#[async_trait]
impl BarLoader for StaticBarLoader {
    async fn load_bars(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>> {
        let bars = self
            .bars
            .get(symbol)
            .ok_or_else(|| IngestError::SymbolNotFound(symbol.to_string()))?;
        Ok(bars
            .iter()
            .filter(|b| start <= b.date && b.date <= end)
            .cloned()
            .collect())
    }
}

/// Converts bars into a price table, sorted by date.
///
/// A missing adjusted close falls back to the close.
pub fn bars_to_table(mut bars: Vec<OhlcvBar>) -> Result<FeatureTable> {
    bars.sort_by_key(|b| b.date);
    let column = |f: fn(&OhlcvBar) -> f64| bars.iter().map(f).collect::<Vec<f64>>();
    FeatureTable::from_columns(
        bars.iter().map(|b| b.date).collect(),
        vec![
            ("open", column(|b| b.open)),
            ("high", column(|b| b.high)),
            ("low", column(|b| b.low)),
            ("close", column(|b| b.close)),
            ("volume", column(|b| b.volume)),
            ("adj_close", column(|b| b.adjusted_close.unwrap_or(b.close))),
        ],
    )
}

/// Daily OHLCV features.
#[derive(Debug)]
pub struct PriceSource {
    name: String,
    priority: i32,
    loader: Arc<dyn BarLoader>,
    state: SourceState,
}

impl PriceSource {
    /// Default priority: prices win every conflict.
    pub const DEFAULT_PRIORITY: i32 = 0;

    /// Creates a price source named `"prices"` over `loader`.
    #[must_use]
    pub fn new(loader: Arc<dyn BarLoader>) -> Self {
        Self {
            name: "prices".to_string(),
            priority: Self::DEFAULT_PRIORITY,
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
}

#[async_trait]
impl DataSource for PriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn feature_columns(&self) -> Vec<String> {
        PRICE_COLUMNS.iter().map(|c| (*c).to_string()).collect()
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
        let bars = self.loader.load_bars(symbol, start, end).await?;
        if bars.is_empty() {
            return Err(IngestError::DataNotAvailable {
                symbol: symbol.to_string(),
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        debug!(source = %self.name, symbol = %symbol, bars = bars.len(), "Loaded price bars");
        bars_to_table(bars)
    }
}
