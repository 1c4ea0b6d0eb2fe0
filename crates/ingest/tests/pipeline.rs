//! End-to-end behavior of the manager and the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use ingest::{
    DataSource, FeaturePipeline, FeatureTable, INDICATOR_COLUMNS, IndicatorSource, IngestError,
    NO_DATA, OhlcvBar, PRICE_COLUMNS, PipelineConfig, PriceSource, Result, Severity,
    SourceManager, SourceState, StaticBarLoader, Symbol, TIME_COLUMNS, TimeFeatureSource,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Serves a fixed table, or fails with a fixed message.
#[derive(Debug)]
struct TableSource {
    name: &'static str,
    priority: i32,
    response: std::result::Result<FeatureTable, String>,
    state: SourceState,
}

impl TableSource {
    fn ok(name: &'static str, priority: i32, table: FeatureTable) -> Arc<Self> {
        Arc::new(Self {
            name,
            priority,
            response: Ok(table),
            state: SourceState::new(),
        })
    }

    fn failing(name: &'static str, priority: i32, message: &str) -> Arc<Self> {
        Arc::new(Self {
            name,
            priority,
            response: Err(message.to_string()),
            state: SourceState::new(),
        })
    }
}

#[async_trait]
impl DataSource for TableSource {
    fn name(&self) -> &str {
        self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn feature_columns(&self) -> Vec<String> {
        match &self.response {
            Ok(table) => table.column_names().iter().map(|c| (*c).to_string()).collect(),
            Err(_) => Vec::new(),
        }
    }

    fn state(&self) -> &SourceState {
        &self.state
    }

    async fn fetch(&self, _: &Symbol, _: NaiveDate, _: NaiveDate) -> Result<FeatureTable> {
        self.response.clone().map_err(IngestError::Other)
    }
}

fn weekday_bars(start: NaiveDate, end: NaiveDate) -> Vec<OhlcvBar> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .enumerate()
        .map(|(i, d)| {
            let p = 100.0 + 10.0 * (i as f64 / 10.0).sin();
            OhlcvBar::new(d, p - 0.25, p + 1.0, p - 1.0, p, 1_000_000.0)
        })
        .collect()
}

#[tokio::test]
async fn priority_conflict_keeps_higher_priority_value() {
    let day = date(2024, 1, 2);
    let a = FeatureTable::from_columns(vec![day], vec![("close", vec![100.0])]).unwrap();
    let b = FeatureTable::from_columns(
        vec![day],
        vec![("close", vec![101.0]), ("volume", vec![500.0])],
    )
    .unwrap();

    for parallel in [true, false] {
        let mut manager = SourceManager::default();
        // Registered lowest priority first so registration order cannot help.
        manager.register(TableSource::ok("b", 1, b.clone())).unwrap();
        manager.register(TableSource::ok("a", 0, a.clone())).unwrap();

        let merged = manager
            .fetch_all(&Symbol::new("AAPL"), day, day, parallel)
            .await
            .unwrap();

        assert_eq!(merged.height(), 1);
        assert_eq!(merged.get(day, "close"), Some(100.0));
        assert_eq!(merged.get(day, "volume"), Some(500.0));
    }
}

#[tokio::test]
async fn no_sources_yield_empty_table_and_no_data_verdict() {
    let manager = SourceManager::default();
    let table = manager
        .fetch_all(&Symbol::new("AAPL"), date(2024, 1, 1), date(2024, 3, 1), true)
        .await
        .unwrap();
    assert!(table.is_empty());

    let (ok, errors) = manager.validate_combined(&table, 100, 0.1);
    assert!(!ok);
    assert_eq!(errors, vec![NO_DATA.to_string()]);
}

#[tokio::test]
async fn every_source_failing_is_insufficient_data() {
    let config = PipelineConfig::from_toml_str(
        r#"
        [fallback]
        max_retries = 0
        "#,
    )
    .unwrap();
    let pipeline = FeaturePipeline::new(config)
        .with_source(TableSource::failing("a", 0, "upstream exploded"))
        .unwrap()
        .with_source(TableSource::failing("b", 1, "unauthorized"))
        .unwrap();

    let err = pipeline
        .collect(&Symbol::new("AAPL"), date(2024, 1, 1), date(2024, 3, 1))
        .await
        .unwrap_err();

    match err {
        IngestError::InsufficientData { symbol, errors } => {
            assert_eq!(symbol, "AAPL");
            assert_eq!(errors, vec![NO_DATA.to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let status = pipeline.manager().source_status();
    assert!(status.iter().all(|s| s.last_error.is_some()));
    let stats = pipeline.manager().fallback().unwrap().statistics().await;
    assert_eq!(stats.failure_counts.get("a"), Some(&1));
    assert_eq!(stats.failure_counts.get("b"), Some(&1));
}

#[tokio::test]
async fn pipeline_collects_prices_indicators_and_calendar() {
    let symbol = Symbol::new("AAPL");
    let loader = Arc::new(StaticBarLoader::new().with_bars(
        "AAPL",
        weekday_bars(date(2023, 5, 1), date(2024, 1, 31)),
    ));
    let start = date(2023, 9, 1);
    let end = date(2024, 1, 31);

    let pipeline = FeaturePipeline::default()
        .with_source(Arc::new(PriceSource::new(loader.clone())))
        .unwrap()
        .with_source(Arc::new(IndicatorSource::new(loader)))
        .unwrap()
        .with_source(Arc::new(TimeFeatureSource::new()))
        .unwrap();

    let features = pipeline.collect(&symbol, start, end).await.unwrap();
    let table = &features.table;

    assert_eq!(
        table.width(),
        PRICE_COLUMNS.len() + INDICATOR_COLUMNS.len() + TIME_COLUMNS.len()
    );
    assert!(table.height() >= 100);
    assert_eq!(table.missing_cells(), 0);
    assert_eq!(table.infinite_cells(), 0);
    assert!(table.is_sorted());
    assert_eq!(table.duplicate_dates(), 0);
    assert_eq!(table.dates().first(), Some(&start));

    let report = features.quality.as_ref().unwrap();
    assert_eq!(report.count(Severity::Critical), 0, "{}", report.summary());
    assert_eq!(report.count(Severity::Error), 0, "{}", report.summary());
    assert!(features.is_certified());

    let df = features.to_dataframe().unwrap();
    assert_eq!(df.height(), table.height());
    assert_eq!(df.width(), table.width() + 1);
}

#[tokio::test]
async fn missing_price_columns_fail_the_gate() {
    let pipeline = FeaturePipeline::default()
        .without_quality_check()
        .with_source(Arc::new(TimeFeatureSource::new()))
        .unwrap();

    let err = pipeline
        .collect(&Symbol::new("AAPL"), date(2023, 1, 1), date(2023, 12, 31))
        .await
        .unwrap_err();

    let IngestError::InsufficientData { errors, .. } = err else {
        panic!("expected insufficient data");
    };
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("Missing required columns"));
}
