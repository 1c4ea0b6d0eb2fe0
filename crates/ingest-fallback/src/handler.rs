//! Executes recovery strategies.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use ingest_cache::{CacheStats, FeatureCache};
use ingest_core::{DataSource, DateRange, FallbackConfig, FeatureTable, IngestError, Symbol};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::strategy::{RecoveryStrategy, backoff_delay, classify_failure};

/// Chunk length for partial recovery, in calendar days.
const PARTIAL_CHUNK_DAYS: i64 = 30;

/// Result of one recovery attempt.
#[derive(Debug, Clone)]
pub struct RecoveryOutcome {
    /// Recovered table, if any.
    pub table: Option<FeatureTable>,
    /// Strategy that ran.
    pub strategy: RecoveryStrategy,
}

impl RecoveryOutcome {
    const fn new(table: Option<FeatureTable>, strategy: RecoveryStrategy) -> Self {
        Self { table, strategy }
    }

    /// Returns true if a table was recovered.
    #[must_use]
    pub const fn recovered(&self) -> bool {
        self.table.is_some()
    }
}

/// Snapshot of handler state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FallbackStats {
    /// Cache footprint.
    pub cache: CacheStats,
    /// Rolling failure count per source.
    pub failure_counts: HashMap<String, u32>,
    /// Last successful fetch per source.
    pub last_success: HashMap<String, DateTime<Utc>>,
}

/// Recovers failed source fetches.
///
/// One handler is owned by one manager. Counters and cache live behind async
/// locks, but driving the same handler from several coordinating callers at
/// once is unsupported: strategy choice reads the failure count before it is
/// updated.
#[derive(Debug)]
pub struct FallbackHandler {
    config: FallbackConfig,
    cache: FeatureCache,
    failure_counts: RwLock<HashMap<String, u32>>,
    last_success: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl Default for FallbackHandler {
    fn default() -> Self {
        Self::new(FallbackConfig::default())
    }
}

impl FallbackHandler {
    /// Creates a handler with an empty cache sized by `config.cache_ttl_hours`.
    #[must_use]
    pub fn new(config: FallbackConfig) -> Self {
        Self {
            cache: FeatureCache::new(config.cache_ttl()),
            config,
            failure_counts: RwLock::new(HashMap::new()),
            last_success: RwLock::new(HashMap::new()),
        }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// The handler's cache.
    #[must_use]
    pub const fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    /// Rolling failure count for `source`.
    pub async fn failure_count(&self, source: &str) -> u32 {
        self.failure_counts
            .read()
            .await
            .get(source)
            .copied()
            .unwrap_or(0)
    }

    async fn record_failure(&self, source: &str) -> u32 {
        let mut counts = self.failure_counts.write().await;
        let count = counts.entry(source.to_string()).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Records a successful fetch: resets the failure count, stamps the
    /// success time and caches the table.
    pub async fn record_success(
        &self,
        source: &str,
        symbol: &Symbol,
        range: DateRange,
        table: &FeatureTable,
    ) {
        self.failure_counts.write().await.remove(source);
        self.last_success
            .write()
            .await
            .insert(source.to_string(), Utc::now());
        self.cache.put(source, symbol, range, table).await;
    }

    /// Recovers from `error`, raised by `source` for `[start, end]`.
    ///
    /// Exactly one strategy runs. `alternatives` are only consulted by
    /// [`RecoveryStrategy::FallbackToAlternative`]; `source` itself is
    /// skipped if it appears among them.
    #[instrument(
        skip(self, source, error, alternatives),
        fields(source = source.name(), symbol = %symbol)
    )]
    pub async fn handle_failure(
        &self,
        source: &dyn DataSource,
        error: &IngestError,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
        alternatives: &[Arc<dyn DataSource>],
    ) -> RecoveryOutcome {
        let name = source.name();
        let previous = self.failure_count(name).await;
        let strategy = classify_failure(error, previous, &self.config);
        let failures = self.record_failure(name).await;

        info!(
            %strategy,
            failures,
            kind = %error.kind(),
            error = %error,
            "Recovering failed fetch"
        );

        let table = match DateRange::new(start, end) {
            Err(e) => {
                warn!(error = %e, "Cannot recover an invalid range");
                None
            }
            Ok(range) => match strategy {
                RecoveryStrategy::RetryWithBackoff => self.retry(source, symbol, range).await,
                RecoveryStrategy::UseCachedData => self.cached(name, symbol, range).await,
                RecoveryStrategy::PartialDataRecovery => {
                    self.partial(source, symbol, range).await
                }
                RecoveryStrategy::FallbackToAlternative => {
                    self.alternative(name, symbol, range, alternatives).await
                }
                RecoveryStrategy::SkipSource => {
                    source.set_error(&error.to_string());
                    None
                }
            },
        };

        match &table {
            Some(t) => info!(%strategy, rows = t.height(), "Recovery succeeded"),
            None => warn!(%strategy, "Recovery produced no data"),
        }
        RecoveryOutcome::new(table, strategy)
    }

    async fn retry(
        &self,
        source: &dyn DataSource,
        symbol: &Symbol,
        range: DateRange,
    ) -> Option<FeatureTable> {
        let mut last_error = None;
        for attempt in 1..=self.config.max_retries {
            let delay = backoff_delay(&self.config, attempt);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Retrying after backoff");
            sleep(delay).await;

            match source.fetch(symbol, range.start, range.end).await {
                Ok(table) if !table.is_empty() => {
                    source.reset_error();
                    self.record_success(source.name(), symbol, range, &table)
                        .await;
                    return Some(table);
                }
                Ok(_) => {
                    debug!(attempt, "Retry returned no rows");
                    last_error = Some(IngestError::DataNotAvailable {
                        symbol: symbol.to_string(),
                        start: range.start.to_string(),
                        end: range.end.to_string(),
                    });
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Retry failed");
                    last_error = Some(e);
                }
            }
        }

        let message = match last_error {
            Some(e) => format!(
                "Retries exhausted after {} attempts: {e}",
                self.config.max_retries
            ),
            None => "Retries exhausted: retry budget is zero".to_string(),
        };
        source.set_error(&message);
        None
    }

    /// Recovers a fetch that was abandoned at a caller's deadline.
    ///
    /// The failure is counted like any other, but `source` is not contacted
    /// again: only its cached table can be served.
    #[instrument(skip(self, source, error), fields(source = source.name(), symbol = %symbol))]
    pub async fn handle_abandoned(
        &self,
        source: &dyn DataSource,
        error: &IngestError,
        symbol: &Symbol,
        range: DateRange,
    ) -> RecoveryOutcome {
        let strategy = RecoveryStrategy::UseCachedData;
        let failures = self.record_failure(source.name()).await;
        info!(%strategy, failures, error = %error, "Recovering abandoned fetch");

        let table = self.cached(source.name(), symbol, range).await;
        match &table {
            Some(t) => info!(%strategy, rows = t.height(), "Recovery succeeded"),
            None => warn!(%strategy, "Recovery produced no data"),
        }
        RecoveryOutcome::new(table, strategy)
    }

    async fn cached(&self, source: &str, symbol: &Symbol, range: DateRange) -> Option<FeatureTable> {
        self.cache.get(source, symbol, range.start, range.end).await
    }

    async fn partial(
        &self,
        source: &dyn DataSource,
        symbol: &Symbol,
        range: DateRange,
    ) -> Option<FeatureTable> {
        let mut chunks = Vec::new();
        for chunk in range.chunks(PARTIAL_CHUNK_DAYS) {
            match source.fetch(symbol, chunk.start, chunk.end).await {
                Ok(table) if !table.is_empty() => chunks.push(table),
                Ok(_) => debug!(chunk = %chunk, "Chunk returned no rows"),
                Err(e) => warn!(chunk = %chunk, error = %e, "Chunk fetch failed"),
            }
        }
        if chunks.is_empty() {
            return None;
        }

        let combined = match stitch(&chunks) {
            Ok(combined) => combined,
            Err(e) => {
                warn!(error = %e, "Cannot combine recovered chunks");
                return None;
            }
        };

        let expected = range.weekdays();
        let rows = combined.height();
        if !meets_completeness(rows, expected, self.config.min_data_completeness) {
            warn!(
                rows,
                expected,
                threshold = self.config.min_data_completeness,
                "Insufficient partial recovery"
            );
            return None;
        }

        self.cache.put(source.name(), symbol, range, &combined).await;
        Some(combined)
    }

    async fn alternative(
        &self,
        failed: &str,
        symbol: &Symbol,
        range: DateRange,
        alternatives: &[Arc<dyn DataSource>],
    ) -> Option<FeatureTable> {
        let mut ordered: Vec<&Arc<dyn DataSource>> = alternatives
            .iter()
            .filter(|alt| alt.name() != failed)
            .collect();
        ordered.sort_by_key(|alt| alt.priority());

        for alt in ordered {
            if !alt.is_available() {
                debug!(alternative = alt.name(), "Alternative unavailable, skipping");
                continue;
            }
            match alt.fetch(symbol, range.start, range.end).await {
                Ok(table) if !table.is_empty() => {
                    info!(alternative = alt.name(), "Alternative source served the request");
                    self.cache.put(alt.name(), symbol, range, &table).await;
                    return Some(table);
                }
                Ok(_) => debug!(alternative = alt.name(), "Alternative returned no rows"),
                Err(e) => warn!(alternative = alt.name(), error = %e, "Alternative failed"),
            }
        }
        None
    }

    /// Removes cache entries of one source, or all entries.
    pub async fn clear_cache(&self, source: Option<&str>) -> usize {
        self.cache.clear(source).await
    }

    /// Removes cache entries older than the TTL.
    pub async fn clear_expired(&self) -> usize {
        self.cache.clear_expired().await
    }

    /// Cache footprint, failure counts and last-success times.
    pub async fn statistics(&self) -> FallbackStats {
        FallbackStats {
            cache: self.cache.stats().await,
            failure_counts: self.failure_counts.read().await.clone(),
            last_success: self.last_success.read().await.clone(),
        }
    }
}

/// Stacks chunk tables, keeping the first row seen for each date, in date
/// order.
fn stitch(chunks: &[FeatureTable]) -> ingest_core::Result<FeatureTable> {
    let mut combined = FeatureTable::concat(chunks)?;
    combined.dedup_dates()?;
    combined.sort_by_date()?;
    Ok(combined)
}

/// `rows / expected >= threshold`, with an empty expectation met by any rows.
fn meets_completeness(rows: usize, expected: usize, threshold: f64) -> bool {
    if expected == 0 {
        return rows > 0;
    }
    rows as f64 / expected as f64 >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Datelike, Weekday};
    use ingest_core::{Result, SourceState};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn weekdays(range: DateRange) -> impl Iterator<Item = NaiveDate> {
        range
            .start
            .iter_days()
            .take_while(move |x| *x <= range.end)
            .filter(|x| !matches!(x.weekday(), Weekday::Sat | Weekday::Sun))
    }

    fn close_table(dates: Vec<NaiveDate>) -> FeatureTable {
        let close = (0..dates.len()).map(|i| 100.0 + i as f64).collect();
        FeatureTable::from_columns(dates, vec![("close", close)]).unwrap()
    }

    fn weekday_table(range: DateRange) -> FeatureTable {
        close_table(weekdays(range).collect())
    }

    /// Replays scripted responses; once the script runs out it serves the
    /// weekdays of the requested range, minus `drop` dates.
    #[derive(Debug)]
    struct Scripted {
        name: String,
        priority: i32,
        script: Mutex<VecDeque<Result<FeatureTable>>>,
        drop: Vec<NaiveDate>,
        calls: Mutex<Vec<DateRange>>,
        state: SourceState,
    }

    impl Scripted {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                name: name.to_string(),
                priority,
                script: Mutex::new(VecDeque::new()),
                drop: Vec::new(),
                calls: Mutex::new(Vec::new()),
                state: SourceState::new(),
            }
        }

        fn then(self, response: Result<FeatureTable>) -> Self {
            self.script.lock().push_back(response);
            self
        }

        fn dropping(mut self, dates: Vec<NaiveDate>) -> Self {
            self.drop = dates;
            self
        }

        fn calls(&self) -> Vec<DateRange> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl DataSource for Scripted {
        fn name(&self) -> &str {
            &self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn feature_columns(&self) -> Vec<String> {
            vec!["close".to_string()]
        }

        fn state(&self) -> &SourceState {
            &self.state
        }

        async fn fetch(
            &self,
            _symbol: &Symbol,
            start: NaiveDate,
            end: NaiveDate,
        ) -> Result<FeatureTable> {
            let range = DateRange::new(start, end)?;
            self.calls.lock().push(range);
            if let Some(response) = self.script.lock().pop_front() {
                return response;
            }
            Ok(close_table(
                weekdays(range).filter(|x| !self.drop.contains(x)).collect(),
            ))
        }
    }

    fn timeout() -> IngestError {
        IngestError::other("Connection timeout")
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_and_resets_counter() {
        let handler = FallbackHandler::default();
        let source = Scripted::new("prices", 0).then(Err(timeout()));
        let symbol = Symbol::new("AAPL");

        let started = tokio::time::Instant::now();
        let outcome = handler
            .handle_failure(&source, &timeout(), &symbol, d(1, 1), d(1, 5), &[])
            .await;

        assert_eq!(outcome.strategy, RecoveryStrategy::RetryWithBackoff);
        assert!(outcome.recovered());
        // Attempt 1 waits 1s and fails, attempt 2 waits 2s and succeeds.
        let waited = started.elapsed();
        assert!(waited >= Duration::from_secs(3) && waited < Duration::from_secs(4));
        assert_eq!(source.calls().len(), 2);
        assert_eq!(handler.failure_count("prices").await, 0);
        assert!(source.last_error().is_none());

        let stats = handler.statistics().await;
        assert_eq!(stats.cache.entries, 1);
        assert!(stats.last_success.contains_key("prices"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_marks_source() {
        let handler = FallbackHandler::default();
        let source = Scripted::new("prices", 0)
            .then(Err(timeout()))
            .then(Err(timeout()))
            .then(Err(timeout()));
        let symbol = Symbol::new("AAPL");

        let outcome = handler
            .handle_failure(&source, &timeout(), &symbol, d(1, 1), d(1, 5), &[])
            .await;

        assert_eq!(outcome.strategy, RecoveryStrategy::RetryWithBackoff);
        assert!(!outcome.recovered());
        assert_eq!(source.calls().len(), 3);
        assert_eq!(handler.failure_count("prices").await, 1);
        let err = source.last_error().unwrap();
        assert!(err.message.contains("Retries exhausted"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_treats_empty_result_as_failed_attempt() {
        let handler = FallbackHandler::default();
        let source = Scripted::new("prices", 0).then(Ok(FeatureTable::empty()));
        let symbol = Symbol::new("AAPL");

        let outcome = handler
            .handle_failure(&source, &timeout(), &symbol, d(1, 1), d(1, 5), &[])
            .await;

        assert!(outcome.recovered());
        assert_eq!(outcome.table.unwrap().height(), 5);
        assert_eq!(source.calls().len(), 2);
        assert_eq!(handler.statistics().await.cache.entries, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_of_only_empty_results_is_exhausted() {
        let handler = FallbackHandler::default();
        let source = Scripted::new("prices", 0)
            .then(Ok(FeatureTable::empty()))
            .then(Ok(FeatureTable::empty()))
            .then(Ok(FeatureTable::empty()));
        let symbol = Symbol::new("AAPL");

        let outcome = handler
            .handle_failure(&source, &timeout(), &symbol, d(1, 1), d(1, 5), &[])
            .await;

        assert!(!outcome.recovered());
        assert_eq!(source.calls().len(), 3);
        assert!(handler.cache().is_empty().await);
        assert!(source.last_error().unwrap().message.contains("Retries exhausted"));
    }

    #[tokio::test]
    async fn test_abandoned_fetch_is_served_from_cache_only() {
        let handler = FallbackHandler::default();
        let source = Scripted::new("prices", 0);
        let symbol = Symbol::new("AAPL");
        let range = DateRange::new(d(1, 1), d(1, 5)).unwrap();
        let error = IngestError::Timeout {
            operation: "fetch from prices".into(),
            seconds: 5,
        };

        let miss = handler.handle_abandoned(&source, &error, &symbol, range).await;
        assert_eq!(miss.strategy, RecoveryStrategy::UseCachedData);
        assert!(!miss.recovered());

        handler
            .record_success("prices", &symbol, range, &weekday_table(range))
            .await;
        let hit = handler.handle_abandoned(&source, &error, &symbol, range).await;
        assert_eq!(hit.table.unwrap().height(), 5);
        assert_eq!(handler.failure_count("prices").await, 1);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cached_data_served_for_database_errors() {
        let handler = FallbackHandler::default();
        let source = Scripted::new("prices", 0);
        let symbol = Symbol::new("AAPL");
        let range = DateRange::new(d(1, 1), d(1, 5)).unwrap();
        let db = IngestError::Database("connection pool exhausted".into());

        let miss = handler
            .handle_failure(&source, &db, &symbol, range.start, range.end, &[])
            .await;
        assert_eq!(miss.strategy, RecoveryStrategy::UseCachedData);
        assert!(!miss.recovered());

        handler
            .record_success("prices", &symbol, range, &weekday_table(range))
            .await;
        let hit = handler
            .handle_failure(&source, &db, &symbol, range.start, range.end, &[])
            .await;
        assert_eq!(hit.table.unwrap().height(), 5);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_stale_cache_is_never_served() {
        let handler = FallbackHandler::default();
        let source = Scripted::new("prices", 0);
        let symbol = Symbol::new("AAPL");
        let range = DateRange::new(d(1, 1), d(1, 5)).unwrap();
        let old = ingest_cache::CacheEntry::new("prices", &symbol, range, &weekday_table(range))
            .with_cached_at(Utc::now() - chrono::TimeDelta::hours(25));
        handler.cache().insert_entry(old).await;

        let outcome = handler
            .handle_failure(
                &source,
                &IngestError::Database("deadlock".into()),
                &symbol,
                range.start,
                range.end,
                &[],
            )
            .await;
        assert!(!outcome.recovered());
        assert!(handler.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_partial_recovery_accepts_exact_threshold() {
        // 2024-01-01 .. 2024-01-12 holds 10 weekdays; serve 7 of them.
        let range = DateRange::new(d(1, 1), d(1, 12)).unwrap();
        let source = Scripted::new("prices", 0).dropping(vec![d(1, 2), d(1, 3), d(1, 4)]);
        let handler = FallbackHandler::default();
        let error = IngestError::other("incomplete response");

        let outcome = handler
            .handle_failure(&source, &error, &Symbol::new("AAPL"), range.start, range.end, &[])
            .await;

        assert_eq!(outcome.strategy, RecoveryStrategy::PartialDataRecovery);
        assert_eq!(outcome.table.unwrap().height(), 7);
        assert_eq!(handler.statistics().await.cache.entries, 1);
    }

    #[tokio::test]
    async fn test_partial_recovery_rejects_below_threshold() {
        let range = DateRange::new(d(1, 1), d(1, 12)).unwrap();
        let source =
            Scripted::new("prices", 0).dropping(vec![d(1, 2), d(1, 3), d(1, 4), d(1, 5)]);
        let handler = FallbackHandler::default();
        let error = IngestError::other("truncated payload");

        let outcome = handler
            .handle_failure(&source, &error, &Symbol::new("AAPL"), range.start, range.end, &[])
            .await;

        assert_eq!(outcome.strategy, RecoveryStrategy::PartialDataRecovery);
        assert!(!outcome.recovered());
    }

    #[tokio::test]
    async fn test_partial_recovery_fetches_thirty_day_chunks() {
        let range = DateRange::new(d(1, 1), d(3, 15)).unwrap();
        let source = Scripted::new("prices", 0)
            .then(Ok(FeatureTable::empty()))
            .then(Err(IngestError::Network("reset".into())));
        let handler = FallbackHandler::default();
        let error = IngestError::IncompleteData {
            symbol: "AAPL".into(),
            detail: "gap".into(),
        };

        let outcome = handler
            .handle_failure(&source, &error, &Symbol::new("AAPL"), range.start, range.end, &[])
            .await;

        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0], DateRange::new(d(1, 1), d(1, 30)).unwrap());
        assert_eq!(calls[1], DateRange::new(d(1, 31), d(2, 29)).unwrap());
        assert_eq!(calls[2], DateRange::new(d(3, 1), d(3, 15)).unwrap());
        // Only the last chunk arrived: 11 of 55 weekdays.
        assert!(!outcome.recovered());
    }

    #[tokio::test]
    async fn test_alternative_in_priority_order() {
        let handler = FallbackHandler::default();
        let failed: Arc<dyn DataSource> = Arc::new(Scripted::new("prices", 0));
        let down = Scripted::new("down", 1);
        down.state().set_enabled(false);
        let broken = Scripted::new("broken", 2).then(Err(IngestError::Network("x".into())));
        let backup = Scripted::new("backup", 3);
        let alternatives: Vec<Arc<dyn DataSource>> = vec![
            Arc::new(backup),
            failed.clone(),
            Arc::new(broken),
            Arc::new(down),
        ];

        let outcome = handler
            .handle_failure(
                failed.as_ref(),
                &IngestError::other("unauthorized access"),
                &Symbol::new("AAPL"),
                d(1, 1),
                d(1, 5),
                &alternatives,
            )
            .await;

        assert_eq!(outcome.strategy, RecoveryStrategy::FallbackToAlternative);
        assert_eq!(outcome.table.unwrap().height(), 5);
        let stats = handler.statistics().await;
        assert_eq!(stats.cache.entries_per_source.get("backup"), Some(&1));
        assert_eq!(stats.failure_counts.get("prices"), Some(&1));
    }

    #[tokio::test]
    async fn test_skip_after_budget_and_cache_maintenance() {
        let config = FallbackConfig {
            max_retries: 0,
            ..FallbackConfig::default()
        };
        let handler = FallbackHandler::new(config);
        let source = Scripted::new("prices", 0);
        let symbol = Symbol::new("AAPL");

        let outcome = handler
            .handle_failure(&source, &IngestError::other("boom"), &symbol, d(1, 1), d(1, 5), &[])
            .await;
        assert_eq!(outcome.strategy, RecoveryStrategy::SkipSource);
        assert!(!outcome.recovered());
        assert_eq!(source.last_error().unwrap().message, "boom");
        assert!(source.calls().is_empty());

        let range = DateRange::new(d(1, 1), d(1, 5)).unwrap();
        handler.record_success("prices", &symbol, range, &weekday_table(range)).await;
        handler.record_success("indicators", &symbol, range, &weekday_table(range)).await;
        assert_eq!(handler.failure_count("prices").await, 0);
        assert_eq!(handler.clear_expired().await, 0);
        assert_eq!(handler.clear_cache(Some("prices")).await, 1);
        assert_eq!(handler.clear_cache(None).await, 1);
    }

    #[test]
    fn test_stitch_orders_chunks_and_keeps_first_row_per_date() {
        let later = close_table(vec![d(2, 1), d(2, 2)]);
        let earlier = FeatureTable::from_columns(
            vec![d(1, 31), d(2, 1)],
            vec![("close", vec![1.0, 2.0])],
        )
        .unwrap();

        let combined = stitch(&[later, earlier]).unwrap();

        assert_eq!(combined.dates(), [d(1, 31), d(2, 1), d(2, 2)]);
        assert_eq!(combined.get(d(2, 1), "close"), Some(100.0));
        assert_eq!(combined.get(d(1, 31), "close"), Some(1.0));
    }

    #[test]
    fn test_completeness_boundary() {
        assert!(meets_completeness(7, 10, 0.7));
        assert!(!meets_completeness(6, 10, 0.7));
        assert!(meets_completeness(1, 0, 0.7));
        assert!(!meets_completeness(0, 0, 0.7));
    }
}
