//! Source registry and orchestration.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::NaiveDate;
use ingest_core::{
    DataSource, DateRange, FeatureTable, IngestError, ManagerConfig, Result, SourceError, Symbol,
};
use ingest_fallback::FallbackHandler;
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, instrument, warn};

use crate::merge::{merge_by_priority, post_process};

/// Error returned by the combined-data gate for an empty table.
pub const NO_DATA: &str = "No data available";

/// What the collection phase got from one source.
enum Collected {
    /// The fetch ran to completion.
    Finished(Result<FeatureTable>),
    /// The fetch was still running at the deadline and was aborted.
    Abandoned,
}

/// Point-in-time status of a registered source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    /// Source name.
    pub name: String,
    /// Merge priority.
    pub priority: i32,
    /// Whether the source is enabled.
    pub available: bool,
    /// Last recorded error.
    pub last_error: Option<SourceError>,
}

/// Registers data sources, fetches from all of them and merges the results.
///
/// Sources are consulted in ascending priority; registration order breaks
/// ties. A failing source never aborts a fetch. When a [`FallbackHandler`]
/// is attached, each failure is handed to it after the collection phase and
/// any recovered table takes the failed source's place in the merge.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use ingest::{SourceManager, TimeFeatureSource, Symbol};
///
/// let mut manager = SourceManager::default();
/// manager.register(Arc::new(TimeFeatureSource::new()))?;
/// let table = manager.fetch_all(&Symbol::new("AAPL"), start, end, true).await?;
/// let (ok, errors) = manager.validate_combined(&table, 100, 0.1);
/// ```
pub struct SourceManager {
    sources: Vec<Arc<dyn DataSource>>,
    config: ManagerConfig,
    fallback: Option<FallbackHandler>,
}

impl std::fmt::Debug for SourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceManager")
            .field("sources", &self.source_names())
            .field("config", &self.config)
            .field("fallback", &self.fallback.as_ref().map(|_| "configured"))
            .finish()
    }
}

impl Default for SourceManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

impl SourceManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self {
            sources: Vec::new(),
            config,
            fallback: None,
        }
    }

    /// Attaches a fallback handler.
    #[must_use]
    pub fn with_fallback(mut self, handler: FallbackHandler) -> Self {
        self.fallback = Some(handler);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// The attached fallback handler, if any.
    #[must_use]
    pub const fn fallback(&self) -> Option<&FallbackHandler> {
        self.fallback.as_ref()
    }

    /// Registers a source.
    ///
    /// # Errors
    ///
    /// [`IngestError::DuplicateSource`] if a source with the same name exists.
    pub fn register(&mut self, source: Arc<dyn DataSource>) -> Result<()> {
        if self.sources.iter().any(|s| s.name() == source.name()) {
            return Err(IngestError::DuplicateSource(source.name().to_string()));
        }
        debug!(
            source = source.name(),
            priority = source.priority(),
            "Registering source"
        );
        self.sources.push(source);
        Ok(())
    }

    /// Removes a source by name.
    pub fn unregister(&mut self, name: &str) -> Option<Arc<dyn DataSource>> {
        let idx = self.sources.iter().position(|s| s.name() == name)?;
        debug!(source = name, "Unregistering source");
        Some(self.sources.remove(idx))
    }

    /// Registered names, in registration order.
    #[must_use]
    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    /// Looks up a source by name.
    #[must_use]
    pub fn source(&self, name: &str) -> Option<&Arc<dyn DataSource>> {
        self.sources.iter().find(|s| s.name() == name)
    }

    /// Status of every source, in registration order.
    #[must_use]
    pub fn source_status(&self) -> Vec<SourceStatus> {
        self.sources
            .iter()
            .map(|s| SourceStatus {
                name: s.name().to_string(),
                priority: s.priority(),
                available: s.is_available(),
                last_error: s.last_error(),
            })
            .collect()
    }

    /// Clears the recorded error of every source.
    pub fn reset_errors(&self) {
        for source in &self.sources {
            source.reset_error();
        }
    }

    /// Available sources sorted by priority; the sort is stable so
    /// registration order breaks ties.
    fn available_sources(&self) -> Vec<Arc<dyn DataSource>> {
        let mut sources: Vec<Arc<dyn DataSource>> = self
            .sources
            .iter()
            .filter(|s| s.is_available())
            .cloned()
            .collect();
        sources.sort_by_key(|s| s.priority());
        sources
    }

    /// Fetches from every available source, merges and post-processes.
    ///
    /// Returns an empty table when no source produced data; callers must
    /// treat that as fatal.
    ///
    /// In parallel mode the configured timeout bounds the whole call. Sources
    /// still running at the deadline are abandoned and may only be served
    /// from cache; recovery of other failures stops at the same deadline.
    ///
    /// # Errors
    ///
    /// [`IngestError::InvalidParameter`] if `start > end`. Source failures
    /// are logged and recorded on the source, never returned.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn fetch_all(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
        parallel: bool,
    ) -> Result<FeatureTable> {
        let range = DateRange::new(start, end)?;
        let sources = self.available_sources();
        if sources.is_empty() {
            warn!("No available sources");
            return Ok(FeatureTable::empty());
        }

        let deadline = parallel.then(|| Instant::now() + self.config.timeout());
        let outcomes = match deadline {
            Some(deadline) => self.collect_parallel(&sources, symbol, range, deadline).await,
            None => self.collect_sequential(&sources, symbol, range).await,
        };

        let mut tables = Vec::with_capacity(sources.len());
        for (source, outcome) in sources.iter().zip(outcomes) {
            match outcome {
                Collected::Finished(Ok(table)) if !table.is_empty() => {
                    source.reset_error();
                    if let Some(handler) = &self.fallback {
                        handler
                            .record_success(source.name(), symbol, range, &table)
                            .await;
                    }
                    tables.push((source.name().to_string(), table));
                }
                Collected::Finished(result) => {
                    let error = result.err().unwrap_or_else(|| IngestError::DataNotAvailable {
                        symbol: symbol.to_string(),
                        start: start.to_string(),
                        end: end.to_string(),
                    });
                    warn!(source = source.name(), error = %error, "Source fetch failed");
                    source.set_error(&error.to_string());
                    if let Some(table) = self
                        .recover(source.as_ref(), &error, symbol, range, deadline)
                        .await
                    {
                        tables.push((source.name().to_string(), table));
                    }
                }
                Collected::Abandoned => {
                    let error = IngestError::Timeout {
                        operation: format!("fetch from {}", source.name()),
                        seconds: self.config.timeout_seconds,
                    };
                    warn!(source = source.name(), error = %error, "Source fetch abandoned");
                    source.set_error(&error.to_string());
                    if let Some(table) = self
                        .recover_abandoned(source.as_ref(), &error, symbol, range)
                        .await
                    {
                        tables.push((source.name().to_string(), table));
                    }
                }
            }
        }

        if tables.is_empty() {
            warn!("No source returned data");
            return Ok(FeatureTable::empty());
        }

        let mut merged = merge_by_priority(&tables)?;
        post_process(&mut merged)?;
        info!(
            sources = tables.len(),
            rows = merged.height(),
            columns = merged.width(),
            "Merged feature table"
        );
        Ok(merged)
    }

    async fn recover(
        &self,
        source: &dyn DataSource,
        error: &IngestError,
        symbol: &Symbol,
        range: DateRange,
        deadline: Option<Instant>,
    ) -> Option<FeatureTable> {
        let handler = self.fallback.as_ref()?;
        let recovery =
            handler.handle_failure(source, error, symbol, range.start, range.end, &self.sources);
        let outcome = match deadline {
            Some(deadline) => match timeout_at(deadline, recovery).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(source = source.name(), "Recovery cut off at the fetch deadline");
                    return None;
                }
            },
            None => recovery.await,
        };
        outcome.table.filter(|t| !t.is_empty())
    }

    async fn recover_abandoned(
        &self,
        source: &dyn DataSource,
        error: &IngestError,
        symbol: &Symbol,
        range: DateRange,
    ) -> Option<FeatureTable> {
        let handler = self.fallback.as_ref()?;
        let outcome = handler.handle_abandoned(source, error, symbol, range).await;
        outcome.table.filter(|t| !t.is_empty())
    }

    async fn collect_sequential(
        &self,
        sources: &[Arc<dyn DataSource>],
        symbol: &Symbol,
        range: DateRange,
    ) -> Vec<Collected> {
        let mut outcomes = Vec::with_capacity(sources.len());
        for source in sources {
            debug!(source = source.name(), "Fetching");
            let result = source.fetch(symbol, range.start, range.end).await;
            outcomes.push(Collected::Finished(result));
        }
        outcomes
    }

    /// Runs one task per source, at most `max_workers` at a time, until every
    /// task finishes or `deadline` passes. Unfinished tasks are aborted and
    /// reported as abandoned.
    async fn collect_parallel(
        &self,
        sources: &[Arc<dyn DataSource>],
        symbol: &Symbol,
        range: DateRange,
        deadline: Instant,
    ) -> Vec<Collected> {
        let permits = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut task_index = HashMap::with_capacity(sources.len());

        for (idx, source) in sources.iter().enumerate() {
            let source = Arc::clone(source);
            let symbol = symbol.clone();
            let permits = Arc::clone(&permits);
            let handle = tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                debug!(source = source.name(), "Fetching");
                (idx, source.fetch(&symbol, range.start, range.end).await)
            });
            task_index.insert(handle.id(), idx);
        }

        let mut outcomes: Vec<Option<Result<FeatureTable>>> =
            (0..sources.len()).map(|_| None).collect();

        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((idx, result)))) => outcomes[idx] = Some(result),
                Ok(Some(Err(e))) => {
                    if let Some(&idx) = task_index.get(&e.id()) {
                        outcomes[idx] = Some(Err(IngestError::other(format!(
                            "Fetch task for {} failed: {e}",
                            sources[idx].name()
                        ))));
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        pending = tasks.len(),
                        timeout_seconds = self.config.timeout_seconds,
                        "Collection timed out, abandoning pending sources"
                    );
                    tasks.abort_all();
                    break;
                }
            }
        }

        outcomes
            .into_iter()
            .map(|outcome| outcome.map_or(Collected::Abandoned, Collected::Finished))
            .collect()
    }

    /// The combined-data gate.
    ///
    /// Checks that `table` is non-empty, has at least `min_records` rows, at
    /// most `max_missing_ratio` missing cells, the configured required
    /// columns, and that fewer than `max_gap_ratio` of its inter-row gaps
    /// exceed `max_gap_days`. Returns one message per failed check; an empty
    /// table yields exactly [`NO_DATA`].
    #[must_use]
    pub fn validate_combined(
        &self,
        table: &FeatureTable,
        min_records: usize,
        max_missing_ratio: f64,
    ) -> (bool, Vec<String>) {
        if table.is_empty() {
            return (false, vec![NO_DATA.to_string()]);
        }

        let mut errors = Vec::new();

        if table.height() < min_records {
            errors.push(format!(
                "Insufficient records: {} < {min_records}",
                table.height()
            ));
        }

        let missing = table.missing_ratio();
        if missing > max_missing_ratio {
            errors.push(format!(
                "Missing ratio {:.2}% exceeds {:.2}%",
                missing * 100.0,
                max_missing_ratio * 100.0
            ));
        }

        let absent: Vec<&str> = self
            .config
            .required_columns
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        if !absent.is_empty() {
            errors.push(format!("Missing required columns: {}", absent.join(", ")));
        }

        let gaps = table.date_gaps();
        if !gaps.is_empty() {
            let long = gaps
                .iter()
                .filter(|g| **g > self.config.max_gap_days)
                .count();
            let ratio = long as f64 / gaps.len() as f64;
            if ratio >= self.config.max_gap_ratio {
                errors.push(format!(
                    "Too many date gaps: {long} of {} exceed {} days",
                    gaps.len(),
                    self.config.max_gap_days
                ));
            }
        }

        if !errors.is_empty() {
            debug!(?errors, "Combined data failed the gate");
        }
        (errors.is_empty(), errors)
    }

    /// [`validate_combined`](Self::validate_combined) with the configured
    /// `min_records` and `max_missing_ratio`.
    #[must_use]
    pub fn check_combined(&self, table: &FeatureTable) -> (bool, Vec<String>) {
        self.validate_combined(table, self.config.min_records, self.config.max_missing_ratio)
    }
}
