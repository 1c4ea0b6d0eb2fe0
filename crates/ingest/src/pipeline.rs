//! End-to-end collection: fetch, gate, certify.

use std::sync::Arc;

use chrono::NaiveDate;
use ingest_core::{DataSource, DateRange, FeatureTable, IngestError, PipelineConfig, Result, Symbol};
use ingest_fallback::FallbackHandler;
use ingest_quality::{QualityReport, QualityValidator};
use polars::prelude::DataFrame;
use tracing::{info, instrument, warn};

use crate::manager::SourceManager;

/// Output of [`FeaturePipeline::collect`].
#[derive(Debug, Clone)]
pub struct CollectedFeatures {
    /// Symbol the features belong to.
    pub symbol: Symbol,
    /// Requested range.
    pub range: DateRange,
    /// Merged, post-processed table.
    pub table: FeatureTable,
    /// Quality verdict, when a validator is configured.
    pub quality: Option<QualityReport>,
}

impl CollectedFeatures {
    /// Converts the table to a polars `DataFrame`.
    pub fn to_dataframe(&self) -> Result<DataFrame> {
        self.table.to_dataframe()
    }

    /// Returns false only when a quality report exists and failed.
    #[must_use]
    pub fn is_certified(&self) -> bool {
        self.quality.as_ref().is_none_or(|q| q.passed)
    }
}

/// A manager with a fallback handler and a quality validator, built from one
/// [`PipelineConfig`].
#[derive(Debug)]
pub struct FeaturePipeline {
    manager: SourceManager,
    validator: Option<QualityValidator>,
    parallel: bool,
}

impl Default for FeaturePipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl FeaturePipeline {
    /// Builds the pipeline. Parallel fetching is on.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        let PipelineConfig {
            manager,
            fallback,
            validation,
        } = config;
        Self {
            manager: SourceManager::new(manager).with_fallback(FallbackHandler::new(fallback)),
            validator: Some(QualityValidator::new(validation)),
            parallel: true,
        }
    }

    /// Chooses parallel or sequential fetching.
    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Skips the quality validator.
    #[must_use]
    pub fn without_quality_check(mut self) -> Self {
        self.validator = None;
        self
    }

    /// Registers a source, builder style.
    ///
    /// # Errors
    ///
    /// [`IngestError::DuplicateSource`] if the name is taken.
    pub fn with_source(mut self, source: Arc<dyn DataSource>) -> Result<Self> {
        self.manager.register(source)?;
        Ok(self)
    }

    /// The underlying manager.
    #[must_use]
    pub const fn manager(&self) -> &SourceManager {
        &self.manager
    }

    /// Mutable access to the manager, e.g. to register sources.
    pub fn manager_mut(&mut self) -> &mut SourceManager {
        &mut self.manager
    }

    /// Fetches, gates and optionally certifies features for `symbol`.
    ///
    /// A quality failure is reported in [`CollectedFeatures::quality`], not
    /// as an error; the caller decides whether to proceed.
    ///
    /// # Errors
    ///
    /// [`IngestError::InsufficientData`] if the merged table fails the
    /// combined-data gate, including when no source returned anything.
    #[instrument(skip(self), fields(symbol = %symbol))]
    pub async fn collect(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<CollectedFeatures> {
        let range = DateRange::new(start, end)?;
        let table = self
            .manager
            .fetch_all(symbol, start, end, self.parallel)
            .await?;

        let (ok, errors) = self.manager.check_combined(&table);
        if !ok {
            warn!(?errors, "Combined data rejected");
            return Err(IngestError::InsufficientData {
                symbol: symbol.to_string(),
                errors,
            });
        }

        let quality = self.validator.as_ref().map(|validator| {
            validator.validate_dataset(
                &table,
                symbol,
                Some(range),
                Some(self.manager.config().required_columns.as_slice()),
            )
        });

        info!(
            rows = table.height(),
            columns = table.width(),
            score = quality.as_ref().map(|q| q.score.overall),
            "Collected features"
        );
        Ok(CollectedFeatures {
            symbol: symbol.clone(),
            range,
            table,
            quality,
        })
    }
}
