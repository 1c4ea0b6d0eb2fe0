//! Configuration for the ingestion pipeline.
//!
//! All structs deserialize with per-field defaults, so a TOML file only needs
//! to name the options it changes:
//!
//! ```toml
//! [manager]
//! max_workers = 4
//!
//! [fallback]
//! max_retries = 5
//! enable_partial_recovery = false
//!
//! [validation]
//! strict_validation = true
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Price columns the combined-data gate expects by default.
pub const DEFAULT_REQUIRED_COLUMNS: [&str; 5] = ["open", "high", "low", "close", "volume"];

/// Settings for the source manager.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Size of the fetch worker pool.
    pub max_workers: usize,
    /// Overall deadline for a parallel fetch, in seconds.
    pub timeout_seconds: u64,
    /// Row-count floor of the combined-data gate.
    pub min_records: usize,
    /// Missing-cell ceiling of the combined-data gate.
    pub max_missing_ratio: f64,
    /// Gaps longer than this many days count as breaks in the series.
    pub max_gap_days: i64,
    /// Largest tolerated share of gaps longer than `max_gap_days`.
    pub max_gap_ratio: f64,
    /// Columns the combined-data gate requires.
    pub required_columns: Vec<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            timeout_seconds: 60,
            min_records: 100,
            max_missing_ratio: 0.1,
            max_gap_days: 7,
            max_gap_ratio: 0.1,
            required_columns: DEFAULT_REQUIRED_COLUMNS
                .iter()
                .map(|c| (*c).to_string())
                .collect(),
        }
    }
}

impl ManagerConfig {
    /// Overall fetch deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            return Err(IngestError::Config("max_workers must be at least 1".into()));
        }
        if self.timeout_seconds == 0 {
            return Err(IngestError::Config(
                "timeout_seconds must be at least 1".into(),
            ));
        }
        check_ratio("max_missing_ratio", self.max_missing_ratio)?;
        check_ratio("max_gap_ratio", self.max_gap_ratio)?;
        Ok(())
    }
}

/// Settings for failure recovery.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackConfig {
    /// Retry budget per source.
    pub max_retries: u32,
    /// Delay before the first retry, in seconds.
    pub initial_retry_delay: f64,
    /// Upper bound on any retry delay, in seconds.
    pub max_retry_delay: f64,
    /// Growth factor between consecutive retry delays.
    pub backoff_multiplier: f64,
    /// Maximum age of a usable cache entry, in hours.
    pub cache_ttl_hours: u64,
    /// Whether chunked partial recovery may be attempted.
    pub enable_partial_recovery: bool,
    /// Minimum `rows / expected_days` for a partial recovery to be accepted.
    pub min_data_completeness: f64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay: 1.0,
            max_retry_delay: 60.0,
            backoff_multiplier: 2.0,
            cache_ttl_hours: 24,
            enable_partial_recovery: true,
            min_data_completeness: 0.7,
        }
    }
}

impl FallbackConfig {
    /// Cache time-to-live; saturates for absurdly large hour counts.
    #[must_use]
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_hours.saturating_mul(3600))
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_retry_delay >= 0.0 && self.initial_retry_delay.is_finite()) {
            return Err(IngestError::Config(
                "initial_retry_delay must be a non-negative number".into(),
            ));
        }
        if !(self.max_retry_delay >= self.initial_retry_delay && self.max_retry_delay.is_finite()) {
            return Err(IngestError::Config(
                "max_retry_delay must be at least initial_retry_delay".into(),
            ));
        }
        if !(self.backoff_multiplier >= 1.0 && self.backoff_multiplier.is_finite()) {
            return Err(IngestError::Config(
                "backoff_multiplier must be at least 1.0".into(),
            ));
        }
        check_ratio("min_data_completeness", self.min_data_completeness)
    }
}

/// Settings for the quality validator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Strict mode: tighter missing-value threshold and any ERROR fails.
    pub strict_validation: bool,
    /// Missing-cell threshold in strict mode.
    pub strict_missing_threshold: f64,
    /// Missing-cell threshold in lenient mode.
    pub lenient_missing_threshold: f64,
    /// Per-column missing share above which a column is flagged.
    pub column_missing_threshold: f64,
    /// Gaps longer than this many days are reported.
    pub max_gap_days: i64,
    /// Absolute single-day return above which a move is flagged.
    pub extreme_return_threshold: f64,
    /// Share of returns that may be extreme before it becomes an error.
    pub extreme_return_tolerance: f64,
    /// IQR multiplier for outlier fencing.
    pub outlier_iqr_multiplier: f64,
    /// Share of outliers above which a column is a warning.
    pub outlier_warning_ratio: f64,
    /// More ERROR results than this fail the dataset.
    pub max_error_count: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            strict_validation: false,
            strict_missing_threshold: 0.05,
            lenient_missing_threshold: 0.1,
            column_missing_threshold: 0.3,
            max_gap_days: 7,
            extreme_return_threshold: 0.5,
            extreme_return_tolerance: 0.01,
            outlier_iqr_multiplier: 1.5,
            outlier_warning_ratio: 0.1,
            max_error_count: 5,
        }
    }
}

impl ValidationConfig {
    /// Strict-mode defaults.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_validation: true,
            ..Self::default()
        }
    }

    /// Missing-cell threshold for the active mode.
    #[must_use]
    pub const fn missing_threshold(&self) -> f64 {
        if self.strict_validation {
            self.strict_missing_threshold
        } else {
            self.lenient_missing_threshold
        }
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        check_ratio("strict_missing_threshold", self.strict_missing_threshold)?;
        check_ratio("lenient_missing_threshold", self.lenient_missing_threshold)?;
        check_ratio("column_missing_threshold", self.column_missing_threshold)?;
        check_ratio("extreme_return_tolerance", self.extreme_return_tolerance)?;
        check_ratio("outlier_warning_ratio", self.outlier_warning_ratio)
    }
}

/// Complete pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source manager settings.
    pub manager: ManagerConfig,
    /// Failure recovery settings.
    pub fallback: FallbackConfig,
    /// Quality validation settings.
    pub validation: ValidationConfig,
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| IngestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| IngestError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// Checks every section.
    pub fn validate(&self) -> Result<()> {
        self.manager.validate()?;
        self.fallback.validate()?;
        self.validation.validate()
    }
}

fn check_ratio(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(IngestError::Config(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.manager.max_workers, 3);
        assert_eq!(config.fallback.max_retries, 3);
        assert!((config.fallback.min_data_completeness - 0.7).abs() < f64::EPSILON);
        assert!(!config.validation.strict_validation);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [manager]
            max_workers = 8

            [fallback]
            max_retries = 5

            [validation]
            strict_validation = true
            "#,
        )
        .unwrap();
        assert_eq!(config.manager.max_workers, 8);
        assert_eq!(config.manager.min_records, 100);
        assert_eq!(config.fallback.max_retries, 5);
        assert_eq!(config.fallback.cache_ttl_hours, 24);
        assert!((config.validation.missing_threshold() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn out_of_range_completeness_is_rejected() {
        let err = PipelineConfig::from_toml_str("[fallback]\nmin_data_completeness = 1.5\n");
        assert!(matches!(err, Err(IngestError::Config(_))));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = ManagerConfig {
            max_workers: 0,
            ..ManagerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn huge_cache_ttl_saturates() {
        let config = PipelineConfig::from_toml_str(&format!(
            "[fallback]\ncache_ttl_hours = {}\n",
            i64::MAX
        ))
        .unwrap();
        assert_eq!(config.fallback.cache_ttl(), Duration::from_secs(u64::MAX));
        assert_eq!(
            FallbackConfig::default().cache_ttl(),
            Duration::from_secs(24 * 3600)
        );
    }
}
