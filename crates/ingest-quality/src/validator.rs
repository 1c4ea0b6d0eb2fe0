//! The quality check battery.

use chrono::Duration;
use ingest_core::{
    DEFAULT_REQUIRED_COLUMNS, DateRange, FeatureTable, IqrFence, Symbol, ValidationConfig,
    float_values,
};
use polars::prelude::*;
use tracing::{debug, info, instrument, warn};

use crate::result::{QualityReport, QualityScore, Severity, ValidationResult};

const OHLC: [&str; 4] = ["open", "high", "low", "close"];

/// Counters gathered while checking, consumed by scoring.
#[derive(Debug, Default)]
struct Tally {
    invalid_ohlc_rows: usize,
    long_gaps: usize,
}

/// Runs data quality checks over a feature table.
#[derive(Debug, Clone, Default)]
pub struct QualityValidator {
    config: ValidationConfig,
}

impl QualityValidator {
    /// Creates a validator.
    #[must_use]
    pub const fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Validates `table` and scores it.
    ///
    /// `required_columns` defaults to open/high/low/close/volume. The dataset
    /// fails on any CRITICAL finding, on more than `max_error_count` ERROR
    /// findings, or in strict mode on any ERROR.
    #[instrument(skip(self, table, expected_range, required_columns), fields(symbol = %symbol, rows = table.height()))]
    pub fn validate_dataset(
        &self,
        table: &FeatureTable,
        symbol: &Symbol,
        expected_range: Option<DateRange>,
        required_columns: Option<&[String]>,
    ) -> QualityReport {
        let required: Vec<String> = required_columns.map_or_else(
            || DEFAULT_REQUIRED_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            <[String]>::to_vec,
        );
        let mut results = Vec::new();

        if table.height() == 0 || table.width() == 0 {
            results.push(
                ValidationResult::fail("non_empty", Severity::Critical, "Dataset is empty")
                    .with_suggestion("Check that at least one source returned data"),
            );
            warn!("Dataset is empty");
            return QualityReport {
                symbol: symbol.clone(),
                passed: false,
                results,
                score: QualityScore::zero(),
            };
        }

        let mut tally = Tally::default();
        self.check_structure(table, &required, expected_range, &mut results);
        self.check_completeness(table, &mut results);
        self.check_consistency(table, &required, &mut results);
        self.check_price_accuracy(table, &mut results, &mut tally);
        self.check_continuity(table, &mut results, &mut tally);
        self.check_outliers(table, &mut results);
        self.check_feature_ranges(table, &mut results);

        let score = score(table, &results, &tally);
        let passed = self.verdict(&results);

        let errors = count(&results, Severity::Error);
        if passed {
            info!(score = score.overall, errors, "Dataset passed validation");
        } else {
            warn!(score = score.overall, errors, "Dataset failed validation");
        }

        QualityReport {
            symbol: symbol.clone(),
            passed,
            results,
            score,
        }
    }

    fn verdict(&self, results: &[ValidationResult]) -> bool {
        let errors = count(results, Severity::Error);
        let critical = count(results, Severity::Critical);
        !(critical > 0
            || errors > self.config.max_error_count
            || (self.config.strict_validation && errors > 0))
    }

    fn check_structure(
        &self,
        table: &FeatureTable,
        required: &[String],
        expected_range: Option<DateRange>,
        results: &mut Vec<ValidationResult>,
    ) {
        let missing: Vec<&str> = required
            .iter()
            .filter(|c| !table.has_column(c))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            results.push(ValidationResult::pass(
                "required_columns",
                "All required columns present",
            ));
        } else {
            results.push(
                ValidationResult::fail(
                    "required_columns",
                    Severity::Critical,
                    format!("Missing required columns: {}", missing.join(", ")),
                )
                .with_suggestion("Register a source that produces these columns"),
            );
        }

        if let (Some(expected), Some(actual)) = (expected_range, table.date_range()) {
            let tolerance = Duration::days(self.config.max_gap_days);
            let late_start = actual.start > expected.start + tolerance;
            let early_end = actual.end < expected.end - tolerance;
            if late_start || early_end {
                results.push(ValidationResult::fail(
                    "date_coverage",
                    Severity::Warning,
                    format!("Data covers {actual}, expected {expected}"),
                ));
            }
        }
    }

    fn check_completeness(&self, table: &FeatureTable, results: &mut Vec<ValidationResult>) {
        let ratio = table.missing_ratio();
        let threshold = self.config.missing_threshold();
        if ratio > threshold {
            let rows = flagged_rows(table, |c| Some(c.is_null()));
            results.push(
                ValidationResult::fail(
                    "missing_values",
                    Severity::Error,
                    format!(
                        "{:.1}% of cells are missing (threshold {:.1}%)",
                        ratio * 100.0,
                        threshold * 100.0
                    ),
                )
                .with_affected_rows(rows)
                .with_suggestion("Fill or drop incomplete rows"),
            );
        } else {
            results.push(ValidationResult::pass(
                "missing_values",
                format!("{:.1}% of cells are missing", ratio * 100.0),
            ));
        }

        let height = table.height() as f64;
        for column in table.columns() {
            let missing = column.null_count();
            let share = missing as f64 / height;
            if share > self.config.column_missing_threshold {
                results.push(
                    ValidationResult::fail(
                        "column_missing",
                        Severity::Warning,
                        format!("Column {} is {:.1}% missing", column.name(), share * 100.0),
                    )
                    .with_affected_rows(missing),
                );
            }
        }
    }

    fn check_consistency(
        &self,
        table: &FeatureTable,
        required: &[String],
        results: &mut Vec<ValidationResult>,
    ) {
        let duplicates = table.duplicate_dates();
        if duplicates > 0 {
            results.push(
                ValidationResult::fail(
                    "duplicate_dates",
                    Severity::Error,
                    format!("{duplicates} rows repeat an earlier date"),
                )
                .with_affected_rows(duplicates)
                .with_suggestion("De-duplicate the date index"),
            );
        } else {
            results.push(ValidationResult::pass("duplicate_dates", "Dates are unique"));
        }

        for name in required {
            if table
                .column(name)
                .is_some_and(|c| c.dtype() == &DataType::String)
            {
                results.push(ValidationResult::fail(
                    "numeric_dtype",
                    Severity::Error,
                    format!("Column {name} holds text, expected numbers"),
                ));
            }
        }

        let infinite_rows = flagged_rows(table, |c| float_values(c).map(|v| v.is_infinite()));
        if infinite_rows > 0 {
            results.push(
                ValidationResult::fail(
                    "infinite_values",
                    Severity::Error,
                    format!("{} infinite cells", table.infinite_cells()),
                )
                .with_affected_rows(infinite_rows),
            );
        }
    }

    fn check_price_accuracy(
        &self,
        table: &FeatureTable,
        results: &mut Vec<ValidationResult>,
        tally: &mut Tally,
    ) {
        let Some([open, high, low, close]) = ohlc_columns(table) else {
            debug!("OHLC columns absent, skipping price checks");
            return;
        };

        let mut invalid = 0;
        let mut non_positive = 0;
        for i in 0..table.height() {
            let (Some(o), Some(h), Some(l), Some(c)) = (open[i], high[i], low[i], close[i]) else {
                continue;
            };
            if [o, h, l, c].iter().any(|x| !x.is_finite()) {
                continue;
            }
            if h < l.max(o).max(c) || l > o.min(c) {
                invalid += 1;
            }
            if [o, h, l, c].iter().any(|x| *x <= 0.0) {
                non_positive += 1;
            }
        }
        tally.invalid_ohlc_rows = invalid;

        if invalid > 0 {
            results.push(
                ValidationResult::fail(
                    "ohlc_consistency",
                    Severity::Error,
                    format!("{invalid} rows violate high >= max(open, close, low) or low <= min(open, close)"),
                )
                .with_affected_rows(invalid),
            );
        } else {
            results.push(ValidationResult::pass(
                "ohlc_consistency",
                "All rows satisfy OHLC relationships",
            ));
        }

        if non_positive > 0 {
            results.push(
                ValidationResult::fail(
                    "positive_prices",
                    Severity::Error,
                    format!("{non_positive} rows have a zero or negative price"),
                )
                .with_affected_rows(non_positive),
            );
        }

        let returns: Vec<f64> = close
            .windows(2)
            .filter_map(|w| match (w[0], w[1]) {
                (Some(prev), Some(next)) if prev.is_finite() && next.is_finite() && prev > 0.0 => {
                    Some(next / prev - 1.0)
                }
                _ => None,
            })
            .collect();
        let extreme = returns
            .iter()
            .filter(|r| r.abs() > self.config.extreme_return_threshold)
            .count();
        if extreme > 0 {
            let share = extreme as f64 / returns.len() as f64;
            let severity = if share <= self.config.extreme_return_tolerance {
                Severity::Warning
            } else {
                Severity::Error
            };
            results.push(
                ValidationResult::fail(
                    "extreme_returns",
                    severity,
                    format!(
                        "{extreme} daily moves exceed {:.0}%",
                        self.config.extreme_return_threshold * 100.0
                    ),
                )
                .with_affected_rows(extreme)
                .with_suggestion("Check for unadjusted splits"),
            );
        }
    }

    fn check_continuity(
        &self,
        table: &FeatureTable,
        results: &mut Vec<ValidationResult>,
        tally: &mut Tally,
    ) {
        if !table.is_sorted() {
            results.push(
                ValidationResult::fail("date_order", Severity::Error, "Dates are not ascending")
                    .with_suggestion("Sort by date"),
            );
        }

        let long_gaps: Vec<i64> = table
            .date_gaps()
            .into_iter()
            .filter(|g| *g > self.config.max_gap_days)
            .collect();
        tally.long_gaps = long_gaps.len();
        if long_gaps.is_empty() {
            results.push(ValidationResult::pass("date_gaps", "No long gaps"));
        } else {
            let longest = long_gaps.iter().copied().max().unwrap_or_default();
            results.push(
                ValidationResult::fail(
                    "date_gaps",
                    Severity::Warning,
                    format!(
                        "{} gaps longer than {} days (longest {longest})",
                        long_gaps.len(),
                        self.config.max_gap_days
                    ),
                )
                .with_affected_rows(long_gaps.len()),
            );
        }
    }

    fn check_outliers(&self, table: &FeatureTable, results: &mut Vec<ValidationResult>) {
        let height = table.height();
        for column in table.columns() {
            let Some(fence) = IqrFence::from_column(column, self.config.outlier_iqr_multiplier)
            else {
                continue;
            };
            let outliers = fence.count_outliers(column);
            if outliers == 0 {
                continue;
            }
            let share = outliers as f64 / height as f64;
            let severity = if share > self.config.outlier_warning_ratio {
                Severity::Warning
            } else {
                Severity::Info
            };
            results.push(
                ValidationResult::fail(
                    "outliers",
                    severity,
                    format!(
                        "{outliers} values in {} fall outside [{:.4}, {:.4}]",
                        column.name(),
                        fence.lower,
                        fence.upper
                    ),
                )
                .with_affected_rows(outliers),
            );
        }
    }

    fn check_feature_ranges(&self, table: &FeatureTable, results: &mut Vec<ValidationResult>) {
        for column in table.columns() {
            let name = column.name().to_lowercase();
            let (lo, hi) = if name.contains("rsi") {
                (0.0, 100.0)
            } else if name.contains("volume") {
                (0.0, f64::INFINITY)
            } else if name.contains("pct") || name.contains("percent") {
                (-100.0, 100.0)
            } else {
                continue;
            };
            let out_of_range = float_values(column).map_or(0, |values| {
                values
                    .into_iter()
                    .flatten()
                    .filter(|v| v.is_finite() && (*v < lo || *v > hi))
                    .count()
            });
            if out_of_range > 0 {
                results.push(
                    ValidationResult::fail(
                        "feature_range",
                        Severity::Error,
                        format!(
                            "{out_of_range} values in {} outside [{lo}, {hi}]",
                            column.name()
                        ),
                    )
                    .with_affected_rows(out_of_range),
                );
            }
        }
    }
}

fn ohlc_columns(table: &FeatureTable) -> Option<[Vec<Option<f64>>; 4]> {
    let [o, h, l, c] = OHLC.map(|name| {
        table
            .column(name)
            .and_then(float_values)
            .map(|values| values.into_iter().collect::<Vec<_>>())
    });
    Some([o?, h?, l?, c?])
}

/// Number of rows where `flag` marks at least one feature cell.
fn flagged_rows(table: &FeatureTable, flag: impl Fn(&Column) -> Option<BooleanChunked>) -> usize {
    table
        .columns()
        .filter_map(flag)
        .reduce(|acc, mask| &acc | &mask)
        .map_or(0, |mask| {
            mask.into_iter()
                .filter(|hit| *hit == Some(true))
                .count()
        })
}

fn count(results: &[ValidationResult], severity: Severity) -> usize {
    results
        .iter()
        .filter(|r| !r.passed && r.severity == severity)
        .count()
}

fn score(table: &FeatureTable, results: &[ValidationResult], tally: &Tally) -> QualityScore {
    let rows = table.height() as f64;
    let total = table.total_cells() as f64;

    let completeness = 1.0 - table.missing_cells() as f64 / total;
    let consistency =
        1.0 - table.duplicate_dates() as f64 / rows - table.infinite_cells() as f64 / total;
    let accuracy = 1.0 - tally.invalid_ohlc_rows as f64 / rows;
    let gaps = table.height().saturating_sub(1);
    let timeliness = if gaps == 0 {
        1.0
    } else {
        1.0 - tally.long_gaps as f64 / gaps as f64
    };
    let error_rows: usize = results
        .iter()
        .filter(|r| !r.passed && r.severity >= Severity::Error)
        .map(|r| r.affected_rows)
        .sum();
    let validity = 1.0 - (error_rows as f64 / rows).min(1.0);

    QualityScore::new(completeness, consistency, accuracy, timeliness, validity)
}
