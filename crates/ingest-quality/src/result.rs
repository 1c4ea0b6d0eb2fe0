//! Validation findings and the composite quality score.

use std::fmt;

use ingest_core::Symbol;
use serde::{Deserialize, Serialize};

/// How serious a finding is. Ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational; never affects the verdict.
    Info,
    /// Suspicious but usable.
    Warning,
    /// Wrong data; enough of these fail the dataset.
    Error,
    /// Unusable data; always fails the dataset.
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

/// Outcome of one check.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Check identifier, e.g. `ohlc_consistency`.
    pub check_name: String,
    /// Severity of the finding.
    pub severity: Severity,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable description.
    pub message: String,
    /// Number of rows involved.
    pub affected_rows: usize,
    /// Suggested remedy.
    pub suggestion: Option<String>,
}

impl ValidationResult {
    /// A passing check.
    #[must_use]
    pub fn pass(check_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            check_name: check_name.into(),
            severity: Severity::Info,
            passed: true,
            message: message.into(),
            affected_rows: 0,
            suggestion: None,
        }
    }

    /// A failing check.
    #[must_use]
    pub fn fail(
        check_name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            check_name: check_name.into(),
            severity,
            passed: false,
            message: message.into(),
            affected_rows: 0,
            suggestion: None,
        }
    }

    /// Sets the affected row count.
    #[must_use]
    pub const fn with_affected_rows(mut self, rows: usize) -> Self {
        self.affected_rows = rows;
        self
    }

    /// Sets the suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASS" } else { "FAIL" };
        write!(
            f,
            "[{status}/{}] {}: {}",
            self.severity, self.check_name, self.message
        )?;
        if self.affected_rows > 0 {
            write!(f, " ({} rows)", self.affected_rows)?;
        }
        if let Some(suggestion) = &self.suggestion {
            write!(f, " -> {suggestion}")?;
        }
        Ok(())
    }
}

/// Weighted quality sub-scores, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    /// `1 - missing / total` cells.
    pub completeness: f64,
    /// `1 - duplicate ratio - infinite ratio`.
    pub consistency: f64,
    /// `1 - invalid OHLC rows / rows`.
    pub accuracy: f64,
    /// `1 - long gaps / gaps`.
    pub timeliness: f64,
    /// `1 - min(1, error rows / rows)`.
    pub validity: f64,
    /// Weighted sum of the sub-scores.
    pub overall: f64,
}

impl QualityScore {
    /// Completeness weight.
    pub const COMPLETENESS_WEIGHT: f64 = 0.25;
    /// Consistency weight.
    pub const CONSISTENCY_WEIGHT: f64 = 0.20;
    /// Accuracy weight.
    pub const ACCURACY_WEIGHT: f64 = 0.25;
    /// Timeliness weight.
    pub const TIMELINESS_WEIGHT: f64 = 0.15;
    /// Validity weight.
    pub const VALIDITY_WEIGHT: f64 = 0.15;

    /// Clamps each sub-score to `[0, 1]` and computes the overall score.
    #[must_use]
    pub fn new(
        completeness: f64,
        consistency: f64,
        accuracy: f64,
        timeliness: f64,
        validity: f64,
    ) -> Self {
        let clamp = |x: f64| if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) };
        let (completeness, consistency, accuracy, timeliness, validity) = (
            clamp(completeness),
            clamp(consistency),
            clamp(accuracy),
            clamp(timeliness),
            clamp(validity),
        );
        let overall = completeness * Self::COMPLETENESS_WEIGHT
            + consistency * Self::CONSISTENCY_WEIGHT
            + accuracy * Self::ACCURACY_WEIGHT
            + timeliness * Self::TIMELINESS_WEIGHT
            + validity * Self::VALIDITY_WEIGHT;
        Self {
            completeness,
            consistency,
            accuracy,
            timeliness,
            validity,
            overall,
        }
    }

    /// Score of a dataset with nothing in it.
    #[must_use]
    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0, 0.0)
    }
}

impl fmt::Display for QualityScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "overall {:.3} (completeness {:.3}, consistency {:.3}, accuracy {:.3}, timeliness {:.3}, validity {:.3})",
            self.overall,
            self.completeness,
            self.consistency,
            self.accuracy,
            self.timeliness,
            self.validity
        )
    }
}

/// Everything the validator found about one dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Symbol the dataset belongs to.
    pub symbol: Symbol,
    /// Verdict.
    pub passed: bool,
    /// Every check result, passing ones included.
    pub results: Vec<ValidationResult>,
    /// Composite score.
    pub score: QualityScore,
}

impl QualityReport {
    /// Failed results at or above `min_severity`.
    pub fn issues(&self, min_severity: Severity) -> impl Iterator<Item = &ValidationResult> {
        self.results
            .iter()
            .filter(move |r| !r.passed && r.severity >= min_severity)
    }

    /// Number of failed results with exactly `severity`.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.results
            .iter()
            .filter(|r| !r.passed && r.severity == severity)
            .count()
    }

    /// Multi-line human-readable summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{}: {} | {}\n{} critical, {} errors, {} warnings, {} info",
            self.symbol,
            if self.passed { "PASSED" } else { "FAILED" },
            self.score,
            self.count(Severity::Critical),
            self.count(Severity::Error),
            self.count(Severity::Warning),
            self.count(Severity::Info),
        );
        for issue in self.issues(Severity::Warning) {
            out.push_str("\n  ");
            out.push_str(&issue.to_string());
        }
        out
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())
    }
}
