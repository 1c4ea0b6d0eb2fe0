//! Recovery strategy selection.

use std::fmt;
use std::time::Duration;

use ingest_core::{ErrorKind, FallbackConfig, IngestError};
use serde::{Deserialize, Serialize};

/// How a failed fetch is recovered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryStrategy {
    /// Call the source again after a capped exponential delay.
    RetryWithBackoff,
    /// Serve a fresh cache entry for the same request.
    UseCachedData,
    /// Re-fetch the range in 30-day chunks and keep what arrives.
    PartialDataRecovery,
    /// Ask an alternative source for the same range.
    FallbackToAlternative,
    /// Give up on this source for this call.
    SkipSource,
}

impl RecoveryStrategy {
    /// Snake-case name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryWithBackoff => "retry_with_backoff",
            Self::UseCachedData => "use_cached_data",
            Self::PartialDataRecovery => "partial_data_recovery",
            Self::FallbackToAlternative => "fallback_to_alternative",
            Self::SkipSource => "skip_source",
        }
    }
}

impl fmt::Display for RecoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Picks the recovery strategy for `error`.
///
/// `failure_count` is the source's rolling failure count before this failure
/// is recorded. Rules are evaluated in order and the first match wins:
///
/// 1. network or timeout, with retry budget left: retry
/// 2. database or connection pool: cached data
/// 3. incomplete data, with partial recovery enabled: partial recovery
/// 4. permission or authentication: alternative source
/// 5. anything else: retry with budget left, otherwise skip
///
/// Untyped errors may exhibit several kinds at once; each rule tests its own
/// kind so the order above decides.
#[must_use]
pub fn classify_failure(
    error: &IngestError,
    failure_count: u32,
    config: &FallbackConfig,
) -> RecoveryStrategy {
    let under_budget = failure_count < config.max_retries;

    if under_budget && (error.exhibits(ErrorKind::Network) || error.exhibits(ErrorKind::Timeout))
    {
        RecoveryStrategy::RetryWithBackoff
    } else if error.exhibits(ErrorKind::Database) {
        RecoveryStrategy::UseCachedData
    } else if config.enable_partial_recovery && error.exhibits(ErrorKind::Incomplete) {
        RecoveryStrategy::PartialDataRecovery
    } else if error.exhibits(ErrorKind::Permission) {
        RecoveryStrategy::FallbackToAlternative
    } else if under_budget {
        RecoveryStrategy::RetryWithBackoff
    } else {
        RecoveryStrategy::SkipSource
    }
}

/// Delay before retry `attempt` (1-based).
///
/// `min(initial * multiplier^(attempt - 1), max)`; attempt 0 is treated as 1.
#[must_use]
pub fn backoff_delay(config: &FallbackConfig, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
    let raw = config.initial_retry_delay * config.backoff_multiplier.powi(exponent);
    let capped = raw.min(config.max_retry_delay).max(0.0);
    if capped.is_finite() {
        Duration::from_secs_f64(capped)
    } else {
        Duration::ZERO
    }
}
