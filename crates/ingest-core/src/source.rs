//! The data source capability.
//!
//! Every backing source of features implements [`DataSource`]. Sources embed a
//! [`SourceState`] that carries their availability flag and last recorded
//! error; the trait's default methods operate on it.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{error::Result, table::FeatureTable, types::Symbol};

/// The last error recorded against a source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceError {
    /// Error message.
    pub message: String,
    /// When the error was recorded.
    pub timestamp: DateTime<Utc>,
}

/// Mutable status shared by all source implementations.
#[derive(Debug)]
pub struct SourceState {
    enabled: AtomicBool,
    error: RwLock<Option<SourceError>>,
}

impl Default for SourceState {
    fn default() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            error: RwLock::new(None),
        }
    }
}

impl SourceState {
    /// Creates an enabled state with no error.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true unless the source was disabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enables or disables the source.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Records an error, replacing any earlier one.
    pub fn set_error(&self, message: impl Into<String>) {
        *self.error.write() = Some(SourceError {
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    /// Clears the recorded error.
    pub fn reset_error(&self) {
        *self.error.write() = None;
    }

    /// Returns a copy of the recorded error.
    #[must_use]
    pub fn last_error(&self) -> Option<SourceError> {
        self.error.read().clone()
    }
}

/// A backing source of daily features.
///
/// Lower `priority` values take precedence when several sources report the
/// same cell. `fetch` returns a table indexed by date whose columns are a
/// subset of [`feature_columns`](DataSource::feature_columns).
#[async_trait]
pub trait DataSource: Send + Sync + Debug {
    /// Unique name of this source.
    fn name(&self) -> &str;

    /// Merge precedence; lower wins.
    fn priority(&self) -> i32;

    /// Columns this source can produce.
    fn feature_columns(&self) -> Vec<String>;

    /// Shared status block.
    fn state(&self) -> &SourceState;

    /// Fetches features for `symbol` between `start` and `end`, inclusive.
    async fn fetch(&self, symbol: &Symbol, start: NaiveDate, end: NaiveDate)
    -> Result<FeatureTable>;

    /// Returns true if the source can currently serve requests.
    fn is_available(&self) -> bool {
        self.state().is_enabled()
    }

    /// Records an error against this source.
    fn set_error(&self, message: &str) {
        self.state().set_error(message);
    }

    /// Clears the recorded error.
    fn reset_error(&self) {
        self.state().reset_error();
    }

    /// Returns the last recorded error, if any.
    fn last_error(&self) -> Option<SourceError> {
        self.state().last_error()
    }
}
