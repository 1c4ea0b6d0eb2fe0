//! Error types for ingestion operations.
//!
//! This module defines [`IngestError`], which covers every failure a data
//! source, the cache, the configuration loader or the pipeline can report, and
//! [`ErrorKind`], the coarse tag the fallback layer uses to choose a recovery
//! strategy.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while ingesting feature data.
#[derive(Error, Debug, Clone)]
pub enum IngestError {
    /// Network-related errors (connection failures, resets, unreachable hosts).
    #[error("Network error: {0}")]
    Network(String),

    /// An operation did not complete in time.
    #[error("Timeout: {operation} did not complete within {seconds}s")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout that elapsed, in seconds.
        seconds: u64,
    },

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// The backing store of a source failed (connection pool, query error).
    #[error("Database error: {0}")]
    Database(String),

    /// A source returned less data than requested.
    #[error("Incomplete data for {symbol}: {detail}")]
    IncompleteData {
        /// The symbol that was requested.
        symbol: String,
        /// What was missing.
        detail: String,
    },

    /// Access to a source was refused.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The requested symbol was not found.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Data is not available for the requested symbol and date range.
    #[error("Data not available for {symbol} in range {start} to {end}")]
    DataNotAvailable {
        /// The symbol that was requested.
        symbol: String,
        /// Start of the requested date range.
        start: String,
        /// End of the requested date range.
        end: String,
    },

    /// A source with the same name is already registered.
    #[error("Duplicate source: {0} is already registered")]
    DuplicateSource(String),

    /// No source with the given name is registered.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// The merged data did not pass the combined-data gate.
    #[error("Insufficient data for {symbol}: {}", .errors.join("; "))]
    InsufficientData {
        /// The symbol that was requested.
        symbol: String,
        /// Every violated check, in evaluation order.
        errors: Vec<String>,
    },

    /// Error parsing data from a provider.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Error interacting with the cache.
    #[error("Cache error: {0}")]
    Cache(String),

    /// Invalid or inconsistent configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// A DataFrame operation failed.
    #[error("Frame error: {0}")]
    Frame(String),

    /// Any other error. Classified from its message text.
    #[error("{0}")]
    Other(String),
}

impl From<polars::prelude::PolarsError> for IngestError {
    fn from(err: polars::prelude::PolarsError) -> Self {
        Self::Frame(err.to_string())
    }
}

/// Result type alias using [`IngestError`].
pub type Result<T> = std::result::Result<T, IngestError>;

/// Coarse failure category used to pick a recovery strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Transport failure.
    Network,
    /// Operation exceeded its deadline.
    Timeout,
    /// Backing store or connection pool failure.
    Database,
    /// Partial or truncated data.
    Incomplete,
    /// Authentication or authorization failure.
    Permission,
    /// Nothing matched.
    Unclassified,
}

const NETWORK_KEYWORDS: &[&str] = &[
    "network",
    "connection refused",
    "connection reset",
    "connection aborted",
    "connection error",
    "unreachable",
    "dns",
    "socket",
    "rate limit",
    "too many requests",
];

const TIMEOUT_KEYWORDS: &[&str] = &["timeout", "timed out", "deadline exceeded"];

const DATABASE_KEYWORDS: &[&str] = &[
    "database",
    "connection pool",
    "pool exhausted",
    "sql",
    "deadlock",
    "operationalerror",
];

const INCOMPLETE_KEYWORDS: &[&str] = &[
    "incomplete",
    "partial",
    "missing data",
    "insufficient",
    "truncated",
    "not enough",
];

const PERMISSION_KEYWORDS: &[&str] = &[
    "permission",
    "unauthorized",
    "forbidden",
    "access denied",
    "authentication",
    "api key",
];

impl ErrorKind {
    /// Every kind the legacy classifier knows about, in match priority.
    pub const CLASSIFIED: [Self; 5] = [
        Self::Network,
        Self::Timeout,
        Self::Database,
        Self::Incomplete,
        Self::Permission,
    ];

    const fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Network => NETWORK_KEYWORDS,
            Self::Timeout => TIMEOUT_KEYWORDS,
            Self::Database => DATABASE_KEYWORDS,
            Self::Incomplete => INCOMPLETE_KEYWORDS,
            Self::Permission => PERMISSION_KEYWORDS,
            Self::Unclassified => &[],
        }
    }

    /// Returns true if `message` contains one of this kind's keywords.
    ///
    /// Matching is case-insensitive. This is the legacy classifier for errors
    /// raised without a typed kind (foreign libraries, free-form messages).
    #[must_use]
    pub fn matches_message(self, message: &str) -> bool {
        let lowered = message.to_lowercase();
        self.keywords().iter().any(|kw| lowered.contains(kw))
    }

    /// Classifies a free-form message, returning the first matching kind.
    #[must_use]
    pub fn from_message(message: &str) -> Self {
        Self::CLASSIFIED
            .into_iter()
            .find(|kind| kind.matches_message(message))
            .unwrap_or(Self::Unclassified)
    }

    /// Returns true for kinds that are worth retrying as-is.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Network | Self::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Database => "database",
            Self::Incomplete => "incomplete",
            Self::Permission => "permission",
            Self::Unclassified => "unclassified",
        };
        f.write_str(name)
    }
}

impl IngestError {
    /// Returns the kind tag attached to this error.
    ///
    /// Typed variants carry their kind directly; [`IngestError::Other`] falls
    /// back to keyword classification of its message.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) | Self::RateLimited { .. } => ErrorKind::Network,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Database(_) => ErrorKind::Database,
            Self::IncompleteData { .. } => ErrorKind::Incomplete,
            Self::PermissionDenied(_) => ErrorKind::Permission,
            Self::Other(message) => ErrorKind::from_message(message),
            _ => ErrorKind::Unclassified,
        }
    }

    /// Returns true if this error belongs to `kind`.
    ///
    /// A typed error belongs to exactly one kind. An untyped message may match
    /// several keyword sets at once, e.g. "database connection timed out" is
    /// both a timeout and a database failure.
    #[must_use]
    pub fn exhibits(&self, kind: ErrorKind) -> bool {
        match self {
            Self::Other(message) => kind.matches_message(message),
            _ => self.kind() == kind,
        }
    }

    /// Shorthand for an untyped error built from any displayable value.
    pub fn other(message: impl fmt::Display) -> Self {
        Self::Other(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_errors_carry_their_kind() {
        assert_eq!(
            IngestError::Network("reset".into()).kind(),
            ErrorKind::Network
        );
        assert_eq!(
            IngestError::Timeout {
                operation: "fetch".into(),
                seconds: 5
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            IngestError::PermissionDenied("bad key".into()).kind(),
            ErrorKind::Permission
        );
        assert_eq!(
            IngestError::SymbolNotFound("XYZ".into()).kind(),
            ErrorKind::Unclassified
        );
    }

    #[test]
    fn legacy_classifier_reads_messages() {
        assert_eq!(ErrorKind::from_message("Connection timeout"), ErrorKind::Timeout);
        assert_eq!(
            ErrorKind::from_message("unauthorized access"),
            ErrorKind::Permission
        );
        assert_eq!(
            ErrorKind::from_message("Connection pool exhausted"),
            ErrorKind::Database
        );
        assert_eq!(
            ErrorKind::from_message("partial response"),
            ErrorKind::Incomplete
        );
        assert_eq!(ErrorKind::from_message("boom"), ErrorKind::Unclassified);
    }

    #[test]
    fn untyped_message_can_exhibit_several_kinds() {
        let err = IngestError::other("database connection timed out");
        assert!(err.exhibits(ErrorKind::Timeout));
        assert!(err.exhibits(ErrorKind::Database));
        assert!(!err.exhibits(ErrorKind::Permission));
    }

    #[test]
    fn insufficient_data_lists_every_error() {
        let err = IngestError::InsufficientData {
            symbol: "AAPL".into(),
            errors: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "Insufficient data for AAPL: a; b");
    }
}
