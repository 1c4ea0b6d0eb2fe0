#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for feature ingestion.
//!
//! This crate provides the foundational abstractions shared by every other
//! crate in the workspace:
//!
//! - [`DataSource`](source::DataSource) - Capability implemented by every backing source
//! - [`FeatureTable`](table::FeatureTable) - Date-indexed table of named features
//! - [`IngestError`](error::IngestError) - Error taxonomy with [`ErrorKind`](error::ErrorKind) tags
//! - [`PipelineConfig`](config::PipelineConfig) - Manager, fallback and validation settings

/// Pipeline configuration.
pub mod config;
/// Error types for ingestion operations.
pub mod error;
/// Reading foreign polars frames.
pub mod frame;
/// The data source trait and its shared state.
pub mod source;
/// IQR fencing.
pub mod stats;
/// Date-indexed feature table over a polars DataFrame.
pub mod table;
/// Core value types (Symbol, OhlcvBar, DateRange).
pub mod types;

// Re-export commonly used items at crate root
pub use config::{
    DEFAULT_REQUIRED_COLUMNS, FallbackConfig, ManagerConfig, PipelineConfig, ValidationConfig,
};
pub use error::{ErrorKind, IngestError, Result};
pub use source::{DataSource, SourceError, SourceState};
pub use stats::IqrFence;
pub use table::{DATE_COLUMN, FeatureTable, float_column, float_values};
pub use types::{DateRange, OhlcvBar, Symbol};
