#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # Features
//!
//! - `yahoo` - Yahoo Finance bar loader for the price and indicator sources

// Core types and traits
pub use ingest_core::*;

// Cache
pub use ingest_cache::{CacheEntry, CacheKey, CacheStats, FeatureCache};

// Sources
pub use ingest_sources::{
    BarLoader, INDICATOR_COLUMNS, IndicatorSource, PRICE_COLUMNS, PriceSource, StaticBarLoader,
    TIME_COLUMNS, TimeFeatureSource, bars_to_table,
};
#[cfg(feature = "yahoo")]
pub use ingest_sources::YahooBarLoader;

// Recovery and quality
pub use ingest_fallback::{
    FallbackHandler, FallbackStats, RecoveryOutcome, RecoveryStrategy, backoff_delay,
    classify_failure,
};
pub use ingest_quality::{
    QualityReport, QualityScore, QualityValidator, Severity, ValidationResult,
};

mod manager;
pub mod merge;
mod pipeline;

pub use manager::{NO_DATA, SourceManager, SourceStatus};
pub use pipeline::{CollectedFeatures, FeaturePipeline};
