#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! In-memory cache for fetched feature tables.
//!
//! - [`FeatureCache`] - TTL cache shared by the fallback handler
//! - [`CacheEntry`] - Snapshot of one fetch plus its metadata
//! - [`CacheStats`] - Footprint report

/// In-memory cache implementation.
pub mod memory;

pub use memory::{CacheEntry, CacheKey, CacheStats, FeatureCache, checksum};
