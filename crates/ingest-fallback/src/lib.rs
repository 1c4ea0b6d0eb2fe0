#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Failure recovery for feature sources.
//!
//! - [`classify_failure`] - Pure mapping from an error to a [`RecoveryStrategy`]
//! - [`backoff_delay`] - Capped exponential retry delay
//! - [`FallbackHandler`] - Executes strategies; owns counters and cache

/// The recovery handler.
pub mod handler;
/// Strategy selection and backoff.
pub mod strategy;

pub use handler::{FallbackHandler, FallbackStats, RecoveryOutcome};
pub use strategy::{RecoveryStrategy, backoff_delay, classify_failure};
