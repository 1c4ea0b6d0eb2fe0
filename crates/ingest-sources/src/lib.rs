#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Concrete feature sources.
//!
//! Every source implements [`DataSource`](ingest_core::DataSource):
//!
//! - [`PriceSource`] - open/high/low/close/volume/adjusted close (priority 0)
//! - [`IndicatorSource`] - technical indicators over the same bars (priority 1)
//! - [`TimeFeatureSource`] - calendar features (priority 2)
//!
//! Price and indicator sources read bars through the [`BarLoader`] seam.

/// Calendar-derived features.
pub mod calendar;
/// Technical indicator source and indicator math.
pub mod indicators;
/// Daily price source and bar loaders.
pub mod price;
/// Yahoo Finance bar loader.
#[cfg(feature = "yahoo")]
pub mod yahoo;

pub use calendar::{TIME_COLUMNS, TimeFeatureSource};
pub use indicators::{INDICATOR_COLUMNS, IndicatorSource};
pub use price::{BarLoader, PRICE_COLUMNS, PriceSource, StaticBarLoader, bars_to_table};
#[cfg(feature = "yahoo")]
pub use yahoo::YahooBarLoader;
