#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/ingest/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

/// Findings, scores and reports.
pub mod result;
/// The check battery.
pub mod validator;

pub use result::{QualityReport, QualityScore, Severity, ValidationResult};
pub use validator::QualityValidator;
