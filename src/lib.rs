//! Batch characterization of image corpora.
//!
//! A run walks a directory tree, decodes every file (or every DICOM series
//! assembled from the tree) and writes a CSV report with content
//! fingerprints, geometry, intensity statistics, selected tag values and
//! external validator outcomes. Exact duplicates are listed separately and
//! an optional TIFF atlas tiles one thumbnail per report row.

pub mod app;
pub mod atlas;
pub mod config;
pub mod error;
pub mod executor;
pub mod image_pipeline;
pub mod inspect;
pub mod model;
pub mod progress;
pub mod report;
pub mod scan;
pub mod series;
pub mod staging;
pub mod thumbnail;
pub mod utils;
pub mod validators;

pub use app::survey;
pub use config::{AnalysisType, Settings, SurveyConfig};
pub use error::{ConfigError, SurveyError};
pub use report::RunSummary;
