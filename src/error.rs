use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Problems found in the effective configuration before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("root directory {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),

    #[error("{values} has {value_count} entries but {headings} has {heading_count}")]
    LengthMismatch {
        values: &'static str,
        value_count: usize,
        headings: &'static str,
        heading_count: usize,
    },

    #[error("report heading `{0}` is used more than once")]
    DuplicateHeading(String),

    #[error("{0} must be positive")]
    NotPositive(&'static str),

    #[error("projection axis {0} is out of range, expected 0, 1 or 2")]
    ProjectionAxis(usize),

    #[error("cannot parse tag `{0}`")]
    Tag(String),

    #[error("{0}")]
    Decoder(String),

    #[error("cannot read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot write report: {0}")]
    Csv(#[from] csv::Error),

    #[error("cannot write summary image: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("cannot write settings snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T, E = SurveyError> = std::result::Result<T, E>;
