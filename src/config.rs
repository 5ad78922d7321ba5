//! Command line, JSON configuration file and their validation.
//!
//! Optional settings resolve as built-in defaults, then the configuration
//! file, then the command line. The resolved [`Settings`] are what the run
//! snapshot records, so a snapshot fed back through `--configuration-file`
//! reproduces the run.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Local;
use clap::{Parser, ValueEnum};
use dicom::core::Tag;
use serde::{Deserialize, Serialize};

use crate::atlas::TileGrid;
use crate::error::{ConfigError, Result};
use crate::inspect::InspectOptions;
use crate::model::Decoder;
use crate::report::FIXED_COLUMNS;
use crate::thumbnail::{Interpolator, ThumbnailSettings};
use crate::utils::{format_tag, parse_tag};
use crate::validators::{Validator, ValidatorSet};

/// Series number, sequence name, slice thickness, rows, columns.
pub const DEFAULT_SERIES_TAGS: [&str; 5] =
    ["0020|0011", "0018|0024", "0018|0050", "0028|0010", "0028|0011"];

const SNAPSHOT_SUFFIX: &str = "imagesurvey_settings.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnalysisType {
    /// One row per file.
    #[value(name = "per_file")]
    PerFile,
    /// One row per assembled DICOM series.
    #[value(name = "per_series")]
    PerSeries,
}

/// Characterize every image under a directory tree.
#[derive(Parser, Debug, Clone)]
#[command(name = "imagesurvey")]
#[command(about = "Characterize an image corpus: fingerprints, geometry, statistics, duplicates")]
#[command(version)]
pub struct Cli {
    /// Directory to scan recursively
    pub root: PathBuf,

    /// Report CSV file
    pub output_file: PathBuf,

    #[arg(value_enum)]
    pub analysis_type: AnalysisType,

    /// JSON file with optional settings; command line flags win
    #[arg(long, value_name = "FILE")]
    pub configuration_file: Option<PathBuf>,

    /// Worker threads
    #[arg(long)]
    pub max_processes: Option<usize>,

    #[arg(long)]
    pub disable_progress: bool,

    /// Tags that split series sharing series and study UIDs
    #[arg(long, num_args = 0.., value_name = "TAG")]
    pub additional_series_tags: Option<Vec<String>>,

    /// `all`, `dicom`, or a raster format such as `png`
    #[arg(long)]
    pub decoder: Option<String>,

    /// Validator programs, each run as `program <file>`
    #[arg(long, num_args = 1.., value_name = "PROGRAM")]
    pub external_applications: Option<Vec<PathBuf>>,

    #[arg(long, num_args = 1.., value_name = "HEADING")]
    pub external_applications_headings: Option<Vec<String>>,

    /// Tags copied into the report
    #[arg(long, num_args = 1.., value_name = "TAG")]
    pub metadata_keys: Option<Vec<String>>,

    #[arg(long, num_args = 1.., value_name = "HEADING")]
    pub metadata_keys_headings: Option<Vec<String>>,

    /// Leave undecodable items out of the report
    #[arg(long)]
    pub ignore_problems: bool,

    /// Write a tiled TIFF of per-item thumbnails
    #[arg(long)]
    pub create_summary_image: bool,

    #[arg(long, num_args = 2, value_names = ["WIDTH", "HEIGHT"])]
    pub thumbnail_sizes: Option<Vec<usize>>,

    #[arg(long, num_args = 2, value_names = ["COLUMNS", "ROWS"])]
    pub tile_sizes: Option<Vec<usize>>,

    #[arg(long)]
    pub projection_axis: Option<usize>,

    #[arg(long, value_enum)]
    pub interpolator: Option<Interpolator>,

    /// Seconds before a validator is killed and counted as failed
    #[arg(long, value_name = "SECONDS")]
    pub validator_timeout: Option<u64>,
}

/// Optional settings as they appear in configuration files and snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub max_processes: usize,
    pub disable_progress: bool,
    pub additional_series_tags: Vec<String>,
    pub decoder: String,
    pub external_applications: Vec<PathBuf>,
    pub external_applications_headings: Vec<String>,
    pub metadata_keys: Vec<String>,
    pub metadata_keys_headings: Vec<String>,
    pub ignore_problems: bool,
    pub create_summary_image: bool,
    pub thumbnail_sizes: [usize; 2],
    pub tile_sizes: [usize; 2],
    pub projection_axis: usize,
    pub interpolator: Interpolator,
    pub validator_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_processes: 2,
            disable_progress: false,
            additional_series_tags: DEFAULT_SERIES_TAGS.iter().map(|tag| tag.to_string()).collect(),
            decoder: "all".to_string(),
            external_applications: Vec::new(),
            external_applications_headings: Vec::new(),
            metadata_keys: Vec::new(),
            metadata_keys_headings: Vec::new(),
            ignore_problems: false,
            create_summary_image: false,
            thumbnail_sizes: [64, 64],
            tile_sizes: [20, 20],
            projection_axis: 2,
            interpolator: Interpolator::Nearest,
            validator_timeout: 60,
        }
    }
}

impl Settings {
    /// Reads a JSON object of settings. Keys this version does not know are
    /// reported and ignored; missing keys keep their defaults.
    pub fn load(path: &Path) -> std::result::Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        };
        let mut value: serde_json::Value = serde_json::from_str(&text).map_err(parse_error)?;

        if let (Some(object), Ok(serde_json::Value::Object(known))) =
            (value.as_object_mut(), serde_json::to_value(Settings::default()))
        {
            object.retain(|key, _| {
                let keep = known.contains_key(key);
                if !keep {
                    log::warn!("{}: ignoring unknown setting `{key}`", path.display());
                }
                keep
            });
        }
        serde_json::from_value(value).map_err(parse_error)
    }

    /// Overrides with every option given on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(value) = cli.max_processes {
            self.max_processes = value;
        }
        self.disable_progress |= cli.disable_progress;
        if let Some(value) = &cli.additional_series_tags {
            self.additional_series_tags = value.clone();
        }
        if let Some(value) = &cli.decoder {
            self.decoder = value.clone();
        }
        if let Some(value) = &cli.external_applications {
            self.external_applications = value.clone();
        }
        if let Some(value) = &cli.external_applications_headings {
            self.external_applications_headings = value.clone();
        }
        if let Some(value) = &cli.metadata_keys {
            self.metadata_keys = value.clone();
        }
        if let Some(value) = &cli.metadata_keys_headings {
            self.metadata_keys_headings = value.clone();
        }
        self.ignore_problems |= cli.ignore_problems;
        self.create_summary_image |= cli.create_summary_image;
        if let Some([width, height]) = cli.thumbnail_sizes.as_deref().and_then(pair) {
            self.thumbnail_sizes = [width, height];
        }
        if let Some([columns, rows]) = cli.tile_sizes.as_deref().and_then(pair) {
            self.tile_sizes = [columns, rows];
        }
        if let Some(value) = cli.projection_axis {
            self.projection_axis = value;
        }
        if let Some(value) = cli.interpolator {
            self.interpolator = value;
        }
        if let Some(value) = cli.validator_timeout {
            self.validator_timeout = value;
        }
    }

    /// Writes `<%d_%m_%Y-%H_%M_%S>_imagesurvey_settings.json` into `dir`.
    pub fn write_snapshot(&self, dir: &Path) -> Result<PathBuf> {
        let stamp = Local::now().format("%d_%m_%Y-%H_%M_%S");
        let path = dir.join(format!("{stamp}_{SNAPSHOT_SUFFIX}"));
        let file = fs::File::create(&path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(path)
    }
}

fn pair(values: &[usize]) -> Option<[usize; 2]> {
    match values {
        [a, b] => Some([*a, *b]),
        _ => None,
    }
}

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    pub root: PathBuf,
    pub output_file: PathBuf,
    pub analysis_type: AnalysisType,
    pub workers: usize,
    pub show_progress: bool,
    pub series_tags: Vec<Tag>,
    pub decoder: Decoder,
    pub validators: Vec<Validator>,
    pub validator_timeout: Duration,
    /// Lower-case tag key with its report heading.
    pub metadata: Vec<(String, String)>,
    pub ignore_problems: bool,
    pub thumbnails: Option<ThumbnailSettings>,
    pub tile_grid: TileGrid,
    pub settings: Settings,
}

impl SurveyConfig {
    pub fn from_cli(cli: &Cli) -> std::result::Result<Self, ConfigError> {
        let mut settings = match &cli.configuration_file {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        settings.apply_cli(cli);
        Self::new(&cli.root, &cli.output_file, cli.analysis_type, settings)
    }

    pub fn new(
        root: &Path,
        output_file: &Path,
        analysis_type: AnalysisType,
        settings: Settings,
    ) -> std::result::Result<Self, ConfigError> {
        if !root.is_dir() {
            return Err(ConfigError::MissingRoot(root.to_path_buf()));
        }
        check_lengths(
            "metadata_keys",
            settings.metadata_keys.len(),
            "metadata_keys_headings",
            settings.metadata_keys_headings.len(),
        )?;
        check_lengths(
            "external_applications",
            settings.external_applications.len(),
            "external_applications_headings",
            settings.external_applications_headings.len(),
        )?;
        check_headings(
            settings
                .metadata_keys_headings
                .iter()
                .chain(&settings.external_applications_headings),
        )?;
        for (name, value) in [
            ("max_processes", settings.max_processes),
            ("thumbnail width", settings.thumbnail_sizes[0]),
            ("thumbnail height", settings.thumbnail_sizes[1]),
            ("tile columns", settings.tile_sizes[0]),
            ("tile rows", settings.tile_sizes[1]),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive(name));
            }
        }
        if settings.validator_timeout == 0 {
            return Err(ConfigError::NotPositive("validator_timeout"));
        }
        if settings.projection_axis > 2 {
            return Err(ConfigError::ProjectionAxis(settings.projection_axis));
        }

        let series_tags = settings
            .additional_series_tags
            .iter()
            .map(|text| parse_tag(text).ok_or_else(|| ConfigError::Tag(text.clone())))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let metadata = settings
            .metadata_keys
            .iter()
            .zip(&settings.metadata_keys_headings)
            .map(|(key, heading)| {
                parse_tag(key)
                    .map(|tag| (format_tag(tag), heading.clone()))
                    .ok_or_else(|| ConfigError::Tag(key.clone()))
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let decoder: Decoder = settings.decoder.parse().map_err(ConfigError::Decoder)?;
        if analysis_type == AnalysisType::PerSeries && matches!(decoder, Decoder::Raster(_)) {
            log::warn!("per_series analysis always reads DICOM, ignoring decoder `{decoder}`");
        }

        let validators = settings
            .external_applications
            .iter()
            .zip(&settings.external_applications_headings)
            .map(|(program, heading)| Validator {
                program: program.clone(),
                heading: heading.clone(),
            })
            .collect();
        let thumbnails = settings.create_summary_image.then(|| ThumbnailSettings {
            size: settings.thumbnail_sizes,
            projection_axis: settings.projection_axis,
            interpolator: settings.interpolator,
        });

        Ok(Self {
            root: root.to_path_buf(),
            output_file: output_file.to_path_buf(),
            analysis_type,
            workers: settings.max_processes,
            show_progress: !settings.disable_progress,
            series_tags,
            decoder,
            validators,
            validator_timeout: Duration::from_secs(settings.validator_timeout),
            metadata,
            ignore_problems: settings.ignore_problems,
            thumbnails,
            tile_grid: TileGrid {
                columns: settings.tile_sizes[0],
                rows: settings.tile_sizes[1],
            },
            settings,
        })
    }

    pub fn inspect_options(&self) -> InspectOptions {
        InspectOptions {
            decoder: self.decoder,
            metadata: self.metadata.clone(),
            validators: ValidatorSet::new(self.validators.clone(), self.validator_timeout),
            thumbnail: self.thumbnails.clone(),
        }
    }

    pub fn metadata_headings(&self) -> Vec<String> {
        self.metadata.iter().map(|(_, heading)| heading.clone()).collect()
    }

    pub fn validator_headings(&self) -> Vec<String> {
        self.validators.iter().map(|validator| validator.heading.clone()).collect()
    }
}

fn check_lengths(
    values: &'static str,
    value_count: usize,
    headings: &'static str,
    heading_count: usize,
) -> std::result::Result<(), ConfigError> {
    if value_count == heading_count {
        Ok(())
    } else {
        Err(ConfigError::LengthMismatch {
            values,
            value_count,
            headings,
            heading_count,
        })
    }
}

/// Caller headings must differ from each other and from the fixed columns.
fn check_headings<'a>(
    headings: impl Iterator<Item = &'a String>,
) -> std::result::Result<(), ConfigError> {
    let mut seen: HashSet<&str> = FIXED_COLUMNS.into_iter().collect();
    for heading in headings {
        if !seen.insert(heading.as_str()) {
            return Err(ConfigError::DuplicateHeading(heading.clone()));
        }
    }
    Ok(())
}
