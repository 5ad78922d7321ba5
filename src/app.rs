use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use log::{debug, error, info, warn};

use crate::atlas::Atlas;
use crate::config::{AnalysisType, Cli, SurveyConfig};
use crate::error::{ConfigError, Result, SurveyError};
use crate::executor::{ParallelExecutor, TaskOutcome};
use crate::inspect::{inspect_file, inspect_series, InspectOptions};
use crate::model::{Item, SeriesKey};
use crate::progress::Progress;
use crate::report::{Report, ReportAggregator, RunSummary};
use crate::scan::FileEnumerator;
use crate::series::{assemble_series, describe_discriminators, SeriesKeyResolver};
use crate::thumbnail::Thumbnail;

pub fn run() -> ExitCode {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .try_init();

    let cli = Cli::parse();
    let outcome = SurveyConfig::from_cli(&cli)
        .map_err(SurveyError::from)
        .and_then(|config| survey(&config));
    match outcome {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

/// Runs one characterization pass and writes every output file.
pub fn survey(config: &SurveyConfig) -> Result<RunSummary> {
    let enumerator = FileEnumerator::new(&config.root)
        .map_err(|_| ConfigError::MissingRoot(config.root.clone()))?;
    let files = enumerator.files();
    info!("{} file(s) under {}", files.len(), enumerator.root().display());

    let executor = ParallelExecutor::new(config.workers)?;
    let options = config.inspect_options();
    let mut aggregator =
        ReportAggregator::new(config.metadata_headings(), config.validator_headings());
    let mut summary = RunSummary::default();

    match config.analysis_type {
        AnalysisType::PerFile => {
            let progress =
                Progress::new(config.show_progress, "inspecting files").start(files.len());
            let outcomes = executor.run(
                &files,
                &progress,
                |path| path.display().to_string(),
                |path| inspect_file(path, &options),
            );
            progress.finish();
            collect(outcomes, &mut aggregator);
        }
        AnalysisType::PerSeries => {
            let series = resolve_series(config, &executor, &files, &mut aggregator, &mut summary);
            inspect_all_series(config, &executor, &series, &options, &mut aggregator);
        }
    }

    let report = aggregator.finish(config.ignore_problems);
    summary.items = report.total;
    summary.problems = report.problems;
    summary.crashed = report.crashed.len();
    summary.duplicate_groups = report.duplicates.len();

    if report.rows.iter().all(Item::is_problem) {
        warn!("no input could be decoded, no report created");
        summary.log();
        return Ok(summary);
    }
    write_outputs(config, &report)?;
    summary.log();
    Ok(summary)
}

fn collect(outcomes: Vec<TaskOutcome<Item>>, aggregator: &mut ReportAggregator) {
    for outcome in outcomes {
        match outcome {
            TaskOutcome::Completed(item) => aggregator.add(item),
            TaskOutcome::Crashed { input, reason } => aggregator.add_crash(input, reason),
        }
    }
}

fn resolve_series(
    config: &SurveyConfig,
    executor: &ParallelExecutor,
    files: &[PathBuf],
    aggregator: &mut ReportAggregator,
    summary: &mut RunSummary,
) -> Vec<(SeriesKey, Vec<PathBuf>)> {
    let resolver = SeriesKeyResolver::new(&config.series_tags);
    info!(
        "series discriminators: {}",
        describe_discriminators(resolver.discriminators())
    );

    let progress = Progress::new(config.show_progress, "reading headers").start(files.len());
    let resolved = executor.run(
        files,
        &progress,
        |path| path.display().to_string(),
        |path| resolver.resolve(path),
    );
    progress.finish();

    let mut pairs = Vec::with_capacity(files.len());
    for (path, outcome) in files.iter().zip(resolved) {
        match outcome {
            TaskOutcome::Completed(Ok(key)) => pairs.push((key, path.clone())),
            TaskOutcome::Completed(Err(reason)) => {
                debug!("not part of a series: {reason}");
                summary.non_series_files += 1;
            }
            TaskOutcome::Crashed { input, reason } => aggregator.add_crash(input, reason),
        }
    }

    let series: Vec<_> = assemble_series(pairs).into_iter().collect();
    info!(
        "{} series from {} file(s), {} file(s) outside any series",
        series.len(),
        files.len() - summary.non_series_files,
        summary.non_series_files
    );
    series
}

fn inspect_all_series(
    config: &SurveyConfig,
    executor: &ParallelExecutor,
    series: &[(SeriesKey, Vec<PathBuf>)],
    options: &InspectOptions,
    aggregator: &mut ReportAggregator,
) {
    let progress = Progress::new(config.show_progress, "reading series").start(series.len());
    let outcomes = executor.run(
        series,
        &progress,
        |(key, _)| format!("series {key}"),
        |(key, members)| inspect_series(key, members, options),
    );
    progress.finish();
    collect(outcomes, aggregator);
}

fn write_outputs(config: &SurveyConfig, report: &Report) -> Result<()> {
    let output = &config.output_file;
    let directory = output
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(directory)?;

    report.write(output)?;
    info!("report written to {}", output.display());

    if !report.duplicates.is_empty() {
        let path = sibling(output, "_duplicates.csv");
        report.write_duplicates(&path)?;
        info!(
            "{} duplicate group(s) written to {}",
            report.duplicates.len(),
            path.display()
        );
    }
    if !report.crashed.is_empty() {
        let path = sibling(output, "_failures.csv");
        report.write_failures(&path)?;
        warn!(
            "{} task(s) crashed and are missing from the report, see {}",
            report.crashed.len(),
            path.display()
        );
    }

    let snapshot = config.settings.write_snapshot(directory)?;
    info!("settings saved to {}", snapshot.display());

    if let Some(settings) = &config.thumbnails {
        let thumbnails = atlas_tiles(report, settings.size);
        match Atlas::assemble(&thumbnails, config.tile_grid) {
            Some(atlas) => {
                let path = sibling(output, "_summary_image.tiff");
                atlas.write_tiff(&path)?;
                info!(
                    "summary image of {} plane(s) written to {}",
                    atlas.planes.len(),
                    path.display()
                );
            }
            None => warn!("no thumbnails to tile, summary image skipped"),
        }
    }
    Ok(())
}

/// One tile per problem-free row, in report order, so tile `i` is the `i`-th
/// problem-free row whether or not problem rows were kept in the report.
/// Decoded rows without a thumbnail get a black tile.
pub fn atlas_tiles(report: &Report, [width, height]: [usize; 2]) -> Vec<Thumbnail> {
    report
        .rows
        .iter()
        .filter(|item| !item.is_problem())
        .map(|item| {
            item.thumbnail
                .clone()
                .unwrap_or_else(|| Thumbnail::filled(width, height, 0))
        })
        .collect()
}

/// `out/report.csv` with suffix `_duplicates.csv` gives `out/report_duplicates.csv`.
pub fn sibling(output: &Path, suffix: &str) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string());
    output.with_file_name(format!("{stem}{suffix}"))
}
