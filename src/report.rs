//! Report rows, duplicate groups and the CSV files written from them.

use std::collections::BTreeMap;
use std::path::Path;

use crate::model::Item;
use crate::utils::{format_float, format_float_list, format_usize_list};

pub const FIXED_COLUMNS: [&str; 11] = [
    "files",
    "SHA256 intensity hash",
    "image size",
    "image spacing",
    "image origin",
    "axis direction",
    "pixel type",
    "min intensity",
    "max intensity",
    "mean intensity",
    "std intensity",
];

/// Rows sharing one fingerprint, as indices into [`Report::rows`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup {
    pub fingerprint: String,
    pub rows: Vec<usize>,
}

/// A task that panicked instead of returning a row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrashedTask {
    pub input: String,
    pub reason: String,
}

/// Collects rows as tasks finish, in whatever order that happens.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    metadata_headings: Vec<String>,
    validator_headings: Vec<String>,
    rows: Vec<Item>,
    crashed: Vec<CrashedTask>,
}

impl ReportAggregator {
    pub fn new(metadata_headings: Vec<String>, validator_headings: Vec<String>) -> Self {
        Self {
            metadata_headings,
            validator_headings,
            ..Self::default()
        }
    }

    pub fn add(&mut self, item: Item) {
        self.rows.push(item);
    }

    pub fn add_crash(&mut self, input: String, reason: String) {
        self.crashed.push(CrashedTask { input, reason });
    }

    /// Rows come out sorted by key so the report does not depend on
    /// completion order. Problem rows are counted, and dropped when
    /// `ignore_problems` is set.
    pub fn finish(self, ignore_problems: bool) -> Report {
        let mut rows = self.rows;
        rows.sort_by(|a, b| a.key.cmp(&b.key));
        let total = rows.len();
        let problems = rows.iter().filter(|item| item.is_problem()).count();
        if ignore_problems {
            rows.retain(|item| !item.is_problem());
        }
        let duplicates = duplicate_groups(&rows);
        Report {
            metadata_headings: self.metadata_headings,
            validator_headings: self.validator_headings,
            rows,
            total,
            problems,
            crashed: self.crashed,
            duplicates,
        }
    }
}

/// Fingerprint classes of size > 1 over non-problem rows, ordered by
/// fingerprint, members in row order.
pub fn duplicate_groups(rows: &[Item]) -> Vec<DuplicateGroup> {
    let mut by_fingerprint: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (index, item) in rows.iter().enumerate() {
        if item.is_problem() {
            continue;
        }
        if let Some(fingerprint) = item.fingerprint.as_deref() {
            by_fingerprint.entry(fingerprint).or_default().push(index);
        }
    }
    by_fingerprint
        .into_iter()
        .filter(|(_, rows)| rows.len() > 1)
        .map(|(fingerprint, rows)| DuplicateGroup {
            fingerprint: fingerprint.to_string(),
            rows,
        })
        .collect()
}

#[derive(Debug)]
pub struct Report {
    metadata_headings: Vec<String>,
    validator_headings: Vec<String>,
    pub rows: Vec<Item>,
    /// Rows produced, problem rows included even when dropped.
    pub total: usize,
    pub problems: usize,
    pub crashed: Vec<CrashedTask>,
    pub duplicates: Vec<DuplicateGroup>,
}

impl Report {
    pub fn header(&self) -> Vec<String> {
        FIXED_COLUMNS
            .iter()
            .map(|column| column.to_string())
            .chain(self.metadata_headings.iter().cloned())
            .chain(self.validator_headings.iter().cloned())
            .collect()
    }

    pub fn record(&self, item: &Item) -> Vec<String> {
        let files: Vec<String> = item
            .files
            .iter()
            .map(|path| path.display().to_string())
            .collect();
        let stat = |pick: fn(&crate::model::IntensityStats) -> f64| {
            item.stats.as_ref().map(|stats| format_float(pick(stats))).unwrap_or_default()
        };

        let mut record = vec![
            serde_json::to_string(&files).unwrap_or_default(),
            item.fingerprint.clone().unwrap_or_default(),
            item.size.as_deref().map(format_usize_list).unwrap_or_default(),
            item.spacing.as_deref().map(format_float_list).unwrap_or_default(),
            item.origin.as_deref().map(format_float_list).unwrap_or_default(),
            item.direction.as_deref().map(format_float_list).unwrap_or_default(),
            item.pixel_type.clone().unwrap_or_default(),
            stat(|stats| stats.min),
            stat(|stats| stats.max),
            stat(|stats| stats.mean),
            stat(|stats| stats.std),
        ];
        record.extend(
            self.metadata_headings
                .iter()
                .map(|heading| item.metadata.get(heading).cloned().unwrap_or_default()),
        );
        record.extend(self.validator_headings.iter().map(|heading| {
            item.validators
                .get(heading)
                .map(|outcome| outcome.to_string())
                .unwrap_or_default()
        }));
        record
    }

    pub fn write(&self, path: &Path) -> Result<(), csv::Error> {
        self.write_rows(path, self.rows.iter())
    }

    /// Same columns as the main report, one block of rows per group.
    pub fn write_duplicates(&self, path: &Path) -> Result<(), csv::Error> {
        let rows = self
            .duplicates
            .iter()
            .flat_map(|group| group.rows.iter().map(|&index| &self.rows[index]));
        self.write_rows(path, rows)
    }

    pub fn write_failures(&self, path: &Path) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["input", "reason"])?;
        for task in &self.crashed {
            writer.write_record([task.input.as_str(), task.reason.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    fn write_rows<'a>(
        &self,
        path: &Path,
        rows: impl Iterator<Item = &'a Item>,
    ) -> Result<(), csv::Error> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(self.header())?;
        for item in rows {
            writer.write_record(self.record(item))?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Counts logged at the end of a run and handed back to the caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub items: usize,
    pub problems: usize,
    pub crashed: usize,
    pub non_series_files: usize,
    pub duplicate_groups: usize,
}

impl RunSummary {
    pub fn log(&self) {
        log::info!(
            "{} item(s), {} problem item(s), {} crashed task(s), {} duplicate group(s)",
            self.items,
            self.problems,
            self.crashed,
            self.duplicate_groups
        );
        if self.non_series_files > 0 {
            log::info!("{} file(s) did not belong to any series", self.non_series_files);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IntensityStats, ValidatorOutcome};
    use std::path::PathBuf;

    fn row(path: &str, fingerprint: Option<&str>) -> Item {
        let mut item = Item::unread(path, vec![PathBuf::from(path)]);
        if let Some(fingerprint) = fingerprint {
            item.fingerprint = Some(fingerprint.to_string());
            item.size = Some(vec![2, 2]);
        }
        item
    }

    #[test]
    fn duplicates_are_grouped_by_fingerprint() {
        let mut aggregator = ReportAggregator::default();
        for item in [
            row("/d/c.png", Some("bb")),
            row("/d/a.png", Some("bb")),
            row("/d/x.txt", None),
            row("/d/b.png", Some("aa")),
            row("/d/e.png", Some("aa")),
            row("/d/f.png", Some("cc")),
        ] {
            aggregator.add(item);
        }
        let report = aggregator.finish(false);
        assert_eq!(report.problems, 1);
        assert_eq!(report.rows.len(), 6);

        let keys = |group: &DuplicateGroup| -> Vec<&str> {
            group.rows.iter().map(|&i| report.rows[i].key.as_str()).collect()
        };
        assert_eq!(report.duplicates.len(), 2);
        assert_eq!(report.duplicates[0].fingerprint, "aa");
        assert_eq!(keys(&report.duplicates[0]), vec!["/d/b.png", "/d/e.png"]);
        assert_eq!(keys(&report.duplicates[1]), vec!["/d/a.png", "/d/c.png"]);
    }

    #[test]
    fn ignored_problems_are_still_counted() {
        let mut aggregator = ReportAggregator::default();
        aggregator.add(row("/d/x.txt", None));
        aggregator.add(row("/d/a.png", Some("aa")));
        let report = aggregator.finish(true);
        assert_eq!(report.total, 2);
        assert_eq!(report.problems, 1);
        assert_eq!(report.rows.len(), 1);
    }

    #[test]
    fn record_cells_follow_the_header() {
        let report = ReportAggregator::new(
            vec!["modality".to_string(), "patient".to_string()],
            vec!["dciodvfy".to_string()],
        )
        .finish(false);
        let mut item = row("/d/a.dcm", Some("ff"));
        item.spacing = Some(vec![0.5, 0.5]);
        item.stats = IntensityStats::from_values(&[1.0, 3.0]);
        item.metadata.insert("modality".to_string(), "CT".to_string());
        item.validators
            .insert("dciodvfy".to_string(), ValidatorOutcome::Failed);

        let header = report.header();
        let record = report.record(&item);
        assert_eq!(header.len(), record.len());
        assert_eq!(record[0], r#"["/d/a.dcm"]"#);
        assert_eq!(record[2], "[2, 2]");
        assert_eq!(record[3], "[0.5, 0.5]");
        assert_eq!(record[4], "");
        assert_eq!(record[9], "2.0");
        assert_eq!(&record[11..], &["CT", "", "failed"]);
    }

    #[test]
    fn csv_files_round_trip_cells() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut aggregator = ReportAggregator::default();
        aggregator.add(row("/d/a, b.png", Some("aa")));
        aggregator.add(row("/d/c.png", Some("aa")));
        aggregator.add_crash("/d/bad.dcm".to_string(), "index out of bounds".to_string());
        let report = aggregator.finish(false);

        let path = dir.path().join("report.csv");
        report.write(&path).expect("write");
        report.write_duplicates(&dir.path().join("dups.csv")).expect("dups");
        report.write_failures(&dir.path().join("failures.csv")).expect("failures");

        let mut reader = csv::Reader::from_path(&path).expect("reader");
        let records: Vec<csv::StringRecord> =
            reader.records().collect::<Result<_, _>>().expect("records");
        assert_eq!(records.len(), 2);
        assert_eq!(&records[0][0], r#"["/d/a, b.png"]"#);

        let mut failures = csv::Reader::from_path(dir.path().join("failures.csv")).expect("reader");
        let crashed: Vec<csv::StringRecord> =
            failures.records().collect::<Result<_, _>>().expect("records");
        assert_eq!(&crashed[0][0], "/d/bad.dcm");
    }
}
