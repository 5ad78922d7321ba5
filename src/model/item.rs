use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::thumbnail::Thumbnail;

/// Outcome of one external validator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorOutcome {
    Succeeded,
    Failed,
}

impl fmt::Display for ValidatorOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorOutcome::Succeeded => f.write_str("succeeded"),
            ValidatorOutcome::Failed => f.write_str("failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensityStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl IntensityStats {
    /// Population statistics; `None` for an empty buffer.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len() as f64;
        let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
        for &value in values {
            min = min.min(value);
            max = max.max(value);
            sum += value;
        }
        let mean = sum / count;
        let variance = values
            .iter()
            .map(|&value| (value - mean) * (value - mean))
            .sum::<f64>()
            / count;
        Some(Self {
            min,
            max,
            mean,
            std: variance.sqrt(),
        })
    }
}

/// One report row: a single file or an assembled series.
#[derive(Debug, Clone, Default)]
pub struct Item {
    /// Source files; slice order for series.
    pub files: Vec<PathBuf>,
    /// The file path (per file) or series key (per series).
    pub key: String,
    pub fingerprint: Option<String>,
    pub size: Option<Vec<usize>>,
    pub spacing: Option<Vec<f64>>,
    pub origin: Option<Vec<f64>>,
    pub direction: Option<Vec<f64>>,
    pub pixel_type: Option<String>,
    pub stats: Option<IntensityStats>,
    /// Output heading to tag value; absent tags have no entry.
    pub metadata: BTreeMap<String, String>,
    /// Output heading to validator outcome.
    pub validators: BTreeMap<String, ValidatorOutcome>,
    pub thumbnail: Option<Thumbnail>,
}

impl Item {
    pub fn unread(key: impl Into<String>, files: Vec<PathBuf>) -> Self {
        Self {
            key: key.into(),
            files,
            ..Self::default()
        }
    }

    /// Number of populated report cells, the file list included.
    pub fn populated_fields(&self) -> usize {
        let scalar = [
            !self.files.is_empty(),
            self.fingerprint.is_some(),
            self.size.is_some(),
            self.spacing.is_some(),
            self.origin.is_some(),
            self.direction.is_some(),
            self.pixel_type.is_some(),
        ]
        .into_iter()
        .filter(|populated| *populated)
        .count();
        let stats = if self.stats.is_some() { 4 } else { 0 };
        scalar + stats + self.metadata.len() + self.validators.len()
    }

    pub fn is_problem(&self) -> bool {
        self.populated_fields() < 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unread_item_is_a_problem() {
        let item = Item::unread("/data/notes.txt", vec![PathBuf::from("/data/notes.txt")]);
        assert_eq!(item.populated_fields(), 1);
        assert!(item.is_problem());
    }

    #[test]
    fn stats_use_population_deviation() {
        let stats = IntensityStats::from_values(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0])
            .expect("non-empty");
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 9.0);
        assert_eq!(stats.mean, 5.0);
        assert!((stats.std - 2.0).abs() < 1e-12);
        assert!(IntensityStats::from_values(&[]).is_none());
    }
}
