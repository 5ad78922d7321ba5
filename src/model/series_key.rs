use std::fmt;

/// Stands in for a discriminator tag the file does not carry.
pub const MISSING_TAG_PLACEHOLDER: &str = " ";

/// Identifies the files believed to form one logical multi-file image.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeriesKey {
    pub series_uid: String,
    pub study_uid: String,
    pub discriminators: Vec<String>,
}

impl SeriesKey {
    pub fn new(series_uid: &str, study_uid: &str, discriminators: Vec<Option<String>>) -> Self {
        Self {
            series_uid: series_uid.to_string(),
            study_uid: study_uid.to_string(),
            discriminators: discriminators
                .into_iter()
                .map(|value| value.unwrap_or_else(|| MISSING_TAG_PLACEHOLDER.to_string()))
                .collect(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.series_uid, self.study_uid)?;
        for value in &self.discriminators {
            write!(f, ":{value}")?;
        }
        Ok(())
    }
}
