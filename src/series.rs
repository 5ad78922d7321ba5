//! Series grouping and multi-file volume reading.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject};

use crate::image_pipeline::{attribute_text, FrameImagePipeline, PipelineError, SliceGeometry};
use crate::model::loader::{collect_tags, read_dicom_header};
use crate::model::{DecodeOutcome, DecodedImage, Samples, SeriesKey, Volume};
use crate::staging::ScratchStage;
use crate::utils::format_tag;

/// Positions closer than this along the normal count as the same slice.
const POSITION_EPSILON: f64 = 1e-4;
/// Relative tolerance on gaps between consecutive slices.
const SPACING_TOLERANCE: f64 = 1e-3;

/// Derives a [`SeriesKey`] from one file's DICOM header.
#[derive(Debug, Clone)]
pub struct SeriesKeyResolver {
    discriminators: Vec<Tag>,
}

impl SeriesKeyResolver {
    /// Duplicates and the series/study UID tags are dropped from
    /// `discriminators`; the first occurrence keeps its position.
    pub fn new(discriminators: &[Tag]) -> Self {
        let mut kept: Vec<Tag> = Vec::with_capacity(discriminators.len());
        for &tag in discriminators {
            if tag == tags::SERIES_INSTANCE_UID || tag == tags::STUDY_INSTANCE_UID {
                continue;
            }
            if !kept.contains(&tag) {
                kept.push(tag);
            }
        }
        Self {
            discriminators: kept,
        }
    }

    pub fn discriminators(&self) -> &[Tag] {
        &self.discriminators
    }

    pub fn resolve(&self, path: &Path) -> Result<SeriesKey, String> {
        let header = read_dicom_header(path)?;
        self.key_of(&header)
            .map_err(|reason| format!("{}: {reason}", path.display()))
    }

    fn key_of(&self, header: &DefaultDicomObject) -> Result<SeriesKey, String> {
        let series_uid = attribute_text(header, tags::SERIES_INSTANCE_UID)
            .ok_or_else(|| "missing SeriesInstanceUID".to_string())?;
        let study_uid = attribute_text(header, tags::STUDY_INSTANCE_UID)
            .ok_or_else(|| "missing StudyInstanceUID".to_string())?;
        let discriminators = self
            .discriminators
            .iter()
            .map(|&tag| attribute_text(header, tag))
            .collect();
        Ok(SeriesKey::new(&series_uid, &study_uid, discriminators))
    }
}

/// Groups resolved files by key. Member lists are sorted, so any permutation
/// of `pairs` yields the same map.
pub fn assemble_series<I>(pairs: I) -> BTreeMap<SeriesKey, Vec<PathBuf>>
where
    I: IntoIterator<Item = (SeriesKey, PathBuf)>,
{
    let mut series: BTreeMap<SeriesKey, Vec<PathBuf>> = BTreeMap::new();
    for (key, path) in pairs {
        series.entry(key).or_default().push(path);
    }
    for members in series.values_mut() {
        members.sort();
        members.dedup();
    }
    series
}

struct Slice {
    staged: PathBuf,
    staging_index: usize,
    object: DefaultDicomObject,
    geometry: SliceGeometry,
    instance_number: Option<i64>,
}

/// Where a slice falls in the series: slices with a position come first,
/// ordered along the normal, then the rest. Ties fall back to
/// InstanceNumber and then staging order, so the order is total.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlicePlacement {
    pub along_normal: Option<f64>,
    pub instance_number: Option<i64>,
    pub staging_index: usize,
}

impl SlicePlacement {
    pub fn order(&self, other: &Self) -> Ordering {
        let by_position = match (self.along_normal, other.along_normal) {
            (Some(a), Some(b)) => a.total_cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        by_position
            .then_with(|| self.instance_number.cmp(&other.instance_number))
            .then_with(|| self.staging_index.cmp(&other.staging_index))
    }
}

/// Stages the members of `key` into a scratch directory and decodes them as
/// one volume ordered along the slice normal. The scratch directory is gone
/// when this returns.
pub fn read_series(key: &SeriesKey, files: &[PathBuf]) -> DecodeOutcome {
    read_series_in(key, files, &std::env::temp_dir())
}

/// [`read_series`] with the scratch directory created under `scratch_root`.
pub fn read_series_in(key: &SeriesKey, files: &[PathBuf], scratch_root: &Path) -> DecodeOutcome {
    let stage = match ScratchStage::stage_in(files, scratch_root) {
        Ok(stage) => stage,
        Err(err) => {
            return DecodeOutcome::Faulted(format!("series {key}: staging failed ({err})"))
        }
    };
    log::debug!(
        "series {key}: staged {} file(s) in {} ({:?})",
        files.len(),
        stage.path().display(),
        stage.method()
    );
    read_staged_series(key, &stage)
}

fn read_staged_series(key: &SeriesKey, stage: &ScratchStage) -> DecodeOutcome {
    let mut slices: Vec<Slice> = Vec::with_capacity(stage.staged_files().len());
    for (staging_index, staged) in stage.staged_files().iter().enumerate() {
        // one unreadable member fails the whole series
        let object = match open_file(staged) {
            Ok(object) => object,
            Err(err) => {
                return DecodeOutcome::Unreadable(format!(
                    "series {key}: {} is not readable as DICOM ({err})",
                    original_name(stage, staged)
                ))
            }
        };
        if attribute_text(&object, tags::SERIES_INSTANCE_UID).as_deref()
            != Some(key.series_uid.as_str())
        {
            log::debug!(
                "series {key}: {} belongs to another series, skipped",
                original_name(stage, staged)
            );
            continue;
        }
        slices.push(Slice {
            staged: staged.clone(),
            staging_index,
            geometry: SliceGeometry::read(&object),
            instance_number: attribute_text(&object, tags::INSTANCE_NUMBER)
                .and_then(|text| text.parse().ok()),
            object,
        });
    }
    if slices.is_empty() {
        return DecodeOutcome::Unreadable(format!("series {key}: no readable slices"));
    }

    let normal = slices[0].geometry.normal();
    let along = |slice: &Slice| {
        slice
            .geometry
            .position
            .map(|p| p[0] * normal[0] + p[1] * normal[1] + p[2] * normal[2])
    };
    let placement = |slice: &Slice| SlicePlacement {
        along_normal: along(slice),
        instance_number: slice.instance_number,
        staging_index: slice.staging_index,
    };
    slices.sort_by(|a, b| placement(a).order(&placement(b)));

    let positions: Vec<f64> = slices.iter().filter_map(|slice| along(slice)).collect();
    if positions.len() == slices.len() {
        check_slice_positions(key, &positions);
    }

    let mut parts: Vec<Samples> = Vec::with_capacity(slices.len());
    let mut frames = 0;
    let mut template: Option<Volume> = None;
    for slice in &slices {
        let mut volume = match FrameImagePipeline::decode_volume(&slice.object) {
            Ok(volume) => volume,
            Err(PipelineError::Unsupported(reason)) => {
                return DecodeOutcome::Unreadable(format!(
                    "series {key}: {} ({reason})",
                    original_name(stage, &slice.staged)
                ))
            }
            Err(PipelineError::Inconsistent(reason)) => {
                return DecodeOutcome::Faulted(format!(
                    "series {key}: {} ({reason})",
                    original_name(stage, &slice.staged)
                ))
            }
        };
        if let (Some(reference), Some(reference_samples)) = (&template, parts.first()) {
            if reference.size[..2] != volume.size[..2]
                || reference.components != volume.components
                || reference_samples.pixel_type() != volume.pixel_type()
            {
                return DecodeOutcome::Unreadable(format!(
                    "series {key}: {} does not match the first slice ({:?} {} vs {:?} {})",
                    original_name(stage, &slice.staged),
                    volume.size,
                    volume.pixel_type().describe(),
                    reference.size,
                    reference_samples.pixel_type().describe(),
                ));
            }
        }
        frames += volume.size[2];
        parts.push(std::mem::replace(&mut volume.samples, Samples::U8(Vec::new())));
        if template.is_none() {
            template = Some(volume);
        }
    }

    let Some(mut volume) = template else {
        return DecodeOutcome::Unreadable(format!("series {key}: no readable slices"));
    };
    volume.samples = match Samples::concat(parts) {
        Some(samples) => samples,
        None => {
            return DecodeOutcome::Faulted(format!("series {key}: mixed sample buffers"))
        }
    };
    volume.size[2] = frames;
    if positions.len() >= 2 && positions.len() == slices.len() {
        let gap = (positions[1] - positions[0]).abs();
        if gap > POSITION_EPSILON {
            volume.spacing[2] = gap;
        }
    }
    if !volume.is_consistent() {
        return DecodeOutcome::Faulted(format!(
            "series {key}: assembled buffer does not match {:?}",
            volume.size
        ));
    }

    let files = slices
        .iter()
        .map(|slice| {
            stage
                .original_of(&slice.staged)
                .map(Path::to_path_buf)
                .unwrap_or_else(|| slice.staged.clone())
        })
        .collect();
    DecodeOutcome::Decoded(DecodedImage {
        volume,
        files,
        tags: collect_tags(&slices[0].object),
    })
}

fn original_name(stage: &ScratchStage, staged: &Path) -> String {
    stage
        .original_of(staged)
        .unwrap_or(staged)
        .display()
        .to_string()
}

/// Warns about duplicated or unevenly spaced slices. The series still decodes.
fn check_slice_positions(key: &SeriesKey, sorted: &[f64]) {
    let gaps: Vec<f64> = sorted.windows(2).map(|pair| pair[1] - pair[0]).collect();
    let Some(&reference) = gaps.first() else {
        return;
    };
    if gaps.iter().any(|gap| gap.abs() < POSITION_EPSILON) {
        log::warn!(
            "series {key}: several slices share one position; discriminator tags may be \
             insufficient to separate acquisitions"
        );
        return;
    }
    let tolerance = SPACING_TOLERANCE * reference.abs().max(1.0);
    if gaps.iter().any(|gap| (gap - reference).abs() > tolerance) {
        log::warn!("series {key}: slices are not uniformly spaced, z spacing is approximate");
    }
}

/// Renders the discriminator list for the run log.
pub fn describe_discriminators(discriminators: &[Tag]) -> String {
    discriminators
        .iter()
        .map(|tag| format_tag(*tag))
        .collect::<Vec<_>>()
        .join(" ")
}
