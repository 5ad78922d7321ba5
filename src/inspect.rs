//! Turns one file or one assembled series into a report [`Item`].

use std::path::{Path, PathBuf};

use crate::model::loader::decode_file;
use crate::model::{DecodeOutcome, DecodedImage, Decoder, IntensityStats, Item, SeriesKey};
use crate::series::read_series;
use crate::thumbnail::{self, ThumbnailSettings};
use crate::validators::ValidatorSet;

/// What to extract from every item besides the fixed columns.
#[derive(Debug, Clone)]
pub struct InspectOptions {
    pub decoder: Decoder,
    /// Lower-case `gggg|eeee` tag key paired with its output heading.
    pub metadata: Vec<(String, String)>,
    pub validators: ValidatorSet,
    pub thumbnail: Option<ThumbnailSettings>,
}

pub fn inspect_file(path: &Path, options: &InspectOptions) -> Item {
    let key = path.display().to_string();
    let outcome = decode_file(path, options.decoder);
    complete(key, vec![path.to_path_buf()], outcome, options)
}

pub fn inspect_series(key: &SeriesKey, files: &[PathBuf], options: &InspectOptions) -> Item {
    let outcome = read_series(key, files);
    complete(key.to_string(), files.to_vec(), outcome, options)
}

fn complete(
    key: String,
    files: Vec<PathBuf>,
    outcome: DecodeOutcome,
    options: &InspectOptions,
) -> Item {
    let image = match outcome {
        DecodeOutcome::Decoded(image) => image,
        DecodeOutcome::Unreadable(reason) => {
            log::debug!("{key}: not decoded ({reason})");
            return Item::unread(key, files);
        }
        DecodeOutcome::Faulted(reason) => {
            log::error!("{key}: decode fault ({reason})");
            return Item::unread(key, files);
        }
    };

    let mut item = Item::unread(key, image.files.clone());
    characterize(&image, &mut item);
    for (tag, heading) in &options.metadata {
        if let Some(value) = image.tag(tag) {
            item.metadata.insert(heading.clone(), value.to_string());
        }
    }
    if !options.validators.is_empty() {
        item.validators = options.validators.run_all(&item.files);
    }
    if let Some(settings) = &options.thumbnail {
        item.thumbnail = thumbnail::generate(&image.volume, settings);
        if item.thumbnail.is_none() {
            log::warn!("{}: no thumbnail for a {}-D image", item.key, image.volume.dimension());
        }
    }
    item
}

/// Fills the geometry, pixel type, fingerprint and, for grayscale data, the
/// intensity statistics.
pub fn characterize(image: &DecodedImage, item: &mut Item) {
    let volume = &image.volume;
    item.size = Some(volume.size.clone());
    item.spacing = Some(volume.spacing.clone());
    item.origin = Some(volume.origin.clone());
    item.direction = Some(volume.direction.clone());

    let described = volume.pixel_type().describe();
    let components = volume.components;
    if components == 1 {
        item.pixel_type = Some(format!("{described} gray"));
        item.fingerprint = Some(volume.samples.fingerprint());
        item.stats = IntensityStats::from_values(&volume.samples.to_f64_vec());
        return;
    }

    if volume.samples.first_three_channels_identical(components) {
        let gray = volume.samples.channel(components, 0);
        item.pixel_type = Some(format!("vector of {described} {components} channels gray"));
        item.fingerprint = Some(gray.fingerprint());
        item.stats = IntensityStats::from_values(&gray.to_f64_vec());
    } else {
        item.pixel_type = Some(format!("vector of {described} {components} channels color"));
        item.fingerprint = Some(volume.samples.fingerprint());
    }
}
