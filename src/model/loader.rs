use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use dicom::core::header::Header;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject, OpenFileOptions};
use image::{DynamicImage, ImageFormat, ImageReader};

use crate::image_pipeline::{FrameImagePipeline, PipelineError};
use crate::model::volume::{Samples, Volume};
use crate::utils::{format_tag, value_to_string};

/// Which reader an item is decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Decoder {
    /// DICOM first, then raster formats detected from content.
    #[default]
    All,
    Dicom,
    Raster(ImageFormat),
}

impl FromStr for Decoder {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_ascii_lowercase().as_str() {
            "all" | "" => Ok(Decoder::All),
            "dicom" | "dcm" => Ok(Decoder::Dicom),
            other => ImageFormat::from_extension(other)
                .map(Decoder::Raster)
                .ok_or_else(|| format!("unknown decoder `{name}`")),
        }
    }
}

impl fmt::Display for Decoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoder::All => f.write_str("all"),
            Decoder::Dicom => f.write_str("dicom"),
            Decoder::Raster(format) => {
                let name = format.extensions_str().first().copied().unwrap_or("raster");
                f.write_str(name)
            }
        }
    }
}

/// A decoded item before characterization.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub volume: Volume,
    /// Source files in the order the decoder placed them.
    pub files: Vec<PathBuf>,
    /// `gggg|eeee` keys (lower case) to element text.
    pub tags: BTreeMap<String, String>,
}

impl DecodedImage {
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(&key.to_ascii_lowercase()).map(String::as_str)
    }
}

/// Result of one decode attempt. Only `Faulted` signals a defect worth an
/// error log; `Unreadable` is the expected fate of non-image files.
#[derive(Debug)]
pub enum DecodeOutcome {
    Decoded(DecodedImage),
    Unreadable(String),
    Faulted(String),
}

pub fn decode_file(path: &Path, decoder: Decoder) -> DecodeOutcome {
    if let Err(err) = File::open(path) {
        return DecodeOutcome::Faulted(format!("{}: cannot open file ({err})", path.display()));
    }

    match decoder {
        Decoder::Dicom => decode_dicom(path),
        Decoder::Raster(format) => decode_raster(path, Some(format)),
        Decoder::All => match decode_dicom(path) {
            DecodeOutcome::Unreadable(dicom_reason) => match decode_raster(path, None) {
                DecodeOutcome::Unreadable(raster_reason) => {
                    DecodeOutcome::Unreadable(format!("{dicom_reason}; {raster_reason}"))
                }
                other => other,
            },
            other => other,
        },
    }
}

pub fn decode_dicom(path: &Path) -> DecodeOutcome {
    let object = match open_file(path) {
        Ok(object) => object,
        Err(err) => {
            return DecodeOutcome::Unreadable(format!("not a readable DICOM file ({err})"))
        }
    };
    match FrameImagePipeline::decode_volume(&object) {
        Ok(volume) => DecodeOutcome::Decoded(DecodedImage {
            volume,
            files: vec![path.to_path_buf()],
            tags: collect_tags(&object),
        }),
        Err(PipelineError::Unsupported(reason)) => DecodeOutcome::Unreadable(reason),
        Err(PipelineError::Inconsistent(reason)) => DecodeOutcome::Faulted(reason),
    }
}

/// Reads the DICOM meta group and dataset up to, not including, pixel data.
pub fn read_dicom_header(path: &Path) -> Result<DefaultDicomObject, String> {
    OpenFileOptions::new()
        .read_until(tags::PIXEL_DATA)
        .open_file(path)
        .map_err(|err| format!("{}: failed to read DICOM header ({err})", path.display()))
}

pub fn collect_tags(object: &DefaultDicomObject) -> BTreeMap<String, String> {
    let mut collected = BTreeMap::new();
    for element in object.iter() {
        let tag = element.tag();
        if tag == tags::PIXEL_DATA {
            continue;
        }
        if let Some(value) = value_to_string(element.value(), element.vr()) {
            collected.insert(format_tag(tag), value);
        }
    }
    collected
}

fn decode_raster(path: &Path, format: Option<ImageFormat>) -> DecodeOutcome {
    let reader = match ImageReader::open(path) {
        Ok(reader) => reader,
        Err(err) => return DecodeOutcome::Faulted(format!("{}: {err}", path.display())),
    };
    let reader = match format {
        Some(format) => {
            let mut reader = reader;
            reader.set_format(format);
            reader
        }
        None => match reader.with_guessed_format() {
            Ok(reader) if reader.format().is_some() => reader,
            Ok(_) => return DecodeOutcome::Unreadable("unrecognized raster format".to_string()),
            Err(err) => return DecodeOutcome::Faulted(format!("{}: {err}", path.display())),
        },
    };

    match reader.decode() {
        Ok(image) => DecodeOutcome::Decoded(DecodedImage {
            volume: raster_to_volume(image),
            files: vec![path.to_path_buf()],
            tags: BTreeMap::new(),
        }),
        Err(image::ImageError::IoError(err)) => {
            DecodeOutcome::Faulted(format!("{}: {err}", path.display()))
        }
        Err(err) => DecodeOutcome::Unreadable(format!("not a readable raster image ({err})")),
    }
}

pub fn raster_to_volume(image: DynamicImage) -> Volume {
    let size = vec![image.width() as usize, image.height() as usize];
    let (components, samples) = match image {
        DynamicImage::ImageLuma8(buffer) => (1, Samples::U8(buffer.into_raw())),
        DynamicImage::ImageLumaA8(buffer) => (2, Samples::U8(buffer.into_raw())),
        DynamicImage::ImageRgb8(buffer) => (3, Samples::U8(buffer.into_raw())),
        DynamicImage::ImageRgba8(buffer) => (4, Samples::U8(buffer.into_raw())),
        DynamicImage::ImageLuma16(buffer) => (1, Samples::U16(buffer.into_raw())),
        DynamicImage::ImageLumaA16(buffer) => (2, Samples::U16(buffer.into_raw())),
        DynamicImage::ImageRgb16(buffer) => (3, Samples::U16(buffer.into_raw())),
        DynamicImage::ImageRgba16(buffer) => (4, Samples::U16(buffer.into_raw())),
        DynamicImage::ImageRgb32F(buffer) => (3, Samples::F32(buffer.into_raw())),
        DynamicImage::ImageRgba32F(buffer) => (4, Samples::F32(buffer.into_raw())),
        other => (4, Samples::F32(other.into_rgba32f().into_raw())),
    };
    Volume::new(size, components, samples)
}
