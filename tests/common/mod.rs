#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::dictionary_std::{tags, uids};
use dicom::object::{FileMetaTableBuilder, InMemDicomObject};
use image::{GrayImage, Luma};

use imagesurvey::{AnalysisType, Settings, SurveyConfig};

/// One CT slice with 16-bit unsigned samples.
pub struct Slice<'a> {
    pub study_uid: &'a str,
    pub series_uid: &'a str,
    pub instance: u32,
    pub rows: u16,
    pub columns: u16,
    pub z: f64,
    /// Whether ImagePositionPatient is written at all.
    pub positioned: bool,
    pub fill: u16,
}

impl Default for Slice<'_> {
    fn default() -> Self {
        Self {
            study_uid: "1.2.826.0.1.3680043.2.1125.1",
            series_uid: "1.2.826.0.1.3680043.2.1125.1.1",
            instance: 1,
            rows: 4,
            columns: 4,
            z: 0.0,
            positioned: true,
            fill: 100,
        }
    }
}

fn text(tag: dicom::core::Tag, vr: VR, value: &str) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, vr, PrimitiveValue::from(value))
}

fn short(tag: dicom::core::Tag, value: u16) -> DataElement<InMemDicomObject> {
    DataElement::new(tag, VR::US, PrimitiveValue::from(value))
}

pub fn write_slice(path: &Path, slice: &Slice<'_>) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create slice directory");
    }
    let sop_instance_uid = format!("{}.{}", slice.series_uid, slice.instance);
    let pixel_count = slice.rows as usize * slice.columns as usize;
    let pixels: Vec<u16> = (0..pixel_count)
        .map(|index| slice.fill + index as u16)
        .collect();

    let mut object = InMemDicomObject::new_empty();
    object.put(text(tags::SOP_CLASS_UID, VR::UI, uids::CT_IMAGE_STORAGE));
    object.put(text(tags::SOP_INSTANCE_UID, VR::UI, &sop_instance_uid));
    object.put(text(tags::MODALITY, VR::CS, "CT"));
    object.put(text(tags::PATIENT_NAME, VR::PN, "Phantom^Water"));
    object.put(text(tags::STUDY_INSTANCE_UID, VR::UI, slice.study_uid));
    object.put(text(tags::SERIES_INSTANCE_UID, VR::UI, slice.series_uid));
    object.put(text(tags::SERIES_NUMBER, VR::IS, "3"));
    object.put(text(tags::INSTANCE_NUMBER, VR::IS, &slice.instance.to_string()));
    if slice.positioned {
        object.put(text(
            tags::IMAGE_POSITION_PATIENT,
            VR::DS,
            &format!("0\\0\\{}", slice.z),
        ));
    }
    object.put(text(tags::IMAGE_ORIENTATION_PATIENT, VR::DS, "1\\0\\0\\0\\1\\0"));
    object.put(text(tags::PIXEL_SPACING, VR::DS, "0.5\\0.5"));
    object.put(text(tags::SLICE_THICKNESS, VR::DS, "1"));
    object.put(short(tags::SAMPLES_PER_PIXEL, 1));
    object.put(text(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, "MONOCHROME2"));
    object.put(short(tags::ROWS, slice.rows));
    object.put(short(tags::COLUMNS, slice.columns));
    object.put(short(tags::BITS_ALLOCATED, 16));
    object.put(short(tags::BITS_STORED, 16));
    object.put(short(tags::HIGH_BIT, 15));
    object.put(short(tags::PIXEL_REPRESENTATION, 0));
    object.put(DataElement::new(
        tags::PIXEL_DATA,
        VR::OW,
        PrimitiveValue::U16(pixels.into()),
    ));

    let file = object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::CT_IMAGE_STORAGE)
                .media_storage_sop_instance_uid(sop_instance_uid.as_str()),
        )
        .expect("file meta");
    file.write_to_file(path).expect("write DICOM file");
}

/// An 8-bit gradient PNG; `seed` shifts every value.
pub fn write_png(path: &Path, width: u32, height: u32, seed: u8) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create image directory");
    }
    GrayImage::from_fn(width, height, |x, y| {
        Luma([(x * 7 + y * 13) as u8 ^ seed])
    })
    .save(path)
    .expect("write PNG");
}

pub fn quiet_settings() -> Settings {
    Settings {
        disable_progress: true,
        max_processes: 2,
        ..Settings::default()
    }
}

pub fn config(
    root: &Path,
    output: &Path,
    analysis_type: AnalysisType,
    settings: Settings,
) -> SurveyConfig {
    SurveyConfig::new(root, output, analysis_type, settings).expect("valid configuration")
}

/// Header and records of a CSV file.
pub fn read_csv(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::Reader::from_path(path).expect("open CSV");
    let header = reader
        .headers()
        .expect("header")
        .iter()
        .map(str::to_string)
        .collect();
    let records = reader
        .records()
        .map(|record| {
            record
                .expect("record")
                .iter()
                .map(str::to_string)
                .collect()
        })
        .collect();
    (header, records)
}

pub fn column(header: &[String], name: &str) -> usize {
    header
        .iter()
        .position(|heading| heading == name)
        .unwrap_or_else(|| panic!("no column {name}"))
}

pub fn files_cell(cell: &str) -> Vec<PathBuf> {
    serde_json::from_str::<Vec<String>>(cell)
        .expect("files cell is a JSON array")
        .into_iter()
        .map(PathBuf::from)
        .collect()
}
