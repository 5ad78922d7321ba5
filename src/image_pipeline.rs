use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::DefaultDicomObject;
use dicom::pixeldata::{DecodedPixelData, PixelDecoder, PlanarConfiguration};

use crate::model::volume::{Samples, Volume};

/// Why a DICOM object could not be turned into a volume.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The data is valid DICOM this pipeline cannot interpret.
    Unsupported(String),
    /// The decoder returned data contradicting its own header.
    Inconsistent(String),
}

/// Physical placement of one DICOM image plane.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceGeometry {
    /// Column step then row step, in mm.
    pub in_plane_spacing: [f64; 2],
    pub slice_spacing: f64,
    pub position: Option<[f64; 3]>,
    pub row_direction: [f64; 3],
    pub column_direction: [f64; 3],
}

impl SliceGeometry {
    pub fn read(object: &DefaultDicomObject) -> Self {
        let in_plane_spacing = attribute_floats(object, tags::PIXEL_SPACING)
            .or_else(|| attribute_floats(object, tags::IMAGER_PIXEL_SPACING))
            .filter(|values| values.len() >= 2 && values[0] > 0.0 && values[1] > 0.0)
            // stored as row spacing (y) then column spacing (x)
            .map(|values| [values[1], values[0]])
            .unwrap_or([1.0, 1.0]);
        let slice_spacing = attribute_floats(object, tags::SPACING_BETWEEN_SLICES)
            .or_else(|| attribute_floats(object, tags::SLICE_THICKNESS))
            .and_then(|values| values.first().copied())
            .filter(|value| *value > 0.0)
            .unwrap_or(1.0);
        let position = attribute_floats(object, tags::IMAGE_POSITION_PATIENT)
            .filter(|values| values.len() >= 3)
            .map(|values| [values[0], values[1], values[2]]);
        let (row_direction, column_direction) =
            attribute_floats(object, tags::IMAGE_ORIENTATION_PATIENT)
                .filter(|values| values.len() >= 6)
                .map(|values| {
                    (
                        [values[0], values[1], values[2]],
                        [values[3], values[4], values[5]],
                    )
                })
                .unwrap_or(([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]));

        Self {
            in_plane_spacing,
            slice_spacing,
            position,
            row_direction,
            column_direction,
        }
    }

    pub fn normal(&self) -> [f64; 3] {
        let [r0, r1, r2] = self.row_direction;
        let [c0, c1, c2] = self.column_direction;
        [r1 * c2 - r2 * c1, r2 * c0 - r0 * c2, r0 * c1 - r1 * c0]
    }

    /// Signed distance of the slice origin along the normal.
    pub fn distance_along_normal(&self) -> Option<f64> {
        let position = self.position?;
        let normal = self.normal();
        Some((0..3).map(|axis| position[axis] * normal[axis]).sum())
    }

    pub fn apply(&self, volume: &mut Volume) {
        let normal = self.normal();
        volume.spacing = vec![
            self.in_plane_spacing[0],
            self.in_plane_spacing[1],
            self.slice_spacing,
        ];
        volume.origin = self.position.map(Vec::from).unwrap_or_else(|| vec![0.0; 3]);
        volume.direction = (0..3)
            .flat_map(|axis| {
                [
                    self.row_direction[axis],
                    self.column_direction[axis],
                    normal[axis],
                ]
            })
            .collect();
    }
}

pub struct FrameImagePipeline;

impl FrameImagePipeline {
    /// Decodes every frame of `object` into a `[columns, rows, frames]` volume.
    pub fn decode_volume(object: &DefaultDicomObject) -> Result<Volume, PipelineError> {
        let decoded = object.decode_pixel_data().map_err(|err| {
            PipelineError::Unsupported(format!("Failed to decode pixel data: {err}"))
        })?;

        let columns = decoded.columns() as usize;
        let rows = decoded.rows() as usize;
        let frames = decoded.number_of_frames() as usize;
        let components = decoded.samples_per_pixel() as usize;
        if columns == 0 || rows == 0 || frames == 0 || components == 0 {
            return Err(PipelineError::Unsupported(format!(
                "Empty pixel data ({columns}x{rows}, {frames} frame(s), {components} sample(s) per pixel)"
            )));
        }

        let pixel_count = columns * rows;
        let expected = pixel_count * frames * components;
        let signed = attribute_text(object, tags::PIXEL_REPRESENTATION).as_deref() == Some("1");
        let samples = Self::native_samples(&decoded, signed)?;
        if samples.len() < expected {
            return Err(PipelineError::Inconsistent(format!(
                "Pixel buffer holds {} samples, header promises {expected}",
                samples.len()
            )));
        }
        // odd-length pixel data carries a trailing pad byte
        let mut samples = samples.truncated(expected);

        if components > 1
            && matches!(decoded.planar_configuration(), PlanarConfiguration::PixelFirst)
        {
            samples = samples.interleave_planes(pixel_count, components);
        }
        if components == 1 {
            samples = apply_modality_rescale(object, samples);
        }

        let mut volume = Volume::new(vec![columns, rows, frames], components, samples);
        SliceGeometry::read(object).apply(&mut volume);
        Ok(volume)
    }

    fn native_samples(
        decoded: &DecodedPixelData<'_>,
        signed: bool,
    ) -> Result<Samples, PipelineError> {
        let bytes = decoded.data();
        let samples = match (decoded.bits_allocated(), signed) {
            (8, false) => Samples::U8(bytes.to_vec()),
            (8, true) => Samples::I8(bytes.iter().map(|&byte| byte as i8).collect()),
            (16, false) => Samples::U16(
                bytes
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect(),
            ),
            (16, true) => Samples::I16(
                bytes
                    .chunks_exact(2)
                    .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                    .collect(),
            ),
            (32, false) => Samples::U32(
                bytes
                    .chunks_exact(4)
                    .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
                    .collect(),
            ),
            (32, true) => Samples::I32(
                bytes
                    .chunks_exact(4)
                    .map(|quad| i32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
                    .collect(),
            ),
            (bits, _) => {
                return Err(PipelineError::Unsupported(format!(
                    "{bits}-bit samples are not supported"
                )))
            }
        };
        Ok(samples)
    }
}

/// Applies RescaleSlope/RescaleIntercept, keeping an integer type when the
/// transform is integral.
fn apply_modality_rescale(object: &DefaultDicomObject, samples: Samples) -> Samples {
    let first = |tag: Tag| attribute_floats(object, tag).and_then(|values| values.first().copied());
    let slope = first(tags::RESCALE_SLOPE).unwrap_or(1.0);
    let intercept = first(tags::RESCALE_INTERCEPT).unwrap_or(0.0);
    rescale(samples, slope, intercept)
}

fn rescale(samples: Samples, slope: f64, intercept: f64) -> Samples {
    if slope == 1.0 && intercept == 0.0 {
        return samples;
    }
    let values = samples.to_f64_vec();
    if slope.fract() != 0.0 || intercept.fract() != 0.0 {
        return Samples::F64(values.iter().map(|v| v * slope + intercept).collect());
    }

    let (slope_int, intercept_int) = (slope as i64, intercept as i64);
    let scaled: Option<Vec<i64>> = values
        .iter()
        .map(|v| {
            (*v as i64)
                .checked_mul(slope_int)
                .and_then(|product| product.checked_add(intercept_int))
        })
        .collect();
    let Some(scaled) = scaled else {
        return Samples::F64(values.iter().map(|v| v * slope + intercept).collect());
    };
    let fits = |min: i64, max: i64| scaled.iter().all(|v| (min..=max).contains(v));
    if fits(i16::MIN as i64, i16::MAX as i64) {
        Samples::I16(scaled.iter().map(|&v| v as i16).collect())
    } else if fits(i32::MIN as i64, i32::MAX as i64) {
        Samples::I32(scaled.iter().map(|&v| v as i32).collect())
    } else {
        Samples::F64(scaled.iter().map(|&v| v as f64).collect())
    }
}

pub fn attribute_text(object: &DefaultDicomObject, tag: Tag) -> Option<String> {
    object
        .element(tag)
        .ok()
        .and_then(|element| element.to_str().ok())
        .map(|value| value.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
        .filter(|value| !value.is_empty())
}

pub fn attribute_floats(object: &DefaultDicomObject, tag: Tag) -> Option<Vec<f64>> {
    let text = attribute_text(object, tag)?;
    text.split('\\')
        .map(|part| part.trim().parse::<f64>().ok())
        .collect::<Option<Vec<_>>>()
        .filter(|values| !values.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_rescale_stays_integer() {
        let ct = rescale(Samples::U16(vec![0, 1024, 2048]), 1.0, -1024.0);
        assert_eq!(ct, Samples::I16(vec![-1024, 0, 1024]));

        let wide = rescale(Samples::U16(vec![0, 60000]), 2.0, 0.0);
        assert_eq!(wide, Samples::I32(vec![0, 120000]));

        let fractional = rescale(Samples::U8(vec![0, 4]), 0.5, 0.25);
        assert_eq!(fractional, Samples::F64(vec![0.25, 2.25]));

        let untouched = rescale(Samples::U8(vec![3]), 1.0, 0.0);
        assert_eq!(untouched, Samples::U8(vec![3]));
    }

    #[test]
    fn overflowing_integral_rescale_falls_back_to_float() {
        let slope = (1u64 << 40) as f64;
        let huge = rescale(Samples::U32(vec![1, u32::MAX]), slope, 7.0);
        assert_eq!(
            huge,
            Samples::F64(vec![slope + 7.0, u32::MAX as f64 * slope + 7.0])
        );
    }

    #[test]
    fn axial_normal_points_along_z() {
        let geometry = SliceGeometry {
            in_plane_spacing: [0.5, 0.5],
            slice_spacing: 2.0,
            position: Some([-10.0, -10.0, 42.0]),
            row_direction: [1.0, 0.0, 0.0],
            column_direction: [0.0, 1.0, 0.0],
        };
        assert_eq!(geometry.normal(), [0.0, 0.0, 1.0]);
        assert_eq!(geometry.distance_along_normal(), Some(42.0));

        let mut volume = Volume::new(vec![1, 1, 1], 1, Samples::U8(vec![0]));
        geometry.apply(&mut volume);
        assert_eq!(volume.spacing, vec![0.5, 0.5, 2.0]);
        assert_eq!(volume.origin, vec![-10.0, -10.0, 42.0]);
        assert_eq!(
            volume.direction,
            vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]
        );
    }
}
