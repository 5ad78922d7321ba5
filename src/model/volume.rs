use sha2::{Digest, Sha256};

/// Native sample type of a decoded raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    F32,
    F64,
}

impl PixelType {
    pub fn describe(self) -> &'static str {
        match self {
            PixelType::U8 => "8-bit unsigned integer",
            PixelType::I8 => "8-bit signed integer",
            PixelType::U16 => "16-bit unsigned integer",
            PixelType::I16 => "16-bit signed integer",
            PixelType::U32 => "32-bit unsigned integer",
            PixelType::I32 => "32-bit signed integer",
            PixelType::F32 => "32-bit float",
            PixelType::F64 => "64-bit float",
        }
    }

    /// Value that maps to 1.0 when normalizing a channel.
    pub fn nominal_max(self) -> f64 {
        match self {
            PixelType::U8 => u8::MAX as f64,
            PixelType::I8 => i8::MAX as f64,
            PixelType::U16 => u16::MAX as f64,
            PixelType::I16 => i16::MAX as f64,
            PixelType::U32 => u32::MAX as f64,
            PixelType::I32 => i32::MAX as f64,
            PixelType::F32 | PixelType::F64 => 1.0,
        }
    }
}

/// Flat sample buffer, components interleaved per pixel, x fastest.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    U8(Vec<u8>),
    I8(Vec<i8>),
    U16(Vec<u16>),
    I16(Vec<i16>),
    U32(Vec<u32>),
    I32(Vec<i32>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_samples {
    ($value:expr, $values:ident => $body:expr) => {
        match $value {
            Samples::U8($values) => $body,
            Samples::I8($values) => $body,
            Samples::U16($values) => $body,
            Samples::I16($values) => $body,
            Samples::U32($values) => $body,
            Samples::I32($values) => $body,
            Samples::F32($values) => $body,
            Samples::F64($values) => $body,
        }
    };
}

macro_rules! map_samples {
    ($value:expr, $values:ident => $body:expr) => {
        match $value {
            Samples::U8($values) => Samples::U8($body),
            Samples::I8($values) => Samples::I8($body),
            Samples::U16($values) => Samples::U16($body),
            Samples::I16($values) => Samples::I16($body),
            Samples::U32($values) => Samples::U32($body),
            Samples::I32($values) => Samples::I32($body),
            Samples::F32($values) => Samples::F32($body),
            Samples::F64($values) => Samples::F64($body),
        }
    };
}

const HASH_CHUNK: usize = 64 * 1024;

impl Samples {
    pub fn len(&self) -> usize {
        each_samples!(self, values => values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pixel_type(&self) -> PixelType {
        match self {
            Samples::U8(_) => PixelType::U8,
            Samples::I8(_) => PixelType::I8,
            Samples::U16(_) => PixelType::U16,
            Samples::I16(_) => PixelType::I16,
            Samples::U32(_) => PixelType::U32,
            Samples::I32(_) => PixelType::I32,
            Samples::F32(_) => PixelType::F32,
            Samples::F64(_) => PixelType::F64,
        }
    }

    pub fn value(&self, index: usize) -> f64 {
        each_samples!(self, values => values[index] as f64)
    }

    pub fn to_f64_vec(&self) -> Vec<f64> {
        each_samples!(self, values => values.iter().map(|&v| v as f64).collect())
    }

    /// Copies channel `channel` out of an interleaved buffer.
    pub fn channel(&self, components: usize, channel: usize) -> Samples {
        map_samples!(self, values => values
            .iter()
            .skip(channel)
            .step_by(components.max(1))
            .copied()
            .collect())
    }

    /// Reorders colour-by-plane frames (`RRR..GGG..BBB..`) into interleaved pixels.
    pub fn interleave_planes(&self, pixel_count: usize, components: usize) -> Samples {
        map_samples!(self, values => {
            let frame_len = pixel_count * components;
            let mut interleaved = Vec::with_capacity(values.len());
            for frame in values.chunks(frame_len) {
                for idx in 0..frame.len() / components {
                    for channel in 0..components {
                        interleaved.push(frame[channel * pixel_count + idx]);
                    }
                }
            }
            interleaved
        })
    }

    /// Keeps the first `len` samples.
    pub fn truncated(mut self, len: usize) -> Samples {
        each_samples!(&mut self, values => values.truncate(len));
        self
    }

    /// Bit-exact comparison of the first three interleaved channels.
    pub fn first_three_channels_identical(&self, components: usize) -> bool {
        if components < 3 {
            return false;
        }
        match self {
            Samples::F32(values) => values.chunks_exact(components).all(|px| {
                px[0].to_bits() == px[1].to_bits() && px[0].to_bits() == px[2].to_bits()
            }),
            Samples::F64(values) => values.chunks_exact(components).all(|px| {
                px[0].to_bits() == px[1].to_bits() && px[0].to_bits() == px[2].to_bits()
            }),
            Samples::U8(values) => identical_channels(values, components),
            Samples::I8(values) => identical_channels(values, components),
            Samples::U16(values) => identical_channels(values, components),
            Samples::I16(values) => identical_channels(values, components),
            Samples::U32(values) => identical_channels(values, components),
            Samples::I32(values) => identical_channels(values, components),
        }
    }

    /// Hex SHA-256 over the little-endian bytes of every sample.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Samples::U8(values) => hasher.update(values),
            Samples::I8(values) => feed(&mut hasher, values, |v| v.to_le_bytes()),
            Samples::U16(values) => feed(&mut hasher, values, |v| v.to_le_bytes()),
            Samples::I16(values) => feed(&mut hasher, values, |v| v.to_le_bytes()),
            Samples::U32(values) => feed(&mut hasher, values, |v| v.to_le_bytes()),
            Samples::I32(values) => feed(&mut hasher, values, |v| v.to_le_bytes()),
            Samples::F32(values) => feed(&mut hasher, values, |v| v.to_le_bytes()),
            Samples::F64(values) => feed(&mut hasher, values, |v| v.to_le_bytes()),
        }
        format!("{:x}", hasher.finalize())
    }

    /// Joins buffers of one pixel type end to end; `None` when types differ.
    pub fn concat(parts: Vec<Samples>) -> Option<Samples> {
        let mut parts = parts.into_iter();
        let mut joined = parts.next()?;
        for part in parts {
            match (&mut joined, part) {
                (Samples::U8(acc), Samples::U8(more)) => acc.extend(more),
                (Samples::I8(acc), Samples::I8(more)) => acc.extend(more),
                (Samples::U16(acc), Samples::U16(more)) => acc.extend(more),
                (Samples::I16(acc), Samples::I16(more)) => acc.extend(more),
                (Samples::U32(acc), Samples::U32(more)) => acc.extend(more),
                (Samples::I32(acc), Samples::I32(more)) => acc.extend(more),
                (Samples::F32(acc), Samples::F32(more)) => acc.extend(more),
                (Samples::F64(acc), Samples::F64(more)) => acc.extend(more),
                _ => return None,
            }
        }
        Some(joined)
    }
}

fn identical_channels<T: PartialEq>(values: &[T], components: usize) -> bool {
    values
        .chunks_exact(components)
        .all(|px| px[0] == px[1] && px[0] == px[2])
}

fn feed<T, F, const N: usize>(hasher: &mut Sha256, values: &[T], to_bytes: F)
where
    T: Copy,
    F: Fn(T) -> [u8; N],
{
    let mut buffer = Vec::with_capacity(HASH_CHUNK);
    for chunk in values.chunks(HASH_CHUNK / N) {
        buffer.clear();
        for &value in chunk {
            buffer.extend_from_slice(&to_bytes(value));
        }
        hasher.update(&buffer);
    }
}

/// A decoded 2-D or 3-D raster together with its physical geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// Pixel extent per axis (x, y[, z]).
    pub size: Vec<usize>,
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    /// Row-major `dim x dim` matrix whose columns are the axis directions.
    pub direction: Vec<f64>,
    pub components: usize,
    pub samples: Samples,
}

impl Volume {
    /// A volume with unit spacing, zero origin and identity direction.
    pub fn new(size: Vec<usize>, components: usize, samples: Samples) -> Self {
        let dim = size.len();
        Self {
            spacing: vec![1.0; dim],
            origin: vec![0.0; dim],
            direction: identity(dim),
            size,
            components,
            samples,
        }
    }

    pub fn dimension(&self) -> usize {
        self.size.len()
    }

    pub fn pixel_count(&self) -> usize {
        self.size.iter().product()
    }

    pub fn pixel_type(&self) -> PixelType {
        self.samples.pixel_type()
    }

    /// Whether the buffer holds exactly `pixel_count * components` samples.
    pub fn is_consistent(&self) -> bool {
        self.samples.len() == self.pixel_count() * self.components
            && self.spacing.len() == self.dimension()
            && self.origin.len() == self.dimension()
            && self.direction.len() == self.dimension() * self.dimension()
    }
}

pub fn identity(dim: usize) -> Vec<f64> {
    let mut matrix = vec![0.0; dim * dim];
    for axis in 0..dim {
        matrix[axis * dim + axis] = 1.0;
    }
    matrix
}
