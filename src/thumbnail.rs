//! Reduction of a decoded image to a fixed-size 8-bit grayscale thumbnail.
//!
//! The stages run in a fixed order: projection to 2-D, channel reduction,
//! intensity windowing, and an aspect-preserving resample onto the requested
//! grid. Every stage is plain `f64` arithmetic, so identical inputs give
//! byte-identical thumbnails.

use serde::{Deserialize, Serialize};

use crate::model::{PixelType, Volume};

/// Fill value for resample padding, distinct from black and from foreground.
pub const PADDING_VALUE: u8 = 128;

const LUMINANCE: [f64; 3] = [0.2126, 0.7152, 0.0722];

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Interpolator {
    #[default]
    Nearest,
    Linear,
    Bspline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailSettings {
    /// Width then height in pixels.
    pub size: [usize; 2],
    /// Axis of a 3-D volume collapsed by maximum intensity projection.
    pub projection_axis: usize,
    pub interpolator: Interpolator,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            size: [64, 64],
            projection_axis: 2,
            interpolator: Interpolator::Nearest,
        }
    }
}

/// Row-major single-channel 8-bit raster, unit spacing, zero origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Thumbnail {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
}

impl Thumbnail {
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![value; width * height],
        }
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.pixels[y * self.width + x]
    }
}

/// Interleaved 2-D intermediate.
#[derive(Debug, Clone)]
struct Plane {
    size: [usize; 2],
    spacing: [f64; 2],
    origin: [f64; 2],
    components: usize,
    pixel_type: PixelType,
    values: Vec<f64>,
}

/// `None` when the volume is empty, not 2-D or 3-D, or the projection axis
/// does not exist.
pub fn generate(volume: &Volume, settings: &ThumbnailSettings) -> Option<Thumbnail> {
    let [width, height] = settings.size;
    if width == 0 || height == 0 || volume.pixel_count() == 0 || !volume.is_consistent() {
        return None;
    }
    let plane = flatten(volume, settings.projection_axis)?;
    let gray = reduce_channels(plane);
    let windowed = window_intensities(gray);
    Some(resample(&windowed, settings.size, settings.interpolator))
}

fn flatten(volume: &Volume, axis: usize) -> Option<Plane> {
    let components = volume.components.max(1);
    let values = volume.samples.to_f64_vec();
    match volume.dimension() {
        2 => Some(Plane {
            size: [volume.size[0], volume.size[1]],
            spacing: [volume.spacing[0], volume.spacing[1]],
            origin: [volume.origin[0], volume.origin[1]],
            components,
            pixel_type: volume.pixel_type(),
            values,
        }),
        3 if axis < 3 => {
            let kept: Vec<usize> = (0..3).filter(|&a| a != axis).collect();
            let (u, v) = (kept[0], kept[1]);
            let size = [volume.size[u], volume.size[v]];
            let strides = [1, volume.size[0], volume.size[0] * volume.size[1]];
            let depth = volume.size[axis];

            // a unit extent squeezes; anything deeper is projected by maximum
            let mut projected = vec![f64::NEG_INFINITY; size[0] * size[1] * components];
            for j in 0..size[1] {
                for i in 0..size[0] {
                    let out = (j * size[0] + i) * components;
                    for k in 0..depth {
                        let voxel = i * strides[u] + j * strides[v] + k * strides[axis];
                        for c in 0..components {
                            let value = values[voxel * components + c];
                            if value > projected[out + c] {
                                projected[out + c] = value;
                            }
                        }
                    }
                }
            }

            Some(Plane {
                size,
                spacing: [volume.spacing[u], volume.spacing[v]],
                origin: [volume.origin[u], volume.origin[v]],
                components,
                pixel_type: volume.pixel_type(),
                values: projected,
            })
        }
        _ => None,
    }
}

fn reduce_channels(plane: Plane) -> Plane {
    match plane.components {
        1 => plane,
        2 => Plane {
            values: plane.values.iter().step_by(2).copied().collect(),
            components: 1,
            ..plane
        },
        components => {
            let scale = plane.pixel_type.nominal_max();
            let luminance: Vec<f64> = plane
                .values
                .chunks_exact(components)
                .map(|px| {
                    let linear: f64 = (0..3)
                        .map(|c| LUMINANCE[c] * (px[c] / scale).clamp(0.0, 1.0))
                        .sum();
                    srgb_encode(linear)
                })
                .collect();
            Plane {
                values: rescale_to_byte_range(&luminance),
                components: 1,
                pixel_type: PixelType::U8,
                ..plane
            }
        }
    }
}

fn srgb_encode(linear: f64) -> f64 {
    if linear <= 0.0031308 {
        12.92 * linear
    } else {
        1.055 * linear.powf(1.0 / 2.4) - 0.055
    }
}

fn rescale_to_byte_range(values: &[f64]) -> Vec<f64> {
    let (lo, hi) = min_max(values);
    values
        .iter()
        .map(|&v| if hi > lo { ((v - lo) / (hi - lo) * 255.0).trunc() } else { 0.0 })
        .collect()
}

fn window_intensities(plane: Plane) -> Plane {
    let (lo, hi) = if plane.pixel_type == PixelType::U8 {
        min_max(&plane.values)
    } else {
        let mut sorted = plane.values.clone();
        sorted.sort_by(f64::total_cmp);
        let [min, q1, q3, max] = [0.0, 25.0, 75.0, 100.0].map(|p| percentile(&sorted, p));
        let iqr = q3 - q1;
        ((q1 - 1.5 * iqr).max(min), (q3 + 1.5 * iqr).min(max))
    };

    let values = plane
        .values
        .iter()
        .map(|&v| {
            if hi > lo {
                ((v - lo) / (hi - lo) * 255.0).clamp(0.0, 255.0).trunc()
            } else {
                0.0
            }
        })
        .collect();
    Plane {
        values,
        pixel_type: PixelType::U8,
        ..plane
    }
}

fn min_max(values: &[f64]) -> (f64, f64) {
    values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Linear interpolation between closest ranks over sorted `values`.
fn percentile(sorted: &[f64], percent: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = percent / 100.0 * (sorted.len() - 1) as f64;
    let below = rank.floor() as usize;
    let above = (below + 1).min(sorted.len() - 1);
    let fraction = rank - below as f64;
    sorted[below] + fraction * (sorted[above] - sorted[below])
}

fn resample(plane: &Plane, target: [usize; 2], interpolator: Interpolator) -> Thumbnail {
    let [w, h] = plane.size;
    let spacing = (0..2)
        .map(|a| plane.size[a] as f64 * plane.spacing[a] / target[a] as f64)
        .fold(0.0, f64::max);
    let origin: [f64; 2] = [0, 1].map(|a| {
        let center = plane.origin[a] + (plane.size[a] as f64 - 1.0) / 2.0 * plane.spacing[a];
        center - (target[a] as f64 - 1.0) / 2.0 * spacing
    });

    let coefficients = match interpolator {
        Interpolator::Bspline => Some(bspline_coefficients(&plane.values, w, h)),
        _ => None,
    };

    let mut pixels = Vec::with_capacity(target[0] * target[1]);
    for j in 0..target[1] {
        for i in 0..target[0] {
            let index: [f64; 2] = [0, 1].map(|a| {
                let step = [i, j][a] as f64;
                (origin[a] + step * spacing - plane.origin[a]) / plane.spacing[a]
            });
            let inside = (0..2)
                .all(|a| index[a] >= -0.5 && index[a] < plane.size[a] as f64 - 0.5);
            if !inside {
                pixels.push(PADDING_VALUE);
                continue;
            }
            let value = match (interpolator, &coefficients) {
                (Interpolator::Nearest, _) => nearest(&plane.values, w, h, index),
                (Interpolator::Linear, _) => bilinear(&plane.values, w, h, index),
                (Interpolator::Bspline, Some(coefficients)) => {
                    bspline(coefficients, w, h, index)
                }
                (Interpolator::Bspline, None) => nearest(&plane.values, w, h, index),
            };
            pixels.push(value.round().clamp(0.0, 255.0) as u8);
        }
    }

    Thumbnail {
        width: target[0],
        height: target[1],
        pixels,
    }
}

fn nearest(values: &[f64], w: usize, h: usize, [x, y]: [f64; 2]) -> f64 {
    let pick = |c: f64, n: usize| ((c + 0.5).floor().max(0.0) as usize).min(n - 1);
    values[pick(y, h) * w + pick(x, w)]
}

fn bilinear(values: &[f64], w: usize, h: usize, [x, y]: [f64; 2]) -> f64 {
    let clamp = |c: isize, n: usize| c.clamp(0, n as isize - 1) as usize;
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as isize, y0 as isize);
    let at = |xi: isize, yi: isize| values[clamp(yi, h) * w + clamp(xi, w)];
    let top = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
    let bottom = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

const BSPLINE_POLE: f64 = -0.267_949_192_431_122_7; // sqrt(3) - 2
const BSPLINE_GAIN: f64 = 6.0;
const BSPLINE_TOLERANCE: f64 = 1e-10;

/// Separable cubic B-spline prefilter over rows then columns.
fn bspline_coefficients(values: &[f64], w: usize, h: usize) -> Vec<f64> {
    let mut coefficients = values.to_vec();
    for row in coefficients.chunks_exact_mut(w) {
        prefilter_line(row);
    }
    let mut column = vec![0.0; h];
    for x in 0..w {
        for y in 0..h {
            column[y] = coefficients[y * w + x];
        }
        prefilter_line(&mut column);
        for y in 0..h {
            coefficients[y * w + x] = column[y];
        }
    }
    coefficients
}

fn prefilter_line(line: &mut [f64]) {
    let n = line.len();
    if n < 2 {
        return;
    }
    let z = BSPLINE_POLE;
    for value in line.iter_mut() {
        *value *= BSPLINE_GAIN;
    }

    line[0] = causal_initial(line, z);
    for k in 1..n {
        line[k] += z * line[k - 1];
    }
    line[n - 1] = (z / (z * z - 1.0)) * (line[n - 1] + z * line[n - 2]);
    for k in (0..n - 1).rev() {
        line[k] = z * (line[k + 1] - line[k]);
    }
}

/// Initial causal coefficient for mirror-symmetric boundaries.
fn causal_initial(line: &[f64], z: f64) -> f64 {
    let n = line.len();
    let horizon = (BSPLINE_TOLERANCE.ln() / z.abs().ln()).ceil() as usize;
    if horizon < n {
        let mut zn = z;
        let mut sum = line[0];
        for &value in &line[1..horizon] {
            sum += zn * value;
            zn *= z;
        }
        return sum;
    }

    let mut zn = z;
    let iz = 1.0 / z;
    let mut z2n = z.powi(n as i32 - 1);
    let mut sum = line[0] + z2n * line[n - 1];
    z2n *= z2n * iz;
    for &value in &line[1..n - 1] {
        sum += (zn + z2n) * value;
        zn *= z;
        z2n *= iz;
    }
    sum / (1.0 - zn * zn)
}

fn mirror(index: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * (n as isize - 1);
    let folded = index.rem_euclid(period);
    if folded >= n as isize {
        (period - folded) as usize
    } else {
        folded as usize
    }
}

fn cubic_weights(t: f64) -> [f64; 4] {
    // taps at floor(x) - 1 ..= floor(x) + 2, t = x - floor(x)
    let s = 1.0 - t;
    [
        s * s * s / 6.0,
        2.0 / 3.0 - t * t + t * t * t / 2.0,
        2.0 / 3.0 - s * s + s * s * s / 2.0,
        t * t * t / 6.0,
    ]
}

fn bspline(coefficients: &[f64], w: usize, h: usize, [x, y]: [f64; 2]) -> f64 {
    let (x0, y0) = (x.floor(), y.floor());
    let wx = cubic_weights(x - x0);
    let wy = cubic_weights(y - y0);
    let (x0, y0) = (x0 as isize - 1, y0 as isize - 1);
    let mut value = 0.0;
    for (dy, weight_y) in wy.iter().enumerate() {
        let yi = mirror(y0 + dy as isize, h);
        for (dx, weight_x) in wx.iter().enumerate() {
            let xi = mirror(x0 + dx as isize, w);
            value += weight_y * weight_x * coefficients[yi * w + xi];
        }
    }
    value
}
