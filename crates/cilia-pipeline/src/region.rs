//! Region preprocessing: crop, red channel, percentile threshold, binarize.
//!
//! The fluorescent label of interest shows up in the red channel, so
//! only that channel of the detector box is kept. The brightest
//! `decay_percent` of its pixels (by percentile) become foreground.
//!
//! This is the first step of a measurement: source raster in, binary
//! mask of the box out.

use image::{GrayImage, Luma};

use crate::types::{BACKGROUND, BoundingBox, Dimensions, FOREGROUND, MeasureError, RgbImage};

/// Index of the red channel in an `RgbImage` pixel.
pub const RED_CHANNEL: usize = 0;

/// Crop the bounding box out of `image` and keep its red channel.
///
/// # Errors
///
/// Returns [`MeasureError::InvalidRegion`] if the box is empty,
/// inverted, or not entirely inside the image. Boxes are never clamped.
pub fn crop_red_channel(image: &RgbImage, bbox: BoundingBox) -> Result<GrayImage, MeasureError> {
    let dimensions = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    if !bbox.fits_within(dimensions) {
        return Err(MeasureError::InvalidRegion {
            bbox,
            width: dimensions.width,
            height: dimensions.height,
        });
    }

    Ok(GrayImage::from_fn(bbox.width(), bbox.height(), |x, y| {
        Luma([image.get_pixel(bbox.x1 + x, bbox.y1 + y).0[RED_CHANNEL]])
    }))
}

/// Compute the `percentile`-th percentile of all pixel values.
///
/// Uses linear interpolation between the two closest ranks, with the
/// virtual index and the interpolation evaluated in the same order as
/// NumPy's default `linear` method so thresholds match existing
/// calibration baselines exactly. Returns `0.0` for an empty image.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::suboptimal_flops
)]
pub fn percentile(channel: &GrayImage, percentile: f64) -> f64 {
    let n = channel.as_raw().len();
    if n == 0 {
        return 0.0;
    }

    let mut histogram = [0_usize; 256];
    for &value in channel.as_raw() {
        histogram[usize::from(value)] += 1;
    }

    let q = percentile / 100.0;
    let virtual_index = (n as f64) * q + (1.0 + q * -1.0) - 1.0;
    let last = (n - 1) as f64;
    let previous = virtual_index.floor().clamp(0.0, last);
    let next = (previous + 1.0).min(last);
    let gamma = virtual_index - previous;

    let a = f64::from(nth_smallest(&histogram, previous as usize));
    let b = f64::from(nth_smallest(&histogram, next as usize));
    lerp(a, b, gamma)
}

/// The `rank`-th smallest value (zero-based) described by a histogram.
fn nth_smallest(histogram: &[usize; 256], rank: usize) -> u8 {
    let mut seen = 0;
    for (value, &count) in (0..=u8::MAX).zip(histogram.iter()) {
        seen += count;
        if seen > rank {
            return value;
        }
    }
    u8::MAX
}

/// Interpolate from `a` towards `b`, anchoring on the nearer endpoint.
///
/// Plain multiply and add (no fused multiply-add) to keep rounding
/// identical to the reference thresholds.
#[allow(clippy::suboptimal_flops)]
fn lerp(a: f64, b: f64, t: f64) -> f64 {
    let diff = b - a;
    if t >= 0.5 {
        b - diff * (1.0 - t)
    } else {
        a + diff * t
    }
}

/// Binarize a channel: values strictly greater than `threshold` become
/// [`FOREGROUND`], everything else [`BACKGROUND`].
///
/// A pixel exactly equal to the threshold stays background.
#[must_use = "returns the binary mask"]
pub fn binarize(channel: &GrayImage, threshold: f64) -> GrayImage {
    GrayImage::from_fn(channel.width(), channel.height(), |x, y| {
        if f64::from(channel.get_pixel(x, y).0[0]) > threshold {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Binarization threshold for a red channel: its
/// `100 - decay_percent` percentile.
#[must_use]
pub fn decay_threshold(channel: &GrayImage, decay_percent: f64) -> f64 {
    percentile(channel, 100.0 - decay_percent)
}

/// Crop, extract the red channel, and binarize at the
/// `100 - decay_percent` percentile.
///
/// # Errors
///
/// Returns [`MeasureError::InvalidRegion`] if the box does not describe
/// a non-empty region inside `image`.
pub fn preprocess(
    image: &RgbImage,
    bbox: BoundingBox,
    decay_percent: f64,
) -> Result<GrayImage, MeasureError> {
    let red = crop_red_channel(image, bbox)?;
    let threshold = decay_threshold(&red, decay_percent);
    Ok(binarize(&red, threshold))
}
