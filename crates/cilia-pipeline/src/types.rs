//! Shared types for the cilium measurement pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can reference
/// intermediate raster data without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can pass source rasters
/// without depending on `image` directly.
pub use image::RgbImage;

/// Foreground value of every binary raster in the pipeline.
pub const FOREGROUND: u8 = 255;

/// Background value of every binary raster in the pipeline.
pub const BACKGROUND: u8 = 0;

/// An integer pixel position in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    /// Column (pixels from left edge).
    pub x: u32,
    /// Row (pixels from top edge).
    pub y: u32,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

/// An ordered sequence of pixel positions.
///
/// Either a closed border as produced by contour tracing (a one-pixel
/// line is visited twice, once in each direction) or an open,
/// deduplicated single-direction arc after branch pruning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contour(Vec<Point>);

impl Contour {
    /// Create a new contour from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the contour has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the contour.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the contour and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }

    /// Open-curve arc length: the sum of Euclidean distances between
    /// consecutive points. No closing segment is added.
    #[must_use]
    pub fn arc_length(&self) -> f64 {
        self.0.windows(2).map(|w| w[0].distance(w[1])).sum()
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Axis-aligned detector bounding box covering the half-open pixel
/// ranges `[x1, x2)` and `[y1, y2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 4]", into = "[u32; 4]")]
pub struct BoundingBox {
    /// Left edge (inclusive).
    pub x1: u32,
    /// Top edge (inclusive).
    pub y1: u32,
    /// Right edge (exclusive).
    pub x2: u32,
    /// Bottom edge (exclusive).
    pub y2: u32,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    #[must_use]
    pub const fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Width of the box in pixels (zero when inverted).
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    /// Height of the box in pixels (zero when inverted).
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Returns `true` if the box is non-empty and lies entirely inside
    /// an image of the given dimensions.
    #[must_use]
    pub const fn fits_within(&self, dimensions: Dimensions) -> bool {
        self.x1 < self.x2
            && self.y1 < self.y2
            && self.x2 <= dimensions.width
            && self.y2 <= dimensions.height
    }

    /// Returns `true` if any coordinate equals `0`, the image height, or
    /// the image width.
    ///
    /// Every coordinate is compared against all three values regardless
    /// of axis; detector boxes clipped at the frame land on one of them.
    #[must_use]
    pub fn touches_border(&self, dimensions: Dimensions) -> bool {
        self.to_array()
            .iter()
            .any(|&c| c == 0 || c == dimensions.height || c == dimensions.width)
    }

    /// Coordinates as `[x1, y1, x2, y2]`.
    #[must_use]
    pub const fn to_array(self) -> [u32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

impl From<[u32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [u32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [u32; 4] {
    fn from(bbox: BoundingBox) -> Self {
        bbox.to_array()
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}, {}]", self.x1, self.y1, self.x2, self.y2)
    }
}

/// Configuration for a single measurement.
///
/// # Invariants
///
/// `decay_percent` must lie strictly between 0 and 100, and
/// `max_prune_passes` must be at least 1. [`MeasureConfig::validate`]
/// checks both; [`crate::measure`] calls it before touching the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeasureConfig {
    /// Top-percentile brightness cutoff. The binarization threshold is
    /// the `100 - decay_percent` percentile of the red channel inside
    /// the box.
    pub decay_percent: f64,

    /// Upper bound on prune → rebuild → prune passes of the branch
    /// pruner. The loop stops earlier once a pass finds no junction.
    pub max_prune_passes: usize,
}

impl MeasureConfig {
    /// Default top-percentile cutoff.
    pub const DEFAULT_DECAY_PERCENT: f64 = 5.0;

    /// Default number of pruning passes.
    pub const DEFAULT_MAX_PRUNE_PASSES: usize = 2;

    /// Check the configuration invariants.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError::InvalidConfig`] if `decay_percent` is not
    /// inside `(0, 100)` or `max_prune_passes` is zero.
    pub fn validate(&self) -> Result<(), MeasureError> {
        if !(self.decay_percent > 0.0 && self.decay_percent < 100.0) {
            return Err(MeasureError::InvalidConfig(format!(
                "decay_percent must be in (0, 100), got {}",
                self.decay_percent
            )));
        }
        if self.max_prune_passes == 0 {
            return Err(MeasureError::InvalidConfig(
                "max_prune_passes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            decay_percent: Self::DEFAULT_DECAY_PERCENT,
            max_prune_passes: Self::DEFAULT_MAX_PRUNE_PASSES,
        }
    }
}

/// Outcome of measuring one bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Measurement {
    /// Calibrated physical length, in the calibration's unit.
    Length(f64),
    /// The skeleton yielded no contour (e.g. only isolated speckle).
    /// Reported as a length of `0.0`.
    NoStructure,
    /// No calibration was available, so no physical length exists.
    Unknown,
}

impl Measurement {
    /// Physical length, `Some(0.0)` for [`Measurement::NoStructure`] and
    /// `None` when unknown.
    #[must_use]
    pub const fn length(self) -> Option<f64> {
        match self {
            Self::Length(length) => Some(length),
            Self::NoStructure => Some(0.0),
            Self::Unknown => None,
        }
    }
}

/// Every intermediate of one measurement, for inspection and diagnostics.
#[derive(Debug, Clone)]
pub struct StagedMeasurement {
    /// Binarized red channel of the cropped region.
    pub mask: GrayImage,
    /// Mask after opening, dilation and erosion.
    pub cleaned: GrayImage,
    /// One-pixel-wide skeleton of the cleaned mask.
    pub skeleton: GrayImage,
    /// Threshold the red channel was compared against.
    pub threshold: f64,
    /// Number of external contours traced on the skeleton.
    pub contour_count: usize,
    /// Longest raw skeleton contour (`None` when there was none).
    pub raw_contour: Option<Contour>,
    /// Branch points removed by each pruning pass, in pass order.
    pub branch_points: Vec<Vec<Point>>,
    /// Final open single-direction path.
    pub path: Contour,
    /// Arc length of `path` in pixels.
    pub pixel_length: f64,
    /// Calibrated result.
    pub measurement: Measurement,
}

/// Errors that can occur while measuring a region.
#[derive(Debug, thiserror::Error)]
pub enum MeasureError {
    /// The bounding box is empty, inverted, or extends past the image.
    #[error("bounding box {bbox} is not a non-empty region inside the {width}x{height} image")]
    InvalidRegion {
        /// The rejected box.
        bbox: BoundingBox,
        /// Source image width.
        width: u32,
        /// Source image height.
        height: u32,
    },

    /// Measurement configuration is invalid.
    #[error("invalid measurement configuration: {0}")]
    InvalidConfig(String),

    /// A raster expected to hold only 0 and 255 contained another value.
    #[error("raster is not binary: found pixel value {value}")]
    NonBinaryRaster {
        /// The first offending value.
        value: u8,
    },
}
