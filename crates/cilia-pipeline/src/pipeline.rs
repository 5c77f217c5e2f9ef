//! Incremental measurement: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::measure_staged`] which runs every stage in one call,
//! [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use cilia_pipeline::{BoundingBox, Calibration, MeasureConfig, MeasureError, Pipeline};
//! # use cilia_pipeline::types::RgbImage;
//! # fn run(image: &RgbImage) -> Result<(), MeasureError> {
//! let _staged = Pipeline::new(MeasureConfig::default(), Some(Calibration::new(100.0, 300.0)))
//!     .threshold(image, BoundingBox::new(10, 10, 50, 90))?
//!     .clean()
//!     .skeletonize()
//!     .trace_contours()
//!     .prune()?
//!     .into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state,
//! carrying all previously computed intermediates, so stages cannot be
//! skipped or run out of order.

use crate::branch;
use crate::calibration::Calibration;
use crate::contour;
use crate::morphology;
use crate::region;
use crate::skeleton;
use crate::types::{
    BoundingBox, Contour, GrayImage, MeasureConfig, MeasureError, Measurement, Point, RgbImage,
    StagedMeasurement,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Measurement state before any processing has occurred.
///
/// Call [`threshold`](Self::threshold) to crop and binarize a box.
#[must_use = "pipeline stages are consumed by advancing; call .threshold() to continue"]
pub struct Pending {
    config: MeasureConfig,
    calibration: Option<Calibration>,
}

impl Pending {
    /// The measurement configuration.
    #[must_use]
    pub const fn config(&self) -> &MeasureConfig {
        &self.config
    }

    /// Crop `bbox` out of `image`, keep its red channel, and binarize it
    /// at the `100 - decay_percent` percentile.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError::InvalidConfig`] if the configuration is
    /// out of range and [`MeasureError::InvalidRegion`] if the box is
    /// not a non-empty region inside `image`.
    pub fn threshold(
        self,
        image: &RgbImage,
        bbox: BoundingBox,
    ) -> Result<Thresholded, MeasureError> {
        self.config.validate()?;
        let red = region::crop_red_channel(image, bbox)?;
        let threshold = region::decay_threshold(&red, self.config.decay_percent);
        let mask = region::binarize(&red, threshold);
        Ok(Thresholded {
            config: self.config,
            calibration: self.calibration,
            bbox,
            threshold,
            mask,
        })
    }
}

// ───────────────────────── Stage 1: Thresholded ──────────────────────

/// State after binarizing the red channel of the box.
#[must_use = "pipeline stages are consumed by advancing; call .clean() to continue"]
pub struct Thresholded {
    config: MeasureConfig,
    calibration: Option<Calibration>,
    bbox: BoundingBox,
    threshold: f64,
    mask: GrayImage,
}

impl Thresholded {
    /// The binary mask of the box.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// The percentile threshold the red channel was compared against.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Advance to the morphological cleanup stage.
    pub fn clean(self) -> Cleaned {
        let cleaned = morphology::clean(&self.mask);
        Cleaned {
            config: self.config,
            calibration: self.calibration,
            bbox: self.bbox,
            threshold: self.threshold,
            mask: self.mask,
            cleaned,
        }
    }
}

// ───────────────────────── Stage 2: Cleaned ──────────────────────────

/// State after opening, dilation and erosion.
#[must_use = "pipeline stages are consumed by advancing; call .skeletonize() to continue"]
pub struct Cleaned {
    config: MeasureConfig,
    calibration: Option<Calibration>,
    bbox: BoundingBox,
    threshold: f64,
    mask: GrayImage,
    cleaned: GrayImage,
}

impl Cleaned {
    /// The cleaned mask.
    #[must_use]
    pub const fn cleaned(&self) -> &GrayImage {
        &self.cleaned
    }

    /// Advance to the skeletonization stage.
    pub fn skeletonize(self) -> Skeletonized {
        let skeleton = skeleton::skeletonize(&self.cleaned);
        Skeletonized {
            config: self.config,
            calibration: self.calibration,
            bbox: self.bbox,
            threshold: self.threshold,
            mask: self.mask,
            cleaned: self.cleaned,
            skeleton,
        }
    }
}

// ───────────────────────── Stage 3: Skeletonized ─────────────────────

/// State after thinning the cleaned mask.
#[must_use = "pipeline stages are consumed by advancing; call .trace_contours() to continue"]
pub struct Skeletonized {
    config: MeasureConfig,
    calibration: Option<Calibration>,
    bbox: BoundingBox,
    threshold: f64,
    mask: GrayImage,
    cleaned: GrayImage,
    skeleton: GrayImage,
}

impl Skeletonized {
    /// The one-pixel-wide skeleton.
    #[must_use]
    pub const fn skeleton(&self) -> &GrayImage {
        &self.skeleton
    }

    /// Trace the skeleton's external contours and keep the longest.
    pub fn trace_contours(self) -> ContoursTraced {
        let contours = contour::trace_external(&self.skeleton);
        let contour_count = contours.len();
        let longest_point_count = contours.iter().map(Contour::len).max().unwrap_or(0);
        let raw_contour = contour::longest(contours);
        ContoursTraced {
            config: self.config,
            calibration: self.calibration,
            bbox: self.bbox,
            threshold: self.threshold,
            mask: self.mask,
            cleaned: self.cleaned,
            skeleton: self.skeleton,
            contour_count,
            longest_point_count,
            raw_contour,
        }
    }
}

// ───────────────────────── Stage 4: ContoursTraced ───────────────────

/// State after contour tracing.
///
/// [`raw_contour`](Self::raw_contour) is `None` when the skeleton is
/// empty; the measurement then reports no structure.
#[must_use = "pipeline stages are consumed by advancing; call .prune() to continue"]
pub struct ContoursTraced {
    config: MeasureConfig,
    calibration: Option<Calibration>,
    bbox: BoundingBox,
    threshold: f64,
    mask: GrayImage,
    cleaned: GrayImage,
    skeleton: GrayImage,
    contour_count: usize,
    longest_point_count: usize,
    raw_contour: Option<Contour>,
}

impl ContoursTraced {
    /// Number of external contours on the skeleton.
    #[must_use]
    pub const fn contour_count(&self) -> usize {
        self.contour_count
    }

    /// Point count of the contour with the most points.
    #[must_use]
    pub const fn longest_point_count(&self) -> usize {
        self.longest_point_count
    }

    /// The longest skeleton contour, if any.
    #[must_use]
    pub const fn raw_contour(&self) -> Option<&Contour> {
        self.raw_contour.as_ref()
    }

    /// Prune side branches and fold the main arc into a single-direction
    /// path.
    ///
    /// # Errors
    ///
    /// Returns [`MeasureError::NonBinaryRaster`] if a re-rendered arc is
    /// not binary.
    pub fn prune(self) -> Result<Pruned, MeasureError> {
        let (branch_points, path) = match &self.raw_contour {
            Some(raw) => {
                let pruned = branch::prune(
                    raw.clone(),
                    self.skeleton.width(),
                    self.skeleton.height(),
                    self.config.max_prune_passes,
                )?;
                (
                    pruned.branch_points,
                    branch::single_direction_path(&pruned.arc),
                )
            }
            None => (Vec::new(), Contour::default()),
        };
        let pixel_length = path.arc_length();
        Ok(Pruned {
            calibration: self.calibration,
            bbox: self.bbox,
            threshold: self.threshold,
            mask: self.mask,
            cleaned: self.cleaned,
            skeleton: self.skeleton,
            contour_count: self.contour_count,
            raw_contour: self.raw_contour,
            branch_points,
            path,
            pixel_length,
        })
    }
}

// ───────────────────────── Stage 5: Pruned ───────────────────────────

/// State after branch pruning — the final stage.
///
/// Call [`into_result`](Self::into_result) to scale the pixel length
/// and collect every intermediate.
#[must_use = "call .into_result() to obtain the measurement"]
pub struct Pruned {
    calibration: Option<Calibration>,
    bbox: BoundingBox,
    threshold: f64,
    mask: GrayImage,
    cleaned: GrayImage,
    skeleton: GrayImage,
    contour_count: usize,
    raw_contour: Option<Contour>,
    branch_points: Vec<Vec<Point>>,
    path: Contour,
    pixel_length: f64,
}

impl Pruned {
    /// The final single-direction path.
    #[must_use]
    pub const fn path(&self) -> &Contour {
        &self.path
    }

    /// Junctions removed by each pruning pass.
    #[must_use]
    pub fn branch_points(&self) -> &[Vec<Point>] {
        &self.branch_points
    }

    /// Arc length of the path in pixels.
    #[must_use]
    pub const fn pixel_length(&self) -> f64 {
        self.pixel_length
    }

    /// Height of the measured box in pixels.
    #[must_use]
    pub const fn crop_height(&self) -> u32 {
        self.bbox.height()
    }

    /// The calibrated outcome of this measurement.
    #[must_use]
    pub fn measurement(&self) -> Measurement {
        match self.calibration {
            None => Measurement::Unknown,
            Some(_) if self.raw_contour.is_none() => Measurement::NoStructure,
            Some(calibration) => Measurement::Length(crate::physical_length(
                self.pixel_length,
                self.bbox.height(),
                calibration,
            )),
        }
    }

    /// Consume the pipeline and return every intermediate.
    #[must_use]
    pub fn into_result(self) -> StagedMeasurement {
        let measurement = self.measurement();
        StagedMeasurement {
            mask: self.mask,
            cleaned: self.cleaned,
            skeleton: self.skeleton,
            threshold: self.threshold,
            contour_count: self.contour_count,
            raw_contour: self.raw_contour,
            branch_points: self.branch_points,
            path: self.path,
            pixel_length: self.pixel_length,
            measurement,
        }
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental cilium measurement.
///
/// Created via [`Pipeline::new`], which stores the configuration and
/// calibration without doing any processing.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from a configuration and an optional
    /// calibration. Without a calibration every stage still runs, but
    /// the final measurement is [`Measurement::Unknown`].
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(config: MeasureConfig, calibration: Option<Calibration>) -> Pending {
        Pending {
            config,
            calibration,
        }
    }
}
