//! cilia-pipeline: Pure cilium length measurement (sans-IO).
//!
//! Measures the length of a single thin fluorescent structure inside a
//! detector bounding box through:
//! crop -> red channel -> percentile threshold -> morphological cleanup ->
//! skeletonization -> contour tracing -> branch pruning -> calibrated arc
//! length.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! rasters and strings and returns structured data. Locating and reading
//! images, sidecar metadata and configuration files lives in `cilia-io`.

pub mod branch;
pub mod calibration;
pub mod contour;
pub mod diagnostics;
pub mod morphology;
pub mod pipeline;
pub mod region;
pub mod report;
pub mod skeleton;
pub mod types;

pub use calibration::{Calibration, CalibrationError, parse_contour_size};
pub use pipeline::Pipeline;
pub use report::{Detection, ReportRow, build_report};
pub use types::{
    BoundingBox, Contour, Dimensions, MeasureConfig, MeasureError, Measurement, Point,
    StagedMeasurement,
};

use types::RgbImage;

/// Convert a pixel arc length into physical units.
///
/// The box height in pixels maps onto the calibrated frame height:
/// `pixel_length / crop_height * calibration.height`. A zero crop height
/// yields `0.0`.
#[must_use]
pub fn physical_length(pixel_length: f64, crop_height: u32, calibration: Calibration) -> f64 {
    if crop_height == 0 {
        return 0.0;
    }
    pixel_length / f64::from(crop_height) * calibration.height
}

/// Measure the cilium inside `bbox`.
///
/// Returns [`Measurement::Unknown`] immediately when `calibration` is
/// `None`; nothing else is checked in that case. Otherwise runs every
/// stage and returns [`Measurement::NoStructure`] when the skeleton is
/// empty, or the calibrated [`Measurement::Length`].
///
/// # Measurement steps
///
/// 1. Crop the box and keep its red channel
/// 2. Binarize at the `100 - decay_percent` percentile
/// 3. Opening, dilation and erosion
/// 4. Skeletonization
/// 5. External contour tracing, longest contour
/// 6. Bounded branch pruning and single-direction path
/// 7. Arc length scaled by the box height and calibration
///
/// # Errors
///
/// Returns [`MeasureError::InvalidConfig`] if `config` is out of range,
/// [`MeasureError::InvalidRegion`] if the box is not a non-empty region
/// inside `image`, and [`MeasureError::NonBinaryRaster`] if an internal
/// raster loses its binary form.
pub fn measure(
    image: &RgbImage,
    bbox: BoundingBox,
    calibration: Option<Calibration>,
    config: &MeasureConfig,
) -> Result<Measurement, MeasureError> {
    if calibration.is_none() {
        return Ok(Measurement::Unknown);
    }
    Ok(measure_staged(image, bbox, calibration, config)?.measurement)
}

/// Run every measurement stage and return all intermediates.
///
/// Unlike [`measure`], every stage runs even without a calibration, so
/// the intermediates can be inspected; the measurement is then
/// [`Measurement::Unknown`].
///
/// # Errors
///
/// Same as [`measure`].
pub fn measure_staged(
    image: &RgbImage,
    bbox: BoundingBox,
    calibration: Option<Calibration>,
    config: &MeasureConfig,
) -> Result<StagedMeasurement, MeasureError> {
    Ok(Pipeline::new(config.clone(), calibration)
        .threshold(image, bbox)?
        .clean()
        .skeletonize()
        .trace_contours()
        .prune()?
        .into_result())
}
