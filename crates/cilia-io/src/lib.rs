//! cilia-io: Filesystem I/O around the measurement pipeline.
//!
//! Resolves calibration sidecars, loads images, settings and detector
//! output, writes stage dumps and annotated overlays, and ties them
//! together into a per-image measurement. Every recoverable problem is
//! logged with `tracing`; the pure pipeline lives in `cilia-pipeline`.

pub mod detections;
pub mod raster;
pub mod settings;
pub mod sidecar;

use std::path::{Path, PathBuf};

use cilia_pipeline::report::Report;
use cilia_pipeline::types::RgbImage;
use cilia_pipeline::{Calibration, Detection, MeasureConfig, MeasureError, build_report};

pub use detections::load_detections;
pub use raster::{annotate, load_rgb, save_rgb, save_stages};
pub use settings::load_config;
pub use sidecar::{ResolveError, resolve_calibration};

/// Errors that can occur while loading or writing files.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The image could not be opened or decoded.
    #[error("failed to load image {}: {source}", .path.display())]
    Image {
        /// The image path.
        path: PathBuf,
        /// Underlying decode error.
        source: image::ImageError,
    },

    /// A file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// The file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A JSON file could not be parsed.
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        /// The file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// An image could not be encoded or saved.
    #[error("failed to write image {}: {source}", .path.display())]
    Write {
        /// The output path.
        path: PathBuf,
        /// Underlying encode error.
        source: image::ImageError,
    },

    /// Encoded bytes could not be written to disk.
    #[error("failed to write {}: {source}", .path.display())]
    WriteFile {
        /// The output path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Loaded settings are out of range.
    #[error(transparent)]
    InvalidConfig(#[from] MeasureError),
}

/// A measured image: its source raster, calibration and report.
#[derive(Debug)]
pub struct ImageReport {
    /// The decoded source image.
    pub image: RgbImage,
    /// The calibration used, if one was found.
    pub calibration: Option<Calibration>,
    /// Report rows and per-detection failures.
    pub report: Report,
}

/// Calibration of `image_path`, or `None` after logging why it is
/// unavailable.
///
/// Lengths of an image without calibration are unknown, but the image is
/// still processed.
pub fn calibration_or_none(image_path: &Path) -> Option<Calibration> {
    match resolve_calibration(image_path) {
        Ok(calibration) => calibration,
        Err(ResolveError::MissingFile { .. }) => {
            tracing::error!(
                image = %image_path.display(),
                "no metadata XML found, unable to measure cilia length",
            );
            None
        }
        Err(e) => {
            tracing::error!(image = %image_path.display(), error = %e, "invalid calibration metadata");
            None
        }
    }
}

/// Load an image, resolve its calibration, and measure every detection.
///
/// Calibration problems and per-detection measurement failures are
/// logged and reflected as unknown lengths; they do not fail the image.
///
/// # Errors
///
/// Returns [`LoadError::Image`] if the image cannot be decoded.
pub fn measure_image(
    image_path: &Path,
    detections: &[Detection],
    config: &MeasureConfig,
) -> Result<ImageReport, LoadError> {
    let image = load_rgb(image_path)?;
    let calibration = calibration_or_none(image_path);
    tracing::info!(
        image = %image_path.display(),
        width = image.width(),
        height = image.height(),
        detections = detections.len(),
        calibrated = calibration.is_some(),
        "processing",
    );

    let report = build_report(&image, detections, calibration, config);
    for failure in &report.failures {
        tracing::error!(
            image = %image_path.display(),
            detection = failure.index,
            bbox = %failure.bbox,
            error = %failure.error,
            "measurement failed",
        );
    }
    for row in &report.rows {
        tracing::debug!(rank = row.rank, bbox = %row.bbox, length = ?row.length, "measured");
    }

    Ok(ImageReport {
        image,
        calibration,
        report,
    })
}
