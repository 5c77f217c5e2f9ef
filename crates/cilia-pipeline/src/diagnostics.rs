//! Measurement diagnostics: timing, counts, and other metrics for each
//! stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! threshold tuning and for inspecting why a box measured the way it
//! did. [`measure_with_diagnostics`] drives the [`Pipeline`] stage by
//! stage and records each stage alongside the staged result.
//!
//! The crate is sans-IO, so it never reads the system clock itself:
//! timestamps come from an injected [`Clock`].
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::pipeline::Pipeline;
use crate::types::{
    BoundingBox, GrayImage, MeasureConfig, MeasureError, RgbImage, StagedMeasurement,
};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Source of monotonic timestamps.
///
/// Returns the time elapsed since an arbitrary fixed origin. Native
/// callers wrap `std::time::Instant`; tests step a counter.
pub trait Clock {
    /// Time elapsed since this clock's origin.
    fn now(&self) -> Duration;
}

/// Diagnostics collected from measuring a single box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureDiagnostics {
    /// Stage 1: crop, red channel, percentile threshold.
    pub threshold: StageDiagnostics,
    /// Stage 2: opening, dilation and erosion.
    pub clean: StageDiagnostics,
    /// Stage 3: skeletonization.
    pub skeleton: StageDiagnostics,
    /// Stage 4: external contour tracing.
    pub contour_tracing: StageDiagnostics,
    /// Stage 5: branch pruning and path normalization.
    pub prune: StageDiagnostics,
    /// Stage 6: calibrated scaling.
    pub scale: StageDiagnostics,
    /// Total wall-clock duration of the measurement (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary of the whole measurement.
    pub summary: MeasureSummary,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

/// Stage-specific metrics that vary by measurement stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Threshold metrics.
    Threshold {
        /// Percentile threshold of the red channel.
        threshold: f64,
        /// Pixels strictly above the threshold.
        foreground_pixels: u64,
        /// Pixels in the box.
        total_pixels: u64,
    },
    /// Morphological cleanup metrics.
    Clean {
        /// Foreground pixels before cleanup.
        foreground_before: u64,
        /// Foreground pixels after cleanup.
        foreground_after: u64,
    },
    /// Skeletonization metrics.
    Skeleton {
        /// Foreground pixels left after thinning.
        skeleton_pixels: u64,
    },
    /// Contour tracing metrics.
    ContourTracing {
        /// Number of external contours.
        contour_count: usize,
        /// Points in the longest contour, 0 when there is none.
        longest_point_count: usize,
    },
    /// Branch pruning metrics.
    Prune {
        /// Branch points found by each pass that found any.
        branch_points_per_pass: Vec<usize>,
        /// Points in the final single-direction path.
        path_points: usize,
        /// Arc length of the path in pixels.
        pixel_length: f64,
    },
    /// Calibrated scaling metrics.
    Scale {
        /// Height of the box in pixels.
        crop_height: u32,
        /// Calibrated frame height, when a calibration was available.
        calibrated_height: Option<f64>,
        /// Resulting physical length, `None` when unknown.
        length: Option<f64>,
    },
}

/// High-level summary for one measured box.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasureSummary {
    /// The measured box.
    pub bbox: BoundingBox,
    /// Number of skeleton contours.
    pub contour_count: usize,
    /// Points in the final path.
    pub path_points: usize,
    /// Physical length, `None` when unknown.
    pub length: Option<f64>,
}

impl MeasureDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Measurement Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Box: {} ({}x{} pixels)",
            self.summary.bbox,
            self.summary.bbox.width(),
            self.summary.bbox.height(),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        let stages = [
            ("Threshold", &self.threshold),
            ("Clean", &self.clean),
            ("Skeleton", &self.skeleton),
            ("Contour Tracing", &self.contour_tracing),
            ("Prune", &self.prune),
            ("Scale", &self.scale),
        ];
        for (name, diag) in &stages {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = format_metrics(&diag.metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        let length = self
            .summary
            .length
            .map_or_else(|| "unknown".to_string(), |l| format!("{l:.3}"));
        lines.push(format!(
            "Contours: {}  |  Path points: {}  |  Length: {length}",
            self.summary.contour_count, self.summary.path_points,
        ));

        lines.join("\n")
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Threshold {
            threshold,
            foreground_pixels,
            total_pixels,
        } => {
            #[allow(clippy::cast_precision_loss)]
            let density = if *total_pixels > 0 {
                *foreground_pixels as f64 / *total_pixels as f64 * 100.0
            } else {
                0.0
            };
            format!("threshold={threshold:.2} foreground={foreground_pixels} ({density:.1}%)")
        }
        StageMetrics::Clean {
            foreground_before,
            foreground_after,
        } => format!("foreground {foreground_before}->{foreground_after}"),
        StageMetrics::Skeleton { skeleton_pixels } => format!("{skeleton_pixels} pixels"),
        StageMetrics::ContourTracing {
            contour_count,
            longest_point_count,
        } => format!("{contour_count} contours, longest {longest_point_count} pts"),
        StageMetrics::Prune {
            branch_points_per_pass,
            path_points,
            pixel_length,
        } => format!(
            "branches per pass {branch_points_per_pass:?}, {path_points} pts, {pixel_length:.2}px"
        ),
        StageMetrics::Scale {
            crop_height,
            calibrated_height,
            length,
        } => match (calibrated_height, length) {
            (Some(h), Some(l)) => format!("{crop_height}px -> {h:.2} units, length={l:.3}"),
            _ => format!("{crop_height}px, no calibration"),
        },
    }
}

/// Count foreground (non-zero) pixels of a binary raster.
pub(crate) fn count_foreground(image: &GrayImage) -> u64 {
    image.pixels().map(|p| u64::from(u8::from(p.0[0] != 0))).sum()
}

/// Measure one box, timing every stage with `clock`.
///
/// Produces the same [`StagedMeasurement`] as
/// [`measure_staged`](crate::measure_staged) plus the diagnostics.
///
/// # Errors
///
/// Same as [`measure_staged`](crate::measure_staged).
pub fn measure_with_diagnostics<C: Clock + ?Sized>(
    image: &RgbImage,
    bbox: BoundingBox,
    calibration: Option<Calibration>,
    config: &MeasureConfig,
    clock: &C,
) -> Result<(StagedMeasurement, MeasureDiagnostics), MeasureError> {
    let start = clock.now();

    let thresholded = Pipeline::new(config.clone(), calibration).threshold(image, bbox)?;
    let t_threshold = clock.now();
    let mask_pixels = count_foreground(thresholded.mask());
    let threshold = StageDiagnostics {
        duration: t_threshold.saturating_sub(start),
        metrics: StageMetrics::Threshold {
            threshold: thresholded.threshold(),
            foreground_pixels: mask_pixels,
            total_pixels: u64::from(bbox.width()) * u64::from(bbox.height()),
        },
    };

    let t0 = clock.now();
    let cleaned = thresholded.clean();
    let clean = StageDiagnostics {
        duration: clock.now().saturating_sub(t0),
        metrics: StageMetrics::Clean {
            foreground_before: mask_pixels,
            foreground_after: count_foreground(cleaned.cleaned()),
        },
    };

    let t0 = clock.now();
    let skeletonized = cleaned.skeletonize();
    let skeleton = StageDiagnostics {
        duration: clock.now().saturating_sub(t0),
        metrics: StageMetrics::Skeleton {
            skeleton_pixels: count_foreground(skeletonized.skeleton()),
        },
    };

    let t0 = clock.now();
    let traced = skeletonized.trace_contours();
    let contour_tracing = StageDiagnostics {
        duration: clock.now().saturating_sub(t0),
        metrics: StageMetrics::ContourTracing {
            contour_count: traced.contour_count(),
            longest_point_count: traced.longest_point_count(),
        },
    };

    let t0 = clock.now();
    let pruned = traced.prune()?;
    let prune = StageDiagnostics {
        duration: clock.now().saturating_sub(t0),
        metrics: StageMetrics::Prune {
            branch_points_per_pass: pruned.branch_points().iter().map(Vec::len).collect(),
            path_points: pruned.path().len(),
            pixel_length: pruned.pixel_length(),
        },
    };

    let t0 = clock.now();
    let crop_height = pruned.crop_height();
    let staged = pruned.into_result();
    let end = clock.now();
    let length = staged.measurement.length();
    let scale = StageDiagnostics {
        duration: end.saturating_sub(t0),
        metrics: StageMetrics::Scale {
            crop_height,
            calibrated_height: calibration.map(|c| c.height),
            length,
        },
    };

    let diagnostics = MeasureDiagnostics {
        threshold,
        clean,
        skeleton,
        contour_tracing,
        prune,
        scale,
        total_duration: end.saturating_sub(start),
        summary: MeasureSummary {
            bbox,
            contour_count: staged.contour_count,
            path_points: staged.path.len(),
            length,
        },
    };
    Ok((staged, diagnostics))
}
