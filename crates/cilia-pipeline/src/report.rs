//! Per-image report: measure every detection and number the rows.
//!
//! Detections that the detector did not classify as filaments are not
//! measured and report a length of `0.0`. Boxes clipped by the frame
//! rarely hold a whole cilium, so a box touching the image border is
//! dropped when its length is below one unit. Ranks are assigned after
//! dropping, consecutively from 1.

use serde::{Deserialize, Serialize};

use crate::calibration::Calibration;
use crate::types::{BoundingBox, Dimensions, MeasureConfig, MeasureError, RgbImage};

/// A detector output: a box and whether it holds a filament.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// Detector bounding box `[x1, y1, x2, y2]`.
    pub bbox: BoundingBox,
    /// Whether the detector classified the box as a filament.
    pub is_filament: bool,
}

/// One row of the per-image report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    /// 1-based position among the kept rows.
    pub rank: usize,
    /// The detection's bounding box.
    pub bbox: BoundingBox,
    /// Whether the detection is a filament.
    pub is_filament: bool,
    /// Physical length, `None` when it could not be determined.
    pub length: Option<f64>,
}

impl std::fmt::Display for ReportRow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:>3}  {}  ", self.rank, self.bbox)?;
        match self.length {
            Some(length) => write!(f, "{length:.3}"),
            None => write!(f, "unknown"),
        }
    }
}

/// A detection whose measurement failed.
#[derive(Debug)]
pub struct MeasureFailure {
    /// Index of the detection in the input slice.
    pub index: usize,
    /// The detection's bounding box.
    pub bbox: BoundingBox,
    /// Why the measurement failed.
    pub error: MeasureError,
}

/// Report rows plus the failures the caller should surface.
#[derive(Debug, Default)]
pub struct Report {
    /// Kept rows, in detection order.
    pub rows: Vec<ReportRow>,
    /// Measurement failures; each still has a row with an unknown length
    /// (unless dropped).
    pub failures: Vec<MeasureFailure>,
}

/// Whether a row is dropped from the report: its box touches the image
/// border and its length is known and below one unit.
#[must_use]
pub fn is_dropped(bbox: BoundingBox, length: Option<f64>, dimensions: Dimensions) -> bool {
    bbox.touches_border(dimensions) && length.is_some_and(|l| l < 1.0)
}

/// Measure every detection in `image` and assemble the report.
///
/// A failed measurement does not abort the report: its row carries an
/// unknown length and the error is returned in [`Report::failures`].
#[must_use]
pub fn build_report(
    image: &RgbImage,
    detections: &[Detection],
    calibration: Option<Calibration>,
    config: &MeasureConfig,
) -> Report {
    let dimensions = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    let mut report = Report::default();

    for (index, detection) in detections.iter().enumerate() {
        let length = if detection.is_filament {
            match crate::measure(image, detection.bbox, calibration, config) {
                Ok(measurement) => measurement.length(),
                Err(error) => {
                    report.failures.push(MeasureFailure {
                        index,
                        bbox: detection.bbox,
                        error,
                    });
                    None
                }
            }
        } else {
            Some(0.0)
        };

        if is_dropped(detection.bbox, length, dimensions) {
            continue;
        }
        report.rows.push(ReportRow {
            rank: report.rows.len() + 1,
            bbox: detection.bbox,
            is_filament: detection.is_filament,
            length,
        });
    }
    report
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgb;

    use super::*;

    fn dims() -> Dimensions {
        Dimensions {
            width: 120,
            height: 100,
        }
    }

    /// Dark frame with a bright red vertical bar at x = 60..63,
    /// y = 30..70.
    fn frame() -> RgbImage {
        RgbImage::from_fn(120, 100, |x, y| {
            if (60..63).contains(&x) && (30..70).contains(&y) {
                Rgb([250, 20, 20])
            } else {
                Rgb([10, 20, 20])
            }
        })
    }

    fn detection(bbox: [u32; 4], is_filament: bool) -> Detection {
        Detection {
            bbox: bbox.into(),
            is_filament,
        }
    }

    #[test]
    fn drop_rule() {
        let inner = BoundingBox::new(10, 10, 50, 50);
        let edge = BoundingBox::new(0, 10, 50, 50);
        assert!(!is_dropped(inner, Some(0.0), dims()));
        assert!(is_dropped(edge, Some(0.0), dims()));
        assert!(is_dropped(edge, Some(0.99), dims()));
        assert!(!is_dropped(edge, Some(1.0), dims()));
        assert!(!is_dropped(edge, None, dims()));
    }

    #[test]
    fn non_filaments_report_zero_without_measuring() {
        // Out-of-bounds box: measuring it would fail.
        let detections = [detection([10, 10, 500, 50], false)];
        let report = build_report(
            &frame(),
            &detections,
            Some(Calibration::new(1.0, 1.0)),
            &MeasureConfig::default(),
        );
        assert!(report.failures.is_empty());
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].length, Some(0.0));
    }

    #[test]
    fn border_rows_with_zero_length_are_dropped_and_ranks_renumbered() {
        let detections = [
            detection([0, 0, 20, 20], false),
            detection([40, 10, 80, 90], true),
            detection([10, 10, 30, 30], false),
            detection([100, 80, 120, 100], false),
        ];
        let report = build_report(
            &frame(),
            &detections,
            Some(Calibration::new(120.0, 100.0)),
            &MeasureConfig::default(),
        );
        assert!(report.failures.is_empty());
        let ranks: Vec<usize> = report.rows.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
        assert_eq!(report.rows[0].bbox, BoundingBox::new(40, 10, 80, 90));
        assert!(report.rows[0].length.unwrap() > 1.0);
        assert_eq!(report.rows[1].bbox, BoundingBox::new(10, 10, 30, 30));
    }

    #[test]
    fn failures_become_unknown_rows() {
        let detections = [
            detection([40, 20, 80, 80], true),
            detection([50, 50, 40, 60], true),
        ];
        let report = build_report(
            &frame(),
            &detections,
            Some(Calibration::new(1.0, 1.0)),
            &MeasureConfig::default(),
        );
        assert_eq!(report.rows.len(), 2);
        assert_eq!(report.rows[1].length, None);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].index, 1);
        assert!(matches!(
            report.failures[0].error,
            MeasureError::InvalidRegion { .. }
        ));
    }

    #[test]
    fn unknown_lengths_are_kept_on_the_border() {
        let detections = [detection([0, 0, 120, 100], true)];
        let report = build_report(&frame(), &detections, None, &MeasureConfig::default());
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].length, None);
    }

    #[test]
    fn detection_deserializes_from_detector_json() {
        let json = r#"[{"bbox": [1, 2, 30, 40], "is_filament": true}]"#;
        let detections: Vec<Detection> = serde_json::from_str(json).unwrap();
        assert_eq!(detections, vec![detection([1, 2, 30, 40], true)]);
    }

    #[test]
    fn row_display() {
        let row = ReportRow {
            rank: 2,
            bbox: BoundingBox::new(1, 2, 3, 4),
            is_filament: true,
            length: Some(12.5),
        };
        assert_eq!(row.to_string(), "  2  [1, 2, 3, 4]  12.500");
        let unknown = ReportRow { length: None, ..row };
        assert_eq!(unknown.to_string(), "  2  [1, 2, 3, 4]  unknown");
    }
}
