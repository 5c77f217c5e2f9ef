//! Detector output files.
//!
//! A detections file is a JSON array of
//! `{ "bbox": [x1, y1, x2, y2], "is_filament": bool }` objects, in the
//! order the detector produced them.

use std::path::Path;

use cilia_pipeline::Detection;

use crate::LoadError;

/// Read a detections file.
///
/// # Errors
///
/// Returns [`LoadError::Read`] if the file cannot be read and
/// [`LoadError::Parse`] if it is not a JSON array of detections.
pub fn load_detections(path: &Path) -> Result<Vec<Detection>, LoadError> {
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let detections: Vec<Detection> =
        serde_json::from_str(&json).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    tracing::debug!(path = %path.display(), count = detections.len(), "detections loaded");
    Ok(detections)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cilia_pipeline::BoundingBox;

    use super::*;

    #[test]
    fn loads_detector_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxes.json");
        std::fs::write(
            &path,
            r#"[
                {"bbox": [10, 10, 50, 90], "is_filament": true},
                {"bbox": [0, 5, 20, 25], "is_filament": false}
            ]"#,
        )
        .unwrap();
        let detections = load_detections(&path).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bbox, BoundingBox::new(10, 10, 50, 90));
        assert!(detections[0].is_filament);
        assert!(!detections[1].is_filament);
    }

    #[test]
    fn wrong_box_arity_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxes.json");
        std::fs::write(&path, r#"[{"bbox": [1, 2, 3], "is_filament": true}]"#).unwrap();
        assert!(matches!(
            load_detections(&path),
            Err(LoadError::Parse { .. })
        ));
    }

    #[test]
    fn negative_coordinates_are_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boxes.json");
        std::fs::write(&path, r#"[{"bbox": [-1, 2, 3, 4], "is_filament": true}]"#).unwrap();
        assert!(matches!(
            load_detections(&path),
            Err(LoadError::Parse { .. })
        ));
    }
}
