//! Calibration sidecar lookup.
//!
//! Microscope exports write `<image>_metadata.xml` next to each image.
//! Split or renamed exports (`sample_01.png`, `sample_02.png`) share one
//! sidecar named after the original file (`sample.png_metadata.xml`),
//! so when the direct sidecar is missing the last `_`-separated segment
//! of the stem is dropped and the lookup is retried.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use cilia_pipeline::{Calibration, CalibrationError, parse_contour_size};

/// Suffix appended to the image file name to form the sidecar name.
pub const SIDECAR_SUFFIX: &str = "_metadata.xml";

/// Errors that can occur while resolving an image's calibration.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// Neither the direct nor the fallback sidecar exists.
    #[error("no calibration metadata found (tried {}{})", .primary.display(), .fallback.as_ref().map(|p| format!(", {}", p.display())).unwrap_or_default())]
    MissingFile {
        /// `<image>_metadata.xml`.
        primary: PathBuf,
        /// The stem-truncated fallback, when the stem has an underscore.
        fallback: Option<PathBuf>,
    },

    /// The sidecar exists but could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        /// The sidecar path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The sidecar could not be parsed.
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

/// The direct sidecar path: the image path with [`SIDECAR_SUFFIX`]
/// appended.
#[must_use]
pub fn primary_sidecar(image_path: &Path) -> PathBuf {
    let mut name = OsString::from(image_path.as_os_str());
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// The fallback sidecar path: the stem cut at its last underscore, the
/// original extension, then [`SIDECAR_SUFFIX`], in the same directory.
///
/// Returns `None` when the stem has no underscore or is not UTF-8.
#[must_use]
pub fn fallback_sidecar(image_path: &Path) -> Option<PathBuf> {
    let stem = image_path.file_stem()?.to_str()?;
    let prefix = &stem[..stem.rfind('_')?];
    let extension = image_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    Some(image_path.with_file_name(format!("{prefix}{extension}{SIDECAR_SUFFIX}")))
}

/// Locate the sidecar of `image_path`: the direct one if it exists,
/// otherwise the fallback if that exists.
///
/// # Errors
///
/// Returns [`ResolveError::MissingFile`] when neither exists.
pub fn locate_sidecar(image_path: &Path) -> Result<PathBuf, ResolveError> {
    let primary = primary_sidecar(image_path);
    if primary.is_file() {
        return Ok(primary);
    }
    let fallback = fallback_sidecar(image_path);
    if let Some(ref path) = fallback
        && path.is_file()
    {
        tracing::debug!(
            image = %image_path.display(),
            sidecar = %path.display(),
            "using shared sidecar",
        );
        return Ok(path.clone());
    }
    Err(ResolveError::MissingFile { primary, fallback })
}

/// Read and parse the calibration of `image_path`.
///
/// Returns `Ok(None)` when the sidecar has no `ContourSize` element.
///
/// # Errors
///
/// Returns [`ResolveError::MissingFile`] if no sidecar exists,
/// [`ResolveError::Read`] if it cannot be read, and
/// [`ResolveError::Calibration`] if its contents are malformed or hold
/// invalid values.
pub fn resolve_calibration(image_path: &Path) -> Result<Option<Calibration>, ResolveError> {
    let path = locate_sidecar(image_path)?;
    let xml = std::fs::read_to_string(&path).map_err(|source| ResolveError::Read {
        path: path.clone(),
        source,
    })?;
    let calibration = parse_contour_size(&xml)?;
    match calibration {
        Some(c) => tracing::debug!(
            sidecar = %path.display(),
            width = c.width,
            height = c.height,
            "calibration loaded",
        ),
        None => tracing::warn!(sidecar = %path.display(), "sidecar has no ContourSize element"),
    }
    Ok(calibration)
}
