//! Measurement settings files.
//!
//! Two JSON layouts are accepted:
//!
//! - the detection tool's model configuration, where
//!   `"Brightness Decay Limit"` holds the top-percentile cutoff and every
//!   other key (confidence, IoU, ...) belongs to the detector;
//! - a serialized [`MeasureConfig`] (`decay_percent`,
//!   `max_prune_passes`).
//!
//! In the tool layout an absent or zero limit means the default.

use std::path::Path;

use cilia_pipeline::MeasureConfig;
use serde::Deserialize;

use crate::LoadError;

/// Key of the top-percentile cutoff in the tool configuration.
pub const DECAY_LIMIT_KEY: &str = "Brightness Decay Limit";

/// The part of the detection tool's configuration this crate reads.
#[derive(Debug, Deserialize)]
struct ToolConfig {
    #[serde(rename = "Brightness Decay Limit", default)]
    brightness_decay_limit: Option<f64>,
}

/// Parse settings JSON into a validated [`MeasureConfig`].
///
/// # Errors
///
/// Returns [`LoadError::Parse`] if the text is not JSON of either
/// layout and [`LoadError::InvalidConfig`] if the resulting values are
/// out of range.
pub fn parse_config(json: &str, origin: &Path) -> Result<MeasureConfig, LoadError> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|source| LoadError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;

    let config = if value.get(DECAY_LIMIT_KEY).is_some() || !has_native_keys(&value) {
        let tool: ToolConfig =
            serde_json::from_value(value).map_err(|source| LoadError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        MeasureConfig {
            decay_percent: tool
                .brightness_decay_limit
                .filter(|&limit| limit != 0.0)
                .unwrap_or(MeasureConfig::DEFAULT_DECAY_PERCENT),
            ..MeasureConfig::default()
        }
    } else {
        serde_json::from_value(value).map_err(|source| LoadError::Parse {
            path: origin.to_path_buf(),
            source,
        })?
    };

    config.validate()?;
    Ok(config)
}

/// Whether the JSON object uses [`MeasureConfig`]'s own field names.
fn has_native_keys(value: &serde_json::Value) -> bool {
    value.get("decay_percent").is_some() || value.get("max_prune_passes").is_some()
}

/// Read and parse a settings file.
///
/// # Errors
///
/// Returns [`LoadError::Read`] if the file cannot be read, otherwise as
/// [`parse_config`].
pub fn load_config(path: &Path) -> Result<MeasureConfig, LoadError> {
    let json = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&json, path)?;
    tracing::debug!(
        path = %path.display(),
        decay_percent = config.decay_percent,
        max_prune_passes = config.max_prune_passes,
        "settings loaded",
    );
    Ok(config)
}
