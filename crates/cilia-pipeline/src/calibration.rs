//! Calibration metadata: the physical size of a source image.
//!
//! Microscope exports ship a sidecar XML document next to each image.
//! Somewhere in its tree an element named `ContourSize` holds the
//! physical `width,height` of the full frame. This module parses that
//! document from an in-memory string; locating and reading the sidecar
//! file is left to `cilia-io`.

use quick_xml::Reader;
use quick_xml::events::Event;
use serde::{Deserialize, Serialize};

/// Element that carries the physical frame size.
pub const CONTOUR_SIZE_ELEMENT: &[u8] = b"ContourSize";

/// Physical dimensions of a source image in a consistent real-world
/// unit. Only [`height`](Self::height) is used for scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Physical width of the frame.
    pub width: f64,
    /// Physical height of the frame.
    pub height: f64,
}

impl Calibration {
    /// Create a new calibration record.
    #[must_use]
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Errors raised while parsing calibration metadata.
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// The document is not well-formed XML.
    #[error("malformed calibration metadata: {0}")]
    MalformedMetadata(String),

    /// A `ContourSize` token is not a finite number.
    #[error("invalid ContourSize value {text:?}: expected a number")]
    InvalidValue {
        /// The offending token, as written.
        text: String,
    },

    /// `ContourSize` does not hold exactly a width and a height.
    #[error("ContourSize must hold exactly 2 values (width,height), found {count}")]
    WrongArity {
        /// Number of comma-separated tokens found.
        count: usize,
    },
}

/// Parse the first `ContourSize` element of a metadata document.
///
/// Returns `Ok(None)` when the document has no `ContourSize` element.
/// Only the element's own text is read; text inside nested child
/// elements is ignored.
///
/// # Errors
///
/// Returns [`CalibrationError::MalformedMetadata`] if the XML cannot be
/// read, [`CalibrationError::InvalidValue`] if any comma-separated token
/// is not a finite number (an empty element counts as one empty token),
/// and [`CalibrationError::WrongArity`] if the element does not hold
/// exactly two values.
pub fn parse_contour_size(xml: &str) -> Result<Option<Calibration>, CalibrationError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    // Nesting depth below the ContourSize element once it is found.
    let mut depth: Option<usize> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                if let Some(d) = depth {
                    depth = Some(d + 1);
                } else if e.name().as_ref() == CONTOUR_SIZE_ELEMENT {
                    depth = Some(0);
                }
            }
            Ok(Event::Empty(e)) if depth.is_none() && e.name().as_ref() == CONTOUR_SIZE_ELEMENT => {
                return parse_values("").map(Some);
            }
            Ok(Event::Text(t)) if depth == Some(0) => {
                let unescaped = t
                    .unescape()
                    .map_err(|e| CalibrationError::MalformedMetadata(e.to_string()))?;
                text.push_str(&unescaped);
            }
            Ok(Event::CData(c)) if depth == Some(0) => {
                text.push_str(&String::from_utf8_lossy(&c));
            }
            Ok(Event::End(_)) => match depth {
                Some(0) => return parse_values(&text).map(Some),
                Some(d) => depth = Some(d - 1),
                None => {}
            },
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(CalibrationError::MalformedMetadata(e.to_string())),
        }
    }

    if depth.is_some() {
        return Err(CalibrationError::MalformedMetadata(
            "unexpected end of document inside ContourSize".to_string(),
        ));
    }
    Ok(None)
}

/// Parse `"<width>,<height>"` into a calibration record.
///
/// Every token is checked before the arity so that a bad number is
/// reported as such even when the count is also wrong.
fn parse_values(text: &str) -> Result<Calibration, CalibrationError> {
    let values = text
        .split(',')
        .map(|token| {
            let trimmed = token.trim();
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| CalibrationError::InvalidValue {
                    text: trimmed.to_string(),
                })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    match values.as_slice() {
        &[width, height] => Ok(Calibration { width, height }),
        other => Err(CalibrationError::WrongArity { count: other.len() }),
    }
}
