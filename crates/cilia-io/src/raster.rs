//! Raster loading, stage dumps, and annotated overlays.
//!
//! Source images are decoded from disk into RGB. Intermediate rasters
//! of a measurement can be written out as PNGs for inspection, and the
//! report can be drawn back onto the source image: filament boxes in
//! green, other detections in red.

use std::path::{Path, PathBuf};

use cilia_pipeline::types::{GrayImage, RgbImage};
use cilia_pipeline::{Contour, ReportRow, StagedMeasurement};
use image::{ImageEncoder, Luma, Rgb};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use crate::LoadError;

/// Outline colour of filament boxes.
pub const FILAMENT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Outline colour of non-filament boxes.
pub const OTHER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Outline thickness in pixels.
pub const OUTLINE_THICKNESS: u32 = 2;

/// Decode an image file into RGB.
///
/// # Errors
///
/// Returns [`LoadError::Image`] if the file cannot be opened or decoded.
pub fn load_rgb(path: &Path) -> Result<RgbImage, LoadError> {
    let image = image::open(path).map_err(|source| LoadError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image.to_rgb8())
}

/// Encode a `GrayImage` as PNG bytes.
///
/// # Errors
///
/// Returns an [`image::ImageError`] if PNG encoding fails.
pub fn encode_gray_png(image: &GrayImage) -> Result<Vec<u8>, image::ImageError> {
    let mut png_bytes = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut png_bytes);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::L8,
    )?;
    Ok(png_bytes)
}

/// Plot every point of an open path on a blank raster.
#[must_use]
pub fn plot_path(path: &Contour, width: u32, height: u32) -> GrayImage {
    let mut raster = GrayImage::new(width, height);
    for p in path.points() {
        if p.x < width && p.y < height {
            raster.put_pixel(p.x, p.y, Luma([255]));
        }
    }
    raster
}

/// Write the mask, cleaned mask, skeleton and final path of one
/// measurement as `<prefix>_<stage>.png` files in `dir`.
///
/// Returns the written paths in stage order.
///
/// # Errors
///
/// Returns [`LoadError::Write`] if encoding fails and
/// [`LoadError::WriteFile`] if a file cannot be written.
pub fn save_stages(
    dir: &Path,
    prefix: &str,
    staged: &StagedMeasurement,
) -> Result<Vec<PathBuf>, LoadError> {
    let (width, height) = staged.mask.dimensions();
    let path_raster = plot_path(&staged.path, width, height);
    let stages: [(&str, &GrayImage); 4] = [
        ("mask", &staged.mask),
        ("cleaned", &staged.cleaned),
        ("skeleton", &staged.skeleton),
        ("path", &path_raster),
    ];

    let mut written = Vec::with_capacity(stages.len());
    for (name, raster) in stages {
        let path = dir.join(format!("{prefix}_{name}.png"));
        let bytes = encode_gray_png(raster).map_err(|source| LoadError::Write {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, bytes).map_err(|source| LoadError::WriteFile {
            path: path.clone(),
            source,
        })?;
        written.push(path);
    }
    Ok(written)
}

/// Draw every report row's box onto a copy of `image`.
///
/// Only the outlines are drawn; ranks are not rendered as text. Boxes
/// with no area (rows whose measurement failed on an inverted
/// box) are skipped.
#[must_use]
pub fn annotate(image: &RgbImage, rows: &[ReportRow]) -> RgbImage {
    let mut canvas = image.clone();
    for row in rows {
        let color = if row.is_filament {
            FILAMENT_COLOR
        } else {
            OTHER_COLOR
        };
        for inset in 0..OUTLINE_THICKNESS {
            if let Some(rect) = inset_rect(row, inset) {
                draw_hollow_rect_mut(&mut canvas, rect, color);
            }
        }
    }
    canvas
}

/// The row's box shrunk by `inset` pixels on every side, if anything
/// is left.
fn inset_rect(row: &ReportRow, inset: u32) -> Option<Rect> {
    let width = row.bbox.width().checked_sub(2 * inset).filter(|&w| w > 0)?;
    let height = row.bbox.height().checked_sub(2 * inset).filter(|&h| h > 0)?;
    let x = i32::try_from(row.bbox.x1 + inset).ok()?;
    let y = i32::try_from(row.bbox.y1 + inset).ok()?;
    Some(Rect::at(x, y).of_size(width, height))
}

/// Write an RGB image to `path`; the format follows the extension.
///
/// # Errors
///
/// Returns [`LoadError::Write`] if encoding or writing fails.
pub fn save_rgb(image: &RgbImage, path: &Path) -> Result<(), LoadError> {
    image.save(path).map_err(|source| LoadError::Write {
        path: path.to_path_buf(),
        source,
    })
}
