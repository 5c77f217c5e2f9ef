//! Morphological cleanup of the binary mask.
//!
//! Wraps `imageproc::morphology`. The cleanup is a fixed three-step
//! sequence whose order matters:
//!
//! 1. opening with a 2×2 ellipse removes isolated speckle before
//!    anything is reconnected,
//! 2. dilation with a 3×3 rectangle bridges small gaps left behind,
//! 3. erosion with a 3×3 ellipse smooths the boundary.
//!
//! Masks are anchored at `(w / 2, h / 2)` and their offsets are applied
//! unreflected. Pixels outside the raster never participate, so borders
//! neither erode nor grow.

use image::{GrayImage, Luma};
use imageproc::morphology::{Mask, grayscale_dilate, grayscale_erode, grayscale_open};

use crate::types::{BACKGROUND, FOREGROUND};

/// An ellipse inscribed in a `width × height` box, as a 0/255 raster.
///
/// Row `i` spans `c ± round(c * sqrt(1 - (i - r)² / r²))` with
/// `r = height / 2` and `c = width / 2`, clipped to the box. For even
/// sizes this is lopsided: the 2×2 ellipse is `[[0, 1], [1, 1]]`.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]
pub fn ellipse_kernel(width: u8, height: u8) -> GrayImage {
    let r = i64::from(height / 2);
    let c = i64::from(width / 2);
    let inv_r2 = if r == 0 { 0.0 } else { 1.0 / (r * r) as f64 };

    GrayImage::from_fn(u32::from(width), u32::from(height), |j, i| {
        let dy = i64::from(i) - r;
        if dy.abs() > r {
            return Luma([BACKGROUND]);
        }
        let dx =
            (c as f64 * (((r * r - dy * dy) as f64) * inv_r2).sqrt()).round_ties_even() as i64;
        if (c - dx..=c + dx).contains(&i64::from(j)) {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// The elliptic mask of a `width × height` box, anchored at its centre.
#[must_use]
pub fn ellipse(width: u8, height: u8) -> Mask {
    Mask::from_image(&ellipse_kernel(width, height), width / 2, height / 2)
}

/// Denoise, reconnect, and smooth a binary mask.
///
/// Opening (2×2 ellipse) → dilation (3×3 rectangle) → erosion
/// (3×3 ellipse), one iteration each. Reordering changes results.
#[must_use = "returns the cleaned mask"]
pub fn clean(mask: &GrayImage) -> GrayImage {
    let denoised = grayscale_open(mask, &ellipse(2, 2));
    let bridged = grayscale_dilate(&denoised, &Mask::square(1));
    grayscale_erode(&bridged, &ellipse(3, 3))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use imageproc::gray_image;

    use super::*;

    fn cells(kernel: &GrayImage) -> Vec<Vec<u8>> {
        (0..kernel.height())
            .map(|i| {
                (0..kernel.width())
                    .map(|j| u8::from(kernel.get_pixel(j, i).0[0] == FOREGROUND))
                    .collect()
            })
            .collect()
    }

    fn filled_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    fn count_foreground(img: &GrayImage) -> usize {
        img.pixels().filter(|p| p.0[0] == 255).count()
    }

    #[test]
    fn ellipse_2x2_is_lopsided() {
        assert_eq!(cells(&ellipse_kernel(2, 2)), vec![vec![0, 1], vec![1, 1]]);
        assert_eq!(ellipse(2, 2), Mask::from_image(&gray_image!(0, 255; 255, 255), 1, 1));
    }

    #[test]
    fn ellipse_3x3_is_a_cross() {
        assert_eq!(
            cells(&ellipse_kernel(3, 3)),
            vec![vec![0, 1, 0], vec![1, 1, 1], vec![0, 1, 0]]
        );
        assert_eq!(ellipse(3, 3), Mask::diamond(1));
    }

    #[test]
    fn ellipse_5x5() {
        assert_eq!(
            cells(&ellipse_kernel(5, 5)),
            vec![
                vec![0, 0, 1, 0, 0],
                vec![1, 1, 1, 1, 1],
                vec![1, 1, 1, 1, 1],
                vec![1, 1, 1, 1, 1],
                vec![0, 0, 1, 0, 0],
            ]
        );
    }

    #[test]
    fn erode_2x2_looks_up_and_left() {
        // The 2x2 ellipse anchors at (1, 1): a pixel survives erosion
        // only when its north and west neighbours are also set.
        let img = filled_rect(6, 6, 1, 1, 4, 4);
        let eroded = grayscale_erode(&img, &ellipse(2, 2));
        assert_eq!(eroded.get_pixel(1, 1).0[0], 0);
        assert_eq!(eroded.get_pixel(2, 1).0[0], 0);
        assert_eq!(eroded.get_pixel(2, 2).0[0], 255);
        assert_eq!(eroded.get_pixel(3, 3).0[0], 255);
        assert_eq!(count_foreground(&eroded), 4);
    }

    #[test]
    fn opening_removes_isolated_speckle() {
        let mut img = GrayImage::new(9, 9);
        img.put_pixel(4, 4, Luma([255]));
        img.put_pixel(1, 7, Luma([255]));
        let opened = grayscale_open(&img, &ellipse(2, 2));
        assert_eq!(count_foreground(&opened), 0);
    }

    #[test]
    fn opening_with_lopsided_element_shifts_thick_bar() {
        // Erosion trims the top row and left column, dilation with the
        // same (unreflected) offsets grows the bottom row and right
        // column: the bar survives intact, moved one pixel down-right.
        let img = filled_rect(12, 8, 2, 2, 10, 5);
        let opened = grayscale_open(&img, &ellipse(2, 2));
        assert_eq!(opened, filled_rect(12, 8, 3, 3, 11, 6));
    }

    #[test]
    fn raster_border_does_not_erode() {
        let img = GrayImage::from_pixel(4, 4, Luma([255]));
        let eroded = grayscale_erode(&img, &ellipse(3, 3));
        assert_eq!(eroded, img);
    }

    #[test]
    fn dilate_grows_by_element() {
        let mut img = GrayImage::new(5, 5);
        img.put_pixel(2, 2, Luma([255]));
        assert_eq!(count_foreground(&grayscale_dilate(&img, &Mask::square(1))), 9);
        assert_eq!(count_foreground(&grayscale_dilate(&img, &ellipse(3, 3))), 5);
    }

    #[test]
    fn clean_bridges_single_pixel_gap() {
        // A thick bar with a one-column break at x = 10.
        let mut img = filled_rect(24, 12, 2, 4, 22, 8);
        for y in 4..8 {
            img.put_pixel(10, y, Luma([0]));
        }
        let cleaned = clean(&img);
        assert_eq!(cleaned.get_pixel(10, 6).0[0], 255);
    }

    #[test]
    fn clean_of_empty_mask_is_empty() {
        let img = GrayImage::new(15, 10);
        let cleaned = clean(&img);
        assert_eq!(cleaned.dimensions(), (15, 10));
        assert_eq!(count_foreground(&cleaned), 0);
    }

    #[test]
    fn clean_output_stays_binary() {
        let img = filled_rect(20, 20, 3, 3, 17, 9);
        assert!(clean(&img).pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }
}
