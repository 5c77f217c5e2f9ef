//! Contour tracing on binary rasters.
//!
//! Borders come from Suzuki-Abe border following
//! (`imageproc::contours::find_contours`). Only external borders are
//! kept: outer borders with no enclosing parent. Every border pixel is
//! kept (no chain approximation), so a one-pixel-wide line is traced
//! out and back along its length.

use image::{GrayImage, Luma};
use imageproc::contours::BorderType;

use crate::types::{Contour, FOREGROUND, Point};

/// Trace the external borders of every foreground component.
///
/// Any non-zero pixel counts as foreground. Contours are returned in
/// the order the tracer discovers them (raster order of each border's
/// first pixel).
#[must_use]
pub fn trace_external(raster: &GrayImage) -> Vec<Contour> {
    let contours: Vec<imageproc::contours::Contour<u32>> =
        imageproc::contours::find_contours(raster);

    contours
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| {
            let points = c.points.into_iter().map(|p| Point::new(p.x, p.y)).collect();
            Contour::new(points)
        })
        .collect()
}

/// The contour with the greatest open arc length.
///
/// On ties the earliest contour wins. Returns `None` for an empty input.
#[must_use]
pub fn longest(contours: Vec<Contour>) -> Option<Contour> {
    let mut best: Option<(f64, Contour)> = None;
    for contour in contours {
        let length = contour.arc_length();
        if best.as_ref().is_none_or(|(best_length, _)| length > *best_length) {
            best = Some((length, contour));
        }
    }
    best.map(|(_, contour)| contour)
}

/// Draw `contour` as a closed one-pixel polyline on a blank
/// `width × height` raster.
#[must_use = "returns the rendered raster"]
#[allow(clippy::cast_precision_loss)]
pub fn render(contour: &Contour, width: u32, height: u32) -> GrayImage {
    let mut raster = GrayImage::new(width, height);
    let points = contour.points();
    let to_f32 = |p: Point| (p.x as f32, p.y as f32);

    match points {
        [] => {}
        [only] => {
            if only.x < width && only.y < height {
                raster.put_pixel(only.x, only.y, Luma([FOREGROUND]));
            }
        }
        [first, .., last] => {
            for pair in points.windows(2) {
                imageproc::drawing::draw_line_segment_mut(
                    &mut raster,
                    to_f32(pair[0]),
                    to_f32(pair[1]),
                    Luma([FOREGROUND]),
                );
            }
            imageproc::drawing::draw_line_segment_mut(
                &mut raster,
                to_f32(*last),
                to_f32(*first),
                Luma([FOREGROUND]),
            );
        }
    }
    raster
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn filled_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }

    #[test]
    fn empty_image_produces_no_contours() {
        let img = GrayImage::new(10, 10);
        assert!(trace_external(&img).is_empty());
    }

    #[test]
    fn single_pixel_is_one_point_contour() {
        let mut img = GrayImage::new(10, 10);
        img.put_pixel(5, 5, Luma([255]));
        let contours = trace_external(&img);
        assert_eq!(contours.len(), 1);
        assert_eq!(contours[0].points(), &[Point::new(5, 5)]);
    }

    #[test]
    fn hole_is_not_reported() {
        // A ring: one outer border and one hole border.
        let mut img = filled_rect(20, 20, 4, 4, 16, 16);
        for y in 7..13 {
            for x in 7..13 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let contours = trace_external(&img);
        assert_eq!(contours.len(), 1);
        assert!(contours[0].points().contains(&Point::new(4, 4)));
    }

    #[test]
    fn blob_inside_hole_is_not_external() {
        let mut img = filled_rect(30, 30, 2, 2, 28, 28);
        for y in 6..24 {
            for x in 6..24 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        for y in 12..16 {
            for x in 12..16 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        assert_eq!(trace_external(&img).len(), 1);
    }

    #[test]
    fn separate_components_each_get_a_contour() {
        let mut img = filled_rect(30, 10, 2, 2, 6, 6);
        for y in 3..7 {
            for x in 20..25 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        assert_eq!(trace_external(&img).len(), 2);
    }

    #[test]
    fn one_pixel_line_is_traced_out_and_back() {
        let img = filled_rect(12, 5, 2, 2, 9, 3);
        let contours = trace_external(&img);
        assert_eq!(contours.len(), 1);
        let points = contours[0].points();
        // Seven pixels, the interior ones visited in both directions.
        assert!(points.len() >= 12);
        let mut distinct = points.to_vec();
        distinct.sort_unstable();
        distinct.dedup();
        assert_eq!(distinct, (2..9).map(|x| Point::new(x, 2)).collect::<Vec<_>>());
    }

    #[test]
    fn longest_picks_max_arc_length() {
        let short = Contour::new(vec![Point::new(0, 0), Point::new(3, 0)]);
        let long = Contour::new(vec![Point::new(0, 0), Point::new(0, 9)]);
        let picked = longest(vec![short, long.clone()]).unwrap();
        assert_eq!(picked, long);
    }

    #[test]
    fn longest_prefers_first_on_tie() {
        let a = Contour::new(vec![Point::new(0, 0), Point::new(4, 0)]);
        let b = Contour::new(vec![Point::new(0, 0), Point::new(0, 4)]);
        assert_eq!(longest(vec![a.clone(), b]).unwrap(), a);
    }

    #[test]
    fn longest_of_nothing_is_none() {
        assert!(longest(Vec::new()).is_none());
    }

    #[test]
    fn render_draws_closed_polyline() {
        let square = Contour::new(vec![
            Point::new(2, 2),
            Point::new(6, 2),
            Point::new(6, 6),
            Point::new(2, 6),
        ]);
        let img = render(&square, 10, 10);
        // Closing side from (2, 6) back to (2, 2).
        for y in 2..=6 {
            assert_eq!(img.get_pixel(2, y).0[0], 255);
            assert_eq!(img.get_pixel(6, y).0[0], 255);
        }
        assert_eq!(img.get_pixel(4, 4).0[0], 0);
        assert!(img.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn render_then_trace_recovers_line() {
        let img = filled_rect(15, 6, 3, 3, 12, 4);
        let traced = trace_external(&img);
        let rendered = render(&traced[0], 15, 6);
        assert_eq!(rendered, img);
    }

    #[test]
    fn render_single_point_and_empty() {
        let img = render(&Contour::new(vec![Point::new(1, 2)]), 4, 4);
        assert_eq!(img.get_pixel(1, 2).0[0], 255);
        assert_eq!(img.pixels().filter(|p| p.0[0] == 255).count(), 1);
        let blank = render(&Contour::default(), 4, 4);
        assert!(blank.pixels().all(|p| p.0[0] == 0));
    }
}
