//! Branch pruning: reduce a skeleton contour to its main arc.
//!
//! A skeleton with side spurs has junction pixels where three or more
//! arcs meet. Removing those pixels splits the skeleton into separate
//! arcs; the longest one is the main arc. Removing a junction can expose
//! a new one, so the prune is repeated a bounded number of times on the
//! re-rendered arc.
//!
//! The traced border of a one-pixel arc walks out and back, visiting
//! most pixels twice. [`single_direction_path`] folds it into one pass
//! so its arc length is the length of the arc itself.

use std::collections::HashSet;

use image::GrayImage;

use crate::contour;
use crate::types::{BACKGROUND, Contour, FOREGROUND, MeasureError, Point};

/// Kernel weight of the centre pixel.
const CENTRE_WEIGHT: u32 = 10;

/// Minimum response of a junction pixel: the centre plus at least three
/// foreground neighbours.
const BRANCH_RESPONSE: u32 = (CENTRE_WEIGHT + 3) * FOREGROUND as u32;

/// Result of the bounded pruning loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pruned {
    /// The surviving main arc, still in traced (out-and-back) form.
    pub arc: Contour,
    /// Branch points found by each pass that found any, in pass order.
    pub branch_points: Vec<Vec<Point>>,
}

/// Mirror an out-of-range index back into `0..n` without repeating the
/// edge pixel (`-1 → 1`, `n → n - 2`).
const fn reflect_101(i: i64, n: i64) -> i64 {
    if n == 1 {
        0
    } else if i < 0 {
        -i
    } else if i >= n {
        2 * n - 2 - i
    } else {
        i
    }
}

/// Locate junction pixels of a binary skeleton.
///
/// Correlates the raster with a 3×3 kernel (10 at the centre, 1 on each
/// neighbour, mirrored border) and reports every pixel whose response is
/// at least `13 × 255`: a foreground pixel with three or more foreground
/// neighbours. Points are returned in raster order.
///
/// # Errors
///
/// Returns [`MeasureError::NonBinaryRaster`] if any pixel is neither
/// 0 nor 255.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn find_branch_points(skeleton: &GrayImage) -> Result<Vec<Point>, MeasureError> {
    if let Some(&value) = skeleton
        .as_raw()
        .iter()
        .find(|&&v| v != FOREGROUND && v != BACKGROUND)
    {
        return Err(MeasureError::NonBinaryRaster { value });
    }

    let (w, h) = (i64::from(skeleton.width()), i64::from(skeleton.height()));
    let value_at = |x: i64, y: i64| {
        let (x, y) = (reflect_101(x, w), reflect_101(y, h));
        u32::from(skeleton.get_pixel(x as u32, y as u32).0[0])
    };

    let mut branches = Vec::new();
    for (x, y, pixel) in skeleton.enumerate_pixels() {
        if pixel.0[0] == BACKGROUND {
            continue;
        }
        let (cx, cy) = (i64::from(x), i64::from(y));
        let mut response = CENTRE_WEIGHT * u32::from(pixel.0[0]);
        for dy in -1..=1 {
            for dx in -1..=1 {
                if dx != 0 || dy != 0 {
                    response += value_at(cx + dx, cy + dy);
                }
            }
        }
        if response >= BRANCH_RESPONSE {
            branches.push(Point::new(x, y));
        }
    }
    Ok(branches)
}

/// Remove `branch_points` from a copy of `skeleton` and return the
/// longest remaining external contour.
///
/// Returns `None` when nothing is left to trace.
#[must_use]
pub fn select_main_arc(skeleton: &GrayImage, branch_points: &[Point]) -> Option<Contour> {
    let mut pruned = skeleton.clone();
    for p in branch_points {
        pruned.put_pixel(p.x, p.y, image::Luma([BACKGROUND]));
    }
    contour::longest(contour::trace_external(&pruned))
}

/// Fold a traced out-and-back border into a single-direction path.
///
/// When the first point equals the second-to-last one the sequence is
/// reversed first. Then every distinct point is kept once, at its
/// earliest occurrence, in traversal order.
#[must_use]
pub fn single_direction_path(contour: &Contour) -> Contour {
    let mut points = contour.points().to_vec();
    if points.len() >= 2 && points[0] == points[points.len() - 2] {
        points.reverse();
    }

    let mut seen = HashSet::with_capacity(points.len());
    points.retain(|p| seen.insert(*p));
    Contour::new(points)
}

/// Repeatedly render `raw`, find its junctions, and keep the longest
/// arc between them.
///
/// Runs at most `max_passes` passes and stops early once a pass finds no
/// junction. A pass that leaves nothing to trace keeps the previous arc.
///
/// # Errors
///
/// Returns [`MeasureError::NonBinaryRaster`] if a rendered raster is not
/// binary.
pub fn prune(
    raw: Contour,
    width: u32,
    height: u32,
    max_passes: usize,
) -> Result<Pruned, MeasureError> {
    let mut arc = raw;
    let mut branch_points = Vec::new();

    for _ in 0..max_passes {
        let rendered = contour::render(&arc, width, height);
        let branches = find_branch_points(&rendered)?;
        if branches.is_empty() {
            break;
        }
        let next = select_main_arc(&rendered, &branches);
        branch_points.push(branches);
        match next {
            Some(main) => arc = main,
            None => break,
        }
    }

    Ok(Pruned { arc, branch_points })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::f64::consts::SQRT_2;

    use image::Luma;

    use super::*;

    /// A "Y": a vertical stem of 15 pixels above the junction at
    /// (20, 20), a short arm of 10 pixels down-left and a long arm of 15
    /// pixels down-right.
    fn y_skeleton() -> GrayImage {
        let mut img = GrayImage::new(40, 40);
        img.put_pixel(20, 20, Luma([255]));
        for i in 1..=15 {
            img.put_pixel(20, 20 - i, Luma([255]));
        }
        for i in 1..=10 {
            img.put_pixel(20 - i, 20 + i, Luma([255]));
        }
        for i in 1..=15 {
            img.put_pixel(20 + i, 20 + i, Luma([255]));
        }
        img
    }

    /// A "Y" with three arms of 12 pixels around the junction at
    /// (20, 20): up, down-left and down-right.
    fn equal_y_skeleton() -> GrayImage {
        let mut img = GrayImage::new(40, 40);
        img.put_pixel(20, 20, Luma([255]));
        for i in 1..=12 {
            img.put_pixel(20, 20 - i, Luma([255]));
            img.put_pixel(20 - i, 20 + i, Luma([255]));
            img.put_pixel(20 + i, 20 + i, Luma([255]));
        }
        img
    }

    #[test]
    fn reflect_101_mirrors_without_repeating_edge() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(2, 5), 2);
        assert_eq!(reflect_101(-1, 1), 0);
    }

    #[test]
    fn y_has_exactly_one_branch_point() {
        let branches = find_branch_points(&y_skeleton()).unwrap();
        assert_eq!(branches, vec![Point::new(20, 20)]);
    }

    #[test]
    fn straight_line_has_no_branch_points() {
        let img = GrayImage::from_fn(20, 5, |x, y| {
            if y == 2 && (3..17).contains(&x) {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        assert!(find_branch_points(&img).unwrap().is_empty());
    }

    #[test]
    fn line_ending_on_raster_edge_is_not_a_branch() {
        // The mirrored border doubles the inner neighbour of an edge
        // endpoint: 10 + 2 neighbours stays below the junction response.
        let img = GrayImage::from_fn(10, 3, |_, y| if y == 1 { Luma([255]) } else { Luma([0]) });
        assert!(find_branch_points(&img).unwrap().is_empty());
    }

    #[test]
    fn background_pixels_are_never_branches() {
        // A background pixel surrounded by eight foreground pixels.
        let mut img = GrayImage::from_pixel(5, 5, Luma([0]));
        for y in 1..4 {
            for x in 1..4 {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        img.put_pixel(2, 2, Luma([0]));
        let branches = find_branch_points(&img).unwrap();
        assert!(!branches.contains(&Point::new(2, 2)));
    }

    #[test]
    fn non_binary_raster_is_rejected() {
        let mut img = GrayImage::new(4, 4);
        img.put_pixel(1, 1, Luma([1]));
        assert!(matches!(
            find_branch_points(&img),
            Err(MeasureError::NonBinaryRaster { value: 1 })
        ));
    }

    #[test]
    fn doubled_trace_normalizes_to_half_length() {
        // Out along the x axis to (5, 0) and back to the start.
        let mut points: Vec<Point> = (0..=5).map(|x| Point::new(x, 0)).collect();
        points.extend((0..5).rev().map(|x| Point::new(x, 0)));
        let doubled = Contour::new(points);
        assert!((doubled.arc_length() - 10.0).abs() < f64::EPSILON);

        let path = single_direction_path(&doubled);
        assert_eq!(path.len(), 6);
        assert!((path.arc_length() - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn path_is_reversed_when_start_repeats_second_to_last() {
        let contour = Contour::new(vec![
            Point::new(3, 0),
            Point::new(2, 0),
            Point::new(1, 0),
            Point::new(3, 0),
            Point::new(4, 0),
        ]);
        let path = single_direction_path(&contour);
        assert_eq!(
            path.points(),
            &[
                Point::new(4, 0),
                Point::new(3, 0),
                Point::new(1, 0),
                Point::new(2, 0),
            ]
        );
    }

    #[test]
    fn short_paths_are_untouched() {
        assert!(single_direction_path(&Contour::default()).is_empty());
        let one = Contour::new(vec![Point::new(1, 1)]);
        assert_eq!(single_direction_path(&one), one);
    }

    #[test]
    fn main_arc_is_the_longest_arm() {
        let skeleton = y_skeleton();
        let branches = find_branch_points(&skeleton).unwrap();
        let arc = select_main_arc(&skeleton, &branches).unwrap();
        assert!(arc.points().contains(&Point::new(35, 35)));
        let path = single_direction_path(&arc);
        assert!((path.arc_length() - 14.0 * SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn main_arc_of_all_junctions_is_none() {
        let mut img = GrayImage::new(3, 3);
        img.put_pixel(1, 1, Luma([255]));
        assert!(select_main_arc(&img, &[Point::new(1, 1)]).is_none());
    }

    #[test]
    fn prune_keeps_longest_arm_and_stops_when_clean() {
        let raw = contour::longest(contour::trace_external(&y_skeleton())).unwrap();
        let pruned = prune(raw, 40, 40, 2).unwrap();
        assert_eq!(pruned.branch_points, vec![vec![Point::new(20, 20)]]);
        let path = single_direction_path(&pruned.arc);
        assert!((path.arc_length() - 14.0 * SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn prune_of_clean_arc_is_a_no_op() {
        let line = Contour::new((2..12).map(|x| Point::new(x, 4)).collect());
        let pruned = prune(line.clone(), 16, 8, 2).unwrap();
        assert_eq!(pruned.arc, line);
        assert!(pruned.branch_points.is_empty());
    }

    #[test]
    fn equal_arms_keep_the_first_traced_diagonal() {
        let skeleton = equal_y_skeleton();
        assert_eq!(find_branch_points(&skeleton).unwrap(), vec![Point::new(20, 20)]);

        let raw = contour::longest(contour::trace_external(&skeleton)).unwrap();
        let pruned = prune(raw, 40, 40, 2).unwrap();
        assert_eq!(pruned.branch_points, vec![vec![Point::new(20, 20)]]);

        // Both diagonals outrun the stem and tie with each other; the
        // down-left arm starts earlier in raster order.
        let path = single_direction_path(&pruned.arc);
        assert_eq!(path.len(), 12);
        assert!(path.points().contains(&Point::new(8, 32)));
        assert!(!path.points().contains(&Point::new(32, 32)));
        assert!((path.arc_length() - 11.0 * SQRT_2).abs() < 1e-9);
    }

    #[test]
    fn prune_respects_pass_limit() {
        let raw = contour::longest(contour::trace_external(&y_skeleton())).unwrap();
        let pruned = prune(raw, 40, 40, 1).unwrap();
        assert_eq!(pruned.branch_points.len(), 1);
    }
}
