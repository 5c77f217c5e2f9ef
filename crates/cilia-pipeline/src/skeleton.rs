//! Skeletonization: thin the cleaned mask to a one-pixel-wide centreline.
//!
//! Uses the two-subiteration parallel thinning of Guo and Hall (1989).
//! Each subiteration deletes, in parallel, every foreground pixel whose
//! 8-neighbourhood satisfies
//!
//! - **G1** exactly one 4-connected run of background leads into a
//!   foreground neighbour (the pixel is simple),
//! - **G2** `min(n1, n2)` is 2 or 3 (the pixel is not an endpoint and
//!   not inside a thick region),
//! - **G3** (first subiteration) or **G3'** (second) so that opposite
//!   borders are peeled alternately.
//!
//! Iteration stops once neither subiteration deletes anything. The result
//! keeps the 8-connectivity of every component and has no 4-connected
//! staircase corners, so branch detection sees junctions only where arcs
//! really meet.

use image::{GrayImage, Luma};

use crate::types::{BACKGROUND, FOREGROUND};

/// Neighbour order used for the 8-bit neighbourhood code: bit `i` is set
/// when neighbour `x(i+1)` is foreground, starting east and turning
/// counter-clockwise (E, NE, N, NW, W, SW, S, SE).
const NEIGHBOURS: [(i64, i64); 8] = [
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Deletion table for the first subiteration.
const FIRST_PASS: [bool; 256] = deletion_table(false);

/// Deletion table for the second subiteration.
const SECOND_PASS: [bool; 256] = deletion_table(true);

/// Whether bit `i` of a neighbourhood code is set (`x(i+1)` in the paper).
const fn bit(code: usize, i: usize) -> bool {
    (code >> (i % 8)) & 1 == 1
}

/// Build the deletion table for one subiteration.
const fn deletion_table(second: bool) -> [bool; 256] {
    let mut table = [false; 256];
    let mut code = 0;
    while code < 256 {
        // G1: crossing number.
        let mut crossings = 0;
        let mut i = 0;
        while i < 8 {
            if !bit(code, i) && (bit(code, i + 1) || bit(code, i + 2)) {
                crossings += 1;
            }
            i += 2;
        }

        // G2: endpoint / interior check.
        let mut n1 = 0;
        let mut n2 = 0;
        let mut k = 1;
        while k < 8 {
            if bit(code, k) || bit(code, k - 1) {
                n1 += 1;
            }
            if bit(code, k) || bit(code, k + 1) {
                n2 += 1;
            }
            k += 2;
        }
        let m = if n1 < n2 { n1 } else { n2 };

        // G3 / G3': directional peeling.
        let g3 = if second {
            !((bit(code, 5) || bit(code, 6) || !bit(code, 3)) && bit(code, 4))
        } else {
            !((bit(code, 1) || bit(code, 2) || !bit(code, 7)) && bit(code, 0))
        };

        table[code] = crossings == 1 && (m == 2 || m == 3) && g3;
        code += 1;
    }
    table
}

/// Foreground membership grid with an implicit background border.
struct Grid {
    width: u32,
    height: u32,
    cells: Vec<bool>,
}

impl Grid {
    fn from_mask(mask: &GrayImage) -> Self {
        Self {
            width: mask.width(),
            height: mask.height(),
            cells: mask.pixels().map(|p| p.0[0] != BACKGROUND).collect(),
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        self.cells[(y as usize) * (self.width as usize) + x as usize]
    }

    fn code(&self, x: u32, y: u32) -> usize {
        NEIGHBOURS
            .iter()
            .enumerate()
            .filter(|&(_, &(dx, dy))| self.get(i64::from(x) + dx, i64::from(y) + dy))
            .fold(0, |code, (i, _)| code | (1 << i))
    }

    /// Run one parallel subiteration. Returns `true` if anything was
    /// deleted.
    fn subiteration(&mut self, table: &[bool; 256]) -> bool {
        let doomed: Vec<usize> = (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter_map(|(x, y)| {
                let index = (y as usize) * (self.width as usize) + x as usize;
                (self.cells[index] && table[self.code(x, y)]).then_some(index)
            })
            .collect();
        for &index in &doomed {
            self.cells[index] = false;
        }
        !doomed.is_empty()
    }

    fn into_image(self) -> GrayImage {
        let raw = self
            .cells
            .iter()
            .map(|&set| if set { FOREGROUND } else { BACKGROUND })
            .collect();
        GrayImage::from_raw(self.width, self.height, raw)
            .unwrap_or_else(|| GrayImage::from_pixel(self.width, self.height, Luma([BACKGROUND])))
    }
}

/// Thin a binary mask to its one-pixel-wide skeleton.
///
/// Any non-zero input pixel counts as foreground; the output is strictly
/// `{0, 255}` with the input's dimensions. Deterministic: the same mask
/// always yields the same skeleton.
#[must_use = "returns the skeleton"]
pub fn skeletonize(mask: &GrayImage) -> GrayImage {
    let mut grid = Grid::from_mask(mask);
    loop {
        let first = grid.subiteration(&FIRST_PASS);
        let second = grid.subiteration(&SECOND_PASS);
        if !first && !second {
            break;
        }
    }
    grid.into_image()
}
