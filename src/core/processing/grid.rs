//! Chip grid planning: row-major windows over a raster's pixel bounds.
use crate::types::{ChipSize, ChipWindow, PixelBounds};

/// Lazy row-major iterator of chip windows.
///
/// Windows stride by the nominal chip size from `(rmin, cmin)`; windows on the
/// last row/column are clipped to the remaining extent. Non-positive chip sizes
/// or empty bounds yield nothing.
#[derive(Debug, Clone)]
pub struct ChipGrid {
    bounds: PixelBounds,
    width: i64,
    height: i64,
    row: i64,
    col: i64,
}

impl ChipGrid {
    pub fn new(bounds: PixelBounds, size: ChipSize) -> Self {
        let (width, height) = size.resolve(&bounds);
        Self {
            bounds,
            width,
            height,
            row: bounds.rmin,
            col: bounds.cmin,
        }
    }

    fn is_degenerate(&self) -> bool {
        self.width <= 0 || self.height <= 0 || self.bounds.rows() <= 0 || self.bounds.cols() <= 0
    }

    fn remaining(&self) -> usize {
        if self.is_degenerate() || self.row >= self.bounds.rmax {
            return 0;
        }
        let cols_per_row = div_ceil(self.bounds.cols(), self.width);
        let rows_left = div_ceil(self.bounds.rmax - self.row, self.height);
        let cols_done = (self.col - self.bounds.cmin) / self.width;
        (rows_left * cols_per_row - cols_done) as usize
    }
}

fn div_ceil(a: i64, b: i64) -> i64 {
    a / b + i64::from(a % b != 0)
}

impl Iterator for ChipGrid {
    type Item = ChipWindow;

    fn next(&mut self) -> Option<ChipWindow> {
        if self.is_degenerate() || self.row >= self.bounds.rmax {
            return None;
        }
        let window = ChipWindow {
            row_off: self.row as usize,
            col_off: self.col as usize,
            width: self.width.min(self.bounds.cmax - self.col) as usize,
            height: self.height.min(self.bounds.rmax - self.row) as usize,
        };
        self.col = self.col.saturating_add(self.width);
        if self.col >= self.bounds.cmax {
            self.col = self.bounds.cmin;
            self.row = self.row.saturating_add(self.height);
        }
        Some(window)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}

impl ExactSizeIterator for ChipGrid {}

impl std::iter::FusedIterator for ChipGrid {}
