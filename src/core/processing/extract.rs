//! Chip data extraction: read each planned window, mask no-data and keep only
//! chips that carry usable signal.
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::Array2;
use tracing::{debug, info};

use crate::core::georef::GeoTransform;
use crate::core::processing::grid::ChipGrid;
use crate::error::Result;
use crate::io::gdal::RasterSource;
use crate::types::{ChipSize, ChipWindow};

// Chips whose shorter side is below this fraction of the longer side are slivers.
const MIN_ASPECT_RATIO: f64 = 0.1;

/// Shared count of windows inspected so far, across workers.
#[derive(Debug, Clone, Default)]
pub struct ChipProgress {
    done: Arc<AtomicUsize>,
}

impl ChipProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self) -> usize {
        self.done.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn done(&self) -> usize {
        self.done.load(Ordering::Relaxed)
    }
}

/// A usable chip read from a raster, not yet persisted.
#[derive(Debug, Clone)]
pub struct RawChip {
    pub window: ChipWindow,
    /// Band values with no-data replaced by NaN
    pub data: Array2<f64>,
    /// Parent transform shifted to the window origin
    pub transform: GeoTransform,
}

impl RawChip {
    /// Geographic coordinate of the centre of the chip's first pixel.
    pub fn origin(&self) -> (f64, f64) {
        self.transform.apply(0.5, 0.5)
    }
}

/// Result of chipping one raster.
#[derive(Debug, Default)]
pub struct Extraction {
    pub chips: Vec<RawChip>,
    pub discarded: usize,
}

/// Replace every occurrence of the no-data sentinel with NaN.
pub fn mask_nodata(mut data: Array2<f64>, nodata: Option<f64>) -> Array2<f64> {
    if let Some(nd) = nodata {
        if nd.is_nan() {
            return data;
        }
        data.mapv_inplace(|v| if v == nd { f64::NAN } else { v });
    }
    data
}

/// A chip is usable when it has area, at least one finite value, a finite maximum
/// that is neither zero nor the sentinel, and a non-sliver shape.
pub fn is_usable(data: &Array2<f64>, nodata: Option<f64>) -> bool {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return false;
    }
    let max = data
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))));
    let Some(max) = max else {
        return false;
    };
    if max == 0.0 || Some(max) == nodata {
        return false;
    }
    let (short, long) = if rows < cols { (rows, cols) } else { (cols, rows) };
    (short as f64 / long as f64) >= MIN_ASPECT_RATIO
}

/// Read one window; `None` when the chip is discarded.
pub fn extract_window<R: RasterSource + ?Sized>(
    source: &R,
    window: &ChipWindow,
) -> Result<Option<RawChip>> {
    if window.is_empty() {
        return Ok(None);
    }
    let nodata = source.nodata();
    let data = mask_nodata(source.read_window(window)?, nodata);
    if !is_usable(&data, nodata) {
        return Ok(None);
    }
    Ok(Some(RawChip {
        window: *window,
        data,
        transform: source.georef().transform.window(window),
    }))
}

/// Plan the grid for `source` and extract every usable chip.
///
/// A read failure aborts the raster; discarded windows are only counted.
pub fn extract_chips<R: RasterSource + ?Sized>(
    source: &R,
    size: ChipSize,
    progress: &ChipProgress,
) -> Result<Extraction> {
    let bounds = source.georef().pixel_bounds();
    let grid = ChipGrid::new(bounds, size);
    let planned = grid.len();
    debug!("Planned {} windows over {:?}", planned, bounds);

    let mut out = Extraction {
        chips: Vec::with_capacity(planned),
        discarded: 0,
    };
    for window in grid {
        match extract_window(source, &window)? {
            Some(chip) => out.chips.push(chip),
            None => out.discarded += 1,
        }
        progress.advance();
    }
    info!(
        "Extracted {} chips ({} discarded) of {} planned",
        out.chips.len(),
        out.discarded,
        planned
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryRaster;
    use ndarray::s;

    #[test]
    fn test_mask_nodata() {
        let data = Array2::from_shape_vec((1, 3), vec![-9999.0, 0.5, -9999.0]).unwrap();
        let masked = mask_nodata(data, Some(-9999.0));
        assert!(masked[[0, 0]].is_nan());
        assert_eq!(masked[[0, 1]], 0.5);
    }

    #[test]
    fn test_usability_rules() {
        assert!(!is_usable(&Array2::zeros((0, 4)), None));
        assert!(!is_usable(&Array2::from_elem((4, 4), f64::NAN), None));
        assert!(!is_usable(&Array2::zeros((4, 4)), None));
        // Negative-only chips have a zero-free maximum and stay usable
        assert!(is_usable(&Array2::from_elem((4, 4), -0.3), None));
        // Sliver: 2 x 40
        assert!(!is_usable(&Array2::from_elem((2, 40), 0.4), None));
        assert!(is_usable(&Array2::from_elem((4, 40), 0.4), None));
    }

    #[test]
    fn test_nan_does_not_hide_finite_maximum() {
        let mut data = Array2::from_elem((4, 4), 0.2);
        data[[0, 0]] = f64::NAN;
        assert!(is_usable(&data, Some(-9999.0)));
    }

    #[test]
    fn test_nodata_quadrant_is_discarded() {
        // 512 x 512 with the top-left 256 quadrant entirely no-data
        let mut data = Array2::from_elem((512, 512), 0.35);
        data.slice_mut(s![0..256, 0..256]).fill(-9999.0);
        let raster = MemoryRaster::north_up(data, Some(-9999.0));
        let progress = ChipProgress::new();
        let out = extract_chips(&raster, ChipSize::square(256), &progress).unwrap();

        assert_eq!(out.chips.len(), 3);
        assert_eq!(out.discarded, 1);
        assert_eq!(progress.done(), 4);
        let offsets: Vec<_> = out
            .chips
            .iter()
            .map(|c| (c.window.row_off, c.window.col_off))
            .collect();
        assert_eq!(offsets, vec![(0, 256), (256, 0), (256, 256)]);
    }

    #[test]
    fn test_chip_transform_origin() {
        let raster = MemoryRaster::north_up(Array2::from_elem((40, 40), 1.0), None);
        let out = extract_chips(&raster, ChipSize::square(16), &ChipProgress::new()).unwrap();
        let last = out.chips.last().unwrap();
        assert_eq!((last.window.row_off, last.window.col_off), (32, 32));
        assert_eq!(last.origin(), (500_325.0, 4_199_675.0));
    }
}
