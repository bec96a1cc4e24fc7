//! Affine pixel↔geographic transforms and the `GeoIndex` lookup seam.
//!
//! Coefficients follow GDAL's order `[origin_x, pixel_width, rot_x, origin_y, rot_y,
//! pixel_height]`, i.e. `x = gt0 + col*gt1 + row*gt2` and `y = gt3 + col*gt4 + row*gt5`.
use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::types::{ChipWindow, PixelBounds};

// Fractional indices this close to an integer snap to it before flooring.
const INDEX_EPSILON: f64 = 1e-9;

/// A GDAL-ordered affine geotransform.
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct GeoTransform(pub [f64; 6]);

impl GeoTransform {
    pub fn identity() -> Self {
        GeoTransform([0.0, 1.0, 0.0, 0.0, 0.0, 1.0])
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Map a (col, row) pixel position to geographic (x, y).
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let gt = &self.0;
        (
            gt[0] + col * gt[1] + row * gt[2],
            gt[3] + col * gt[4] + row * gt[5],
        )
    }

    /// Inverse transform, `None` when the matrix is singular.
    pub fn invert(&self) -> Option<GeoTransform> {
        let gt = &self.0;
        let det = gt[1] * gt[5] - gt[2] * gt[4];
        if det.abs() < f64::EPSILON * (gt[1].abs() + gt[5].abs()).max(1.0) * 1e-6 || det == 0.0 {
            return None;
        }
        let inv_det = 1.0 / det;
        let a = gt[5] * inv_det;
        let b = -gt[2] * inv_det;
        let d = -gt[4] * inv_det;
        let e = gt[1] * inv_det;
        Some(GeoTransform([
            -gt[0] * a - gt[3] * b,
            a,
            b,
            -gt[0] * d - gt[3] * e,
            d,
            e,
        ]))
    }

    /// Transform of a window: same coefficients, origin moved to the window's
    /// top-left pixel.
    pub fn window(&self, window: &ChipWindow) -> GeoTransform {
        let (x0, y0) = self.apply(window.col_off as f64, window.row_off as f64);
        let mut gt = self.0;
        gt[0] = x0;
        gt[3] = y0;
        GeoTransform(gt)
    }

    /// Geographic polygon through the four pixel corners of a `width` x `height` grid.
    pub fn footprint(&self, width: usize, height: usize) -> Polygon<f64> {
        let (w, h) = (width as f64, height as f64);
        let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h), (0.0, 0.0)];
        let ring: Vec<Coord<f64>> = corners
            .iter()
            .map(|&(c, r)| {
                let (x, y) = self.apply(c, r);
                Coord { x, y }
            })
            .collect();
        Polygon::new(LineString::new(ring), vec![])
    }
}

/// Pixel↔geographic lookup over a raster of known size.
///
/// `index` follows the raster convention of returning `(row, col)`; consumers that
/// need image `(x, y)` order reverse it themselves.
pub trait GeoIndex {
    /// (row, col) of the pixel containing geographic point (x, y).
    fn index(&self, x: f64, y: f64) -> (i64, i64);
    /// Geographic coordinate of the centre of pixel (row, col).
    fn xy(&self, row: f64, col: f64) -> (f64, f64);
    fn width(&self) -> usize;
    fn height(&self) -> usize;
}

/// Georeferencing of one raster: transform, its inverse, pixel size and CRS.
#[derive(Clone, Debug)]
pub struct Georef {
    pub transform: GeoTransform,
    inverse: GeoTransform,
    pub width: usize,
    pub height: usize,
    /// Projection as `EPSG:n` when an authority code is known, WKT otherwise
    pub projection: String,
}

impl Georef {
    /// Build from a transform; a singular transform falls back to the identity
    /// inverse so lookups stay total.
    pub fn new(
        transform: GeoTransform,
        width: usize,
        height: usize,
        projection: impl Into<String>,
    ) -> Self {
        let inverse = transform.invert().unwrap_or_else(GeoTransform::identity);
        Self {
            transform,
            inverse,
            width,
            height,
            projection: projection.into(),
        }
    }

    /// Georef of a window of this raster.
    pub fn window(&self, window: &ChipWindow) -> Georef {
        Georef::new(
            self.transform.window(window),
            window.width,
            window.height,
            self.projection.clone(),
        )
    }

    /// Geographic footprint of the whole raster.
    pub fn footprint(&self) -> Polygon<f64> {
        self.transform.footprint(self.width, self.height)
    }

    /// Geographic bounds `(left, bottom, right, top)` over the four corners.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let (w, h) = (self.width as f64, self.height as f64);
        let corners = [
            self.transform.apply(0.0, 0.0),
            self.transform.apply(w, 0.0),
            self.transform.apply(w, h),
            self.transform.apply(0.0, h),
        ];
        let mut bounds = (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            bounds.0 = bounds.0.min(x);
            bounds.1 = bounds.1.min(y);
            bounds.2 = bounds.2.max(x);
            bounds.3 = bounds.3.max(y);
        }
        bounds
    }

    /// Pixel bounds from looking up the top-left and bottom-right geographic
    /// corners independently and reconciling them, clamped to the raster extent.
    pub fn pixel_bounds(&self) -> PixelBounds {
        let (left, bottom, right, top) = self.bounds();
        let (r0, c0) = self.index(left, top);
        let (r1, c1) = self.index(right, bottom);
        let clamp_r = |v: i64| v.clamp(0, self.height as i64);
        let clamp_c = |v: i64| v.clamp(0, self.width as i64);
        PixelBounds {
            rmin: clamp_r(r0.min(r1)),
            cmin: clamp_c(c0.min(c1)),
            rmax: clamp_r(r0.max(r1)),
            cmax: clamp_c(c0.max(c1)),
        }
    }
}

fn floor_index(v: f64) -> i64 {
    let nearest = v.round();
    if (v - nearest).abs() < INDEX_EPSILON {
        nearest as i64
    } else {
        v.floor() as i64
    }
}

impl GeoIndex for Georef {
    fn index(&self, x: f64, y: f64) -> (i64, i64) {
        let (col, row) = self.inverse.apply(x, y);
        (floor_index(row), floor_index(col))
    }

    fn xy(&self, row: f64, col: f64) -> (f64, f64) {
        self.transform.apply(col + 0.5, row + 0.5)
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }
}
