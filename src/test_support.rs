//! In-memory fixtures shared by unit tests.
use ndarray::{Array2, s};

use crate::core::georef::{GeoTransform, Georef};
use crate::error::{Error, Result};
use crate::io::gdal::RasterSource;
use crate::types::ChipWindow;

pub struct MemoryRaster {
    pub data: Array2<f64>,
    pub nodata: Option<f64>,
    georef: Georef,
}

impl MemoryRaster {
    pub fn new(data: Array2<f64>, transform: GeoTransform, nodata: Option<f64>) -> Self {
        let (rows, cols) = data.dim();
        Self {
            georef: Georef::new(transform, cols, rows, "EPSG:32611"),
            data,
            nodata,
        }
    }

    /// 10 m north-up raster anchored at (500000, 4200000).
    pub fn north_up(data: Array2<f64>, nodata: Option<f64>) -> Self {
        Self::new(data, utm_transform(), nodata)
    }
}

pub fn utm_transform() -> GeoTransform {
    GeoTransform([500_000.0, 10.0, 0.0, 4_200_000.0, 0.0, -10.0])
}

impl RasterSource for MemoryRaster {
    fn georef(&self) -> &Georef {
        &self.georef
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn read_window(&self, window: &ChipWindow) -> Result<Array2<f64>> {
        let (rows, cols) = self.data.dim();
        if window.row_off + window.height > rows || window.col_off + window.width > cols {
            return Err(Error::Processing(format!("window {window:?} out of bounds")));
        }
        Ok(self
            .data
            .slice(s![
                window.row_off..window.row_off + window.height,
                window.col_off..window.col_off + window.width
            ])
            .to_owned())
    }
}
