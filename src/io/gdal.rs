use gdal::{Dataset, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::georef::{GeoTransform, Georef};
use crate::types::ChipWindow;

/// Errors encountered when using the GDAL raster reader
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
    #[error("Window {window:?} lies outside a {width}x{height} raster")]
    WindowOutOfBounds {
        window: ChipWindow,
        width: usize,
        height: usize,
    },
}

/// Metadata extracted from a GDAL-supported raster
#[derive(Debug, Clone)]
pub struct GdalMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection as `EPSG:n` when an authority code is present, WKT otherwise
    pub projection: String,
    /// No-data sentinel of band 1
    pub nodata: Option<f64>,
}

impl GdalMetadata {
    /// Numeric EPSG code, when the projection carries one.
    pub fn epsg(&self) -> Option<u32> {
        self.projection
            .strip_prefix("EPSG:")
            .and_then(|code| code.parse().ok())
    }
}

/// A georeferenced single-band raster the chipping pipeline can read windows from.
pub trait RasterSource {
    fn georef(&self) -> &Georef;
    fn nodata(&self) -> Option<f64>;
    /// Band 1 values inside `window`, shaped (height, width).
    fn read_window(&self, window: &ChipWindow) -> crate::Result<Array2<f64>>;
}

/// Raster opened through GDAL (GeoTIFF and any other GDAL raster format)
pub struct GdalRaster {
    pub path: PathBuf,
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
    georef: Georef,
}

// Helper to extract EPSG code from WKT authority tag
pub(crate) fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

fn normalize_projection(proj: String) -> String {
    if proj.starts_with("EPSG:") {
        proj
    } else if let Some(code) = parse_epsg(&proj) {
        code
    } else {
        proj
    }
}

impl GdalRaster {
    /// Open a GDAL-supported raster (GeoTIFF, ENVI, ...)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let path = path.as_ref();
        let dataset = Dataset::open(path)?;
        let (size_x, size_y) = dataset.raster_size();
        if dataset.raster_count() == 0 {
            return Err(GdalError::UnsupportedFormat(format!(
                "No raster bands found in {}",
                path.display()
            )));
        }
        let geotransform = match dataset.geo_transform() {
            Ok(gt) => gt,
            Err(_) => GeoTransform::identity().coefficients(),
        };
        let projection = normalize_projection(dataset.projection());
        let nodata = dataset.rasterband(1)?.no_data_value();
        let georef = Georef::new(GeoTransform(geotransform), size_x, size_y, projection.clone());
        Ok(GdalRaster {
            path: path.to_path_buf(),
            dataset,
            metadata: GdalMetadata {
                size_x,
                size_y,
                geotransform,
                projection,
                nodata,
            },
            georef,
        })
    }

    /// Read band 1 through `window`, checking the window fits the raster
    fn read_band_window(&self, window: &ChipWindow) -> Result<Array2<f64>, GdalError> {
        let (w, h) = (self.metadata.size_x, self.metadata.size_y);
        if window.col_off + window.width > w || window.row_off + window.height > h {
            return Err(GdalError::WindowOutOfBounds {
                window: *window,
                width: w,
                height: h,
            });
        }
        let band = self.dataset.rasterband(1)?;
        let shape = (window.width, window.height);
        let buf = band.read_as::<f64>(
            (window.col_off as isize, window.row_off as isize),
            shape,
            shape,
            None,
        )?;
        let data_vec = buf.data().to_vec();
        let got = data_vec.len();
        Array2::from_shape_vec((window.height, window.width), data_vec).map_err(|_| {
            GdalError::DimensionMismatch(window.width, window.height, got, 1)
        })
    }
}

impl RasterSource for GdalRaster {
    fn georef(&self) -> &Georef {
        &self.georef
    }

    fn nodata(&self) -> Option<f64> {
        self.metadata.nodata
    }

    fn read_window(&self, window: &ChipWindow) -> crate::Result<Array2<f64>> {
        Ok(self.read_band_window(window)?)
    }
}
