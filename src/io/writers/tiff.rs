use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;
use gdal::{Dataset, DriverManager};
use ndarray::{Array2, ArrayView2};
use tracing::debug;

use crate::core::georef::GeoTransform;
use crate::error::{Error, Result};

// GDAL encoders are not safe to drive concurrently; every chip encode holds this.
static ENCODE_LOCK: Mutex<()> = Mutex::new(());

/// Blocking acquisition of the process-wide encode lock. A poisoned lock is
/// recovered since the guarded state is `()`.
pub(crate) fn encode_guard() -> MutexGuard<'static, ()> {
    ENCODE_LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Output raster properties inherited from the source raster.
#[derive(Debug, Clone, Default)]
pub struct RasterTemplate {
    /// `EPSG:n` or WKT; empty for an ungeoreferenced output
    pub projection: String,
    pub nodata: Option<f64>,
}

/// Where an encoded chip goes.
#[derive(Debug, Clone, Copy)]
pub enum ChipTarget<'a> {
    Disk(&'a Path),
    /// Encoded through GDAL's MEM driver and decoded back into an array
    Memory,
}

#[derive(Debug)]
pub enum WrittenChip {
    Persisted(PathBuf),
    Decoded(Array2<f64>),
}

/// Single-band Float32 GeoTIFF chip encoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChipWriter {
    pub overwrite: bool,
}

impl ChipWriter {
    pub fn new(overwrite: bool) -> Self {
        Self { overwrite }
    }

    /// Encode `data` with `transform` and the template's CRS and no-data value.
    pub fn write(
        &self,
        data: &ArrayView2<f64>,
        template: &RasterTemplate,
        transform: &GeoTransform,
        target: ChipTarget<'_>,
    ) -> Result<WrittenChip> {
        let (rows, cols) = data.dim();
        let pixels = to_f32_pixels(data, template.nodata);

        match target {
            ChipTarget::Disk(path) => {
                if path.exists() && !self.overwrite {
                    return Err(Error::FileExists {
                        path: path.to_path_buf(),
                    });
                }
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                let _guard = encode_guard();
                let driver = DriverManager::get_driver_by_name("GTiff")?;
                let mut ds = driver.create_with_band_type::<f32, _>(path, cols, rows, 1)?;
                fill_dataset(&mut ds, cols, rows, pixels, template, transform)?;
                ds.flush_cache()?;
                drop(ds);
                debug!("Wrote {}x{} chip to {:?}", cols, rows, path);
                Ok(WrittenChip::Persisted(path.to_path_buf()))
            }
            ChipTarget::Memory => {
                let _guard = encode_guard();
                let driver = DriverManager::get_driver_by_name("MEM")?;
                let mut ds = driver.create_with_band_type::<f32, _>("", cols, rows, 1)?;
                fill_dataset(&mut ds, cols, rows, pixels, template, transform)?;
                let band = ds.rasterband(1)?;
                let buf = band.read_as::<f64>((0, 0), (cols, rows), (cols, rows), None)?;
                let decoded = Array2::from_shape_vec((rows, cols), buf.data().to_vec())
                    .map_err(|e| Error::Processing(format!("decoded chip shape: {e}")))?;
                Ok(WrittenChip::Decoded(decoded))
            }
        }
    }
}

fn to_f32_pixels(data: &ArrayView2<f64>, nodata: Option<f64>) -> Vec<f32> {
    data.iter()
        .map(|&v| match nodata {
            Some(nd) if v.is_nan() => nd as f32,
            _ => v as f32,
        })
        .collect()
}

fn fill_dataset(
    ds: &mut Dataset,
    cols: usize,
    rows: usize,
    pixels: Vec<f32>,
    template: &RasterTemplate,
    transform: &GeoTransform,
) -> Result<()> {
    ds.set_geo_transform(&transform.coefficients())?;
    if !template.projection.is_empty() {
        let srs = SpatialRef::from_definition(&template.projection)?;
        ds.set_spatial_ref(&srs)?;
    }
    let mut band = ds.rasterband(1)?;
    if template.nodata.is_some() {
        band.set_no_data_value(template.nodata)?;
    }
    let mut buf = Buffer::new((cols, rows), pixels);
    band.write((0, 0), (cols, rows), &mut buf)?;
    Ok(())
}
