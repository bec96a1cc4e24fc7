//! High-level, ergonomic library API: build a labelled chip dataset from a vector
//! annotation source and a directory of NDVI difference rasters, or chip a single
//! GeoTIFF into in-memory buffers. Prefer these entrypoints over the low-level
//! processing modules when integrating ndvichip.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::core::params::{AnnotationSchema, DatasetParams};
use crate::core::processing::assemble::{ChipDataset, assemble_dataset};
use crate::core::processing::extract::{ChipProgress, extract_chips};
use crate::core::processing::labels::{ClassEncoder, TreatmentEncoder};
use crate::error::{Error, Result};
use crate::io::gdal::{GdalRaster, RasterSource};
use crate::io::naming::{FilenameParser, NdviDifferenceNames, RasterName, discover_rasters};
use crate::io::vector::load_annotations;
use crate::io::writers::csv::write_dataset_csv;
use crate::io::writers::tiff::{ChipTarget, ChipWriter, RasterTemplate, WrittenChip};
use crate::types::{ChipSize, ChipWindow, ProjectedAnnotations};

/// Directory chips are written under, relative to the output directory
pub const CHIPS_SUBDIR: &str = "images/chips";
/// Directory tables and summaries are written under
pub const META_SUBDIR: &str = "meta";

/// Chip directory of an output root
pub fn chips_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(CHIPS_SUBDIR)
}

/// Metadata directory of an output root
pub fn meta_dir(output_dir: &Path) -> PathBuf {
    output_dir.join(META_SUBDIR)
}

/// Build the chip dataset using the default filename convention and class encoder.
///
/// Annotations are reprojected into the CRS of every readable raster.
pub fn make_chip_dataset(
    annotations: &Path,
    ndvi_dir: &Path,
    output_dir: &Path,
    params: &DatasetParams,
    schema: &AnnotationSchema,
) -> Result<ChipDataset> {
    make_chip_dataset_with(
        annotations,
        ndvi_dir,
        output_dir,
        params,
        schema,
        &NdviDifferenceNames,
        &TreatmentEncoder,
    )
}

/// Distinct CRS definitions of the candidates that open. Unreadable rasters are
/// skipped here and reported as failures when chipped.
fn candidate_projections(candidates: &[(PathBuf, RasterName)]) -> BTreeSet<String> {
    let mut projections = BTreeSet::new();
    for (path, _) in candidates {
        match GdalRaster::open(path) {
            Ok(raster) if !raster.metadata.projection.is_empty() => {
                projections.insert(raster.metadata.projection);
            }
            Ok(_) => debug!("{:?} has no CRS", path),
            Err(e) => warn!("Cannot read CRS of {:?}: {}", path, e),
        }
    }
    projections
}

/// Load annotations once as stored and once per raster CRS.
pub fn load_projected_annotations(
    path: &Path,
    schema: &AnnotationSchema,
    projections: impl IntoIterator<Item = String>,
) -> Result<ProjectedAnnotations> {
    let mut projected = ProjectedAnnotations::new(load_annotations(path, schema, None)?);
    for crs in projections {
        let reprojected = load_annotations(path, schema, Some(crs.as_str()))?;
        projected.insert(crs, reprojected);
    }
    Ok(projected)
}

/// Build the chip dataset with a custom filename parser and class encoder.
pub fn make_chip_dataset_with<P: FilenameParser + ?Sized>(
    annotations: &Path,
    ndvi_dir: &Path,
    output_dir: &Path,
    params: &DatasetParams,
    schema: &AnnotationSchema,
    parser: &P,
    encoder: &dyn ClassEncoder,
) -> Result<ChipDataset> {
    let candidates = discover_rasters(ndvi_dir, parser)?;
    if candidates.is_empty() {
        return Err(Error::MissingSource(format!(
            "no NDVI difference rasters in {}",
            ndvi_dir.display()
        )));
    }
    let annotations =
        load_projected_annotations(annotations, schema, candidate_projections(&candidates))?;

    std::fs::create_dir_all(output_dir)?;
    info!(
        "Building dataset from {} rasters and {} annotations ({} CRS) into {:?}",
        candidates.len(),
        annotations.len(),
        annotations.projections().count(),
        output_dir
    );
    assemble_dataset(
        &candidates,
        &annotations,
        &chips_dir(output_dir),
        params,
        encoder,
    )
}

/// Every row must point at a chip file that is still on disk.
fn check_chip_pairing(dataset: &ChipDataset) -> Result<()> {
    for (i, row) in dataset.rows.iter().enumerate() {
        if !row.chip_path.is_file() {
            return Err(Error::PathMismatch {
                left: format!("label row {i} ({})", row.years),
                right: row.chip_path.display().to_string(),
            });
        }
    }
    Ok(())
}

/// Write the dataset table as CSV, staging through the configured scratch
/// directory (`<output>/meta` by default).
///
/// Fails with `PathMismatch` when a row's chip file no longer exists.
pub fn export_dataset_csv(
    dataset: &ChipDataset,
    dest: &Path,
    output_dir: &Path,
    params: &DatasetParams,
) -> Result<PathBuf> {
    check_chip_pairing(dataset)?;
    let scratch = params
        .scratch_dir
        .clone()
        .unwrap_or_else(|| meta_dir(output_dir));
    write_dataset_csv(&dataset.rows, dest, &scratch, params.overwrite)
}

/// A decoded chip held in memory
#[derive(Debug, Clone)]
pub struct ChipBuffer {
    pub window: ChipWindow,
    /// Geographic coordinate of the centre of the chip's first pixel
    pub origin: (f64, f64),
    pub data: Array2<f64>,
}

/// All usable chips of one raster, decoded in memory
#[derive(Debug, Clone)]
pub struct ChippedRaster {
    pub chips: Vec<ChipBuffer>,
    pub epsg: u32,
}

/// Chip a GeoTIFF without touching disk, e.g. to feed a detector.
///
/// The raster must carry an EPSG code.
pub fn chip_geotiff_to_buffers(path: &Path, chip_size: ChipSize) -> Result<ChippedRaster> {
    let raster = GdalRaster::open(path)?;
    let epsg = raster.metadata.epsg().ok_or_else(|| {
        Error::MissingSource(format!("{} has no EPSG code", path.display()))
    })?;
    let extraction = extract_chips(&raster, chip_size, &ChipProgress::new())?;
    let template = RasterTemplate {
        projection: raster.georef().projection.clone(),
        nodata: raster.nodata(),
    };
    let writer = ChipWriter::default();
    let mut chips = Vec::with_capacity(extraction.chips.len());
    for chip in extraction.chips {
        let WrittenChip::Decoded(data) =
            writer.write(&chip.data.view(), &template, &chip.transform, ChipTarget::Memory)?
        else {
            return Err(Error::Processing("memory target returned a file".into()));
        };
        chips.push(ChipBuffer {
            window: chip.window,
            origin: chip.origin(),
            data,
        });
    }
    Ok(ChippedRaster { chips, epsg })
}
