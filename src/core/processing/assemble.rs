//! Dataset assembly: select rasters, chip them in parallel, align annotations
//! per year span and encode the resulting rows.
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use geo_types::Polygon;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::core::georef::Georef;
use crate::core::params::DatasetParams;
use crate::core::processing::align::{align_chip, parts_for_years};
use crate::core::processing::extract::{ChipProgress, extract_chips};
use crate::core::processing::flatten::flatten;
use crate::core::processing::labels::{ClassEncoder, polygon_bbox, stringify_ring};
use crate::core::processing::translate::geo_to_pixel;
use crate::error::{Error, Result};
use crate::io::gdal::{GdalRaster, RasterSource};
use crate::io::naming::RasterName;
use crate::io::writers::tiff::{ChipTarget, ChipWriter, RasterTemplate};
use crate::types::{
    Annotation, BBox, ChipAnnotationRow, ChipWindow, ClassLabel, CoordFrame,
    ProjectedAnnotations, YearPair,
};

/// A chip persisted to disk.
#[derive(Debug, Clone)]
pub struct ChipRecord {
    pub path: PathBuf,
    pub window: ChipWindow,
    pub georef: Georef,
}

/// Chips produced from one source raster.
#[derive(Debug, Clone)]
pub struct RasterChips {
    pub raster: PathBuf,
    pub years: YearPair,
    /// CRS the chip footprints are expressed in
    pub projection: String,
    pub chips: Vec<ChipRecord>,
    pub discarded: usize,
}

/// A raster whose chipping failed; the rest of the batch continues.
#[derive(Debug)]
pub struct RasterFailure {
    pub path: PathBuf,
    pub error: Error,
}

pub type RasterOutcome = std::result::Result<RasterChips, RasterFailure>;

/// One encoded output row.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub years: YearPair,
    pub chip_path: PathBuf,
    pub class: ClassLabel,
    pub bbox: Option<BBox>,
    pub frame: CoordFrame,
    pub geometry: Option<Polygon<f64>>,
}

impl DatasetRow {
    pub fn filename(&self) -> String {
        self.chip_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Exterior ring as `"x y x y ..."`, empty for placeholder rows.
    pub fn geometry_string(&self) -> String {
        self.geometry.as_ref().map(stringify_ring).unwrap_or_default()
    }
}

/// Dataset assembly report
#[derive(Debug, Default)]
pub struct DatasetReport {
    pub rasters_selected: usize,
    pub rasters_chipped: usize,
    pub chips_written: usize,
    pub chips_discarded: usize,
    /// Chips deleted because no annotation intersects them
    pub unused_chips: usize,
    pub failures: Vec<RasterFailure>,
}

#[derive(Debug)]
pub struct ChipDataset {
    pub rows: Vec<DatasetRow>,
    pub report: DatasetReport,
}

/// Rasters whose year span (and subregion, when annotations carry one) matches
/// an annotation, restricted to `years` when given.
pub fn select_rasters(
    candidates: &[(PathBuf, RasterName)],
    annotations: &[Annotation],
    years: Option<YearPair>,
) -> Result<Vec<(PathBuf, RasterName)>> {
    let selected: Vec<_> = candidates
        .iter()
        .filter(|(_, name)| years.is_none_or(|y| y == name.years))
        .filter(|(_, name)| {
            annotations.iter().any(|a| {
                a.years == name.years
                    && a.subregion.as_ref().is_none_or(|s| *s == name.subregion)
            })
        })
        .cloned()
        .collect();
    if selected.is_empty() {
        let wanted = years.map_or_else(|| "any year span".to_string(), |y| y.to_string());
        return Err(Error::MissingSource(format!(
            "no raster among {} candidates matches annotations for {}",
            candidates.len(),
            wanted
        )));
    }
    Ok(selected)
}

/// Extract the usable chips of `source` and persist them under `out_dir`.
pub fn chip_source<R: RasterSource + ?Sized>(
    source: &R,
    stem: &str,
    out_dir: &Path,
    params: &DatasetParams,
    progress: &ChipProgress,
) -> Result<(Vec<ChipRecord>, usize)> {
    let extraction = extract_chips(source, params.chip_size, progress)?;
    let template = RasterTemplate {
        projection: source.georef().projection.clone(),
        nodata: source.nodata(),
    };
    let writer = ChipWriter::new(params.overwrite);
    let mut records = Vec::with_capacity(extraction.chips.len());
    for chip in &extraction.chips {
        let path = out_dir.join(chip.window.chip_filename(stem));
        writer.write(
            &chip.data.view(),
            &template,
            &chip.transform,
            ChipTarget::Disk(&path),
        )?;
        records.push(ChipRecord {
            path,
            window: chip.window,
            georef: source.georef().window(&chip.window),
        });
    }
    Ok((records, extraction.discarded))
}

/// Open one raster and chip it into `<chips_dir>/<stem>/`.
pub fn chip_raster(
    path: &Path,
    years: YearPair,
    chips_dir: &Path,
    params: &DatasetParams,
    progress: &ChipProgress,
) -> Result<RasterChips> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidFilename {
            name: path.display().to_string(),
            reason: "no file stem".to_string(),
        })?;
    info!("Chipping {:?}", path);
    let raster = GdalRaster::open(path)?;
    let (chips, discarded) = chip_source(&raster, &stem, &chips_dir.join(&stem), params, progress)?;
    let projection = raster.georef().projection.clone();
    drop(raster);
    info!(
        "{}: {} chips written, {} discarded",
        stem,
        chips.len(),
        discarded
    );
    Ok(RasterChips {
        raster: path.to_path_buf(),
        years,
        projection,
        chips,
        discarded,
    })
}

fn clear_directory(dir: &Path) -> Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

fn is_empty_dir(dir: &Path) -> bool {
    std::fs::read_dir(dir).is_ok_and(|mut entries| entries.next().is_none())
}

/// Delete a chip file, then its directory and that directory's parent when
/// each has become empty. Nothing above two levels is touched.
pub fn remove_orphan_chip(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.exists() && is_empty_dir(parent) {
        std::fs::remove_dir(parent)?;
        if let Some(grandparent) = parent.parent() {
            if grandparent.exists() && is_empty_dir(grandparent) {
                std::fs::remove_dir(grandparent)?;
            }
        }
    }
    Ok(())
}

fn worker_count(params: &DatasetParams) -> usize {
    params
        .num_workers
        .filter(|n| *n > 0)
        .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, |n| n.get()))
}

/// Chip every selected raster on a bounded worker pool and collect one outcome
/// per raster.
pub fn chip_all(
    rasters: &[(PathBuf, RasterName)],
    chips_dir: &Path,
    params: &DatasetParams,
) -> Result<Vec<RasterOutcome>> {
    let workers = worker_count(params);
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| Error::Processing(format!("worker pool: {e}")))?;
    let progress = ChipProgress::new();
    debug!("Chipping {} rasters on {} workers", rasters.len(), workers);
    let outcomes = pool.install(|| {
        rasters
            .par_iter()
            .map(|(path, name)| {
                chip_raster(path, name.years, chips_dir, params, &progress).map_err(|error| {
                    RasterFailure {
                        path: path.clone(),
                        error,
                    }
                })
            })
            .collect::<Vec<_>>()
    });
    info!("Inspected {} windows", progress.done());
    Ok(outcomes)
}

/// Align every chip of one year span against that span's annotations, taken
/// in the CRS of each chip's raster.
fn align_year_group(
    years: YearPair,
    rasters: &[&RasterChips],
    annotations: &ProjectedAnnotations,
    params: &DatasetParams,
) -> Result<Vec<ChipAnnotationRow>> {
    let mut parts_by_crs: BTreeMap<&str, Vec<Polygon<f64>>> = BTreeMap::new();
    let mut rows = Vec::new();
    for raster in rasters {
        let parts = parts_by_crs
            .entry(raster.projection.as_str())
            .or_insert_with(|| {
                flatten(
                    parts_for_years(annotations.for_crs(&raster.projection), years),
                    params.flatten,
                )
            });
        for chip in &raster.chips {
            let footprint = chip.georef.footprint();
            let aligned = align_chip(&chip.path, &footprint, years, parts);
            if !params.pixel_coords {
                rows.extend(aligned);
                continue;
            }
            for row in aligned {
                let geometry = match &row.geometry {
                    Some(g) => Some(geo_to_pixel(g, &chip.georef, params.simplify_tolerance)?),
                    None => None,
                };
                rows.push(ChipAnnotationRow {
                    frame: CoordFrame::Pixel,
                    geometry,
                    ..row
                });
            }
        }
    }
    debug!("{}: {} aligned rows", years, rows.len());
    Ok(rows)
}

/// Encode classes and boxes, drop exact duplicates and order by year span.
pub fn encode_rows(rows: Vec<ChipAnnotationRow>, encoder: &dyn ClassEncoder) -> Vec<DatasetRow> {
    let mut seen = HashSet::new();
    let mut out: Vec<DatasetRow> = rows
        .into_iter()
        .map(|row| DatasetRow {
            class: encoder.encode(&row),
            bbox: row.geometry.as_ref().and_then(polygon_bbox),
            years: row.years,
            chip_path: row.chip_path,
            frame: row.frame,
            geometry: row.geometry,
        })
        .filter(|row| {
            seen.insert((
                row.years,
                row.chip_path.clone(),
                row.class.clone(),
                row.geometry_string(),
            ))
        })
        .collect();
    out.sort_by_key(|row| row.years);
    out
}

/// Build the chip dataset from candidate rasters and loaded annotations.
pub fn assemble_dataset(
    candidates: &[(PathBuf, RasterName)],
    annotations: &ProjectedAnnotations,
    chips_dir: &Path,
    params: &DatasetParams,
    encoder: &dyn ClassEncoder,
) -> Result<ChipDataset> {
    let selected = select_rasters(candidates, annotations.native(), params.years)?;
    let mut report = DatasetReport {
        rasters_selected: selected.len(),
        ..Default::default()
    };

    if params.clean_dest {
        info!("Cleaning {:?}", chips_dir);
        clear_directory(chips_dir)?;
    }

    let mut chipped = Vec::new();
    for outcome in chip_all(&selected, chips_dir, params)? {
        match outcome {
            Ok(chips) => chipped.push(chips),
            Err(failure) => {
                warn!("Failed to chip {:?}: {}", failure.path, failure.error);
                report.failures.push(failure);
            }
        }
    }
    chipped.sort_by(|a, b| a.raster.cmp(&b.raster));
    report.rasters_chipped = chipped.len();
    report.chips_written = chipped.iter().map(|r| r.chips.len()).sum();
    report.chips_discarded = chipped.iter().map(|r| r.discarded).sum();

    let mut by_years: BTreeMap<YearPair, Vec<&RasterChips>> = BTreeMap::new();
    for raster in &chipped {
        by_years.entry(raster.years).or_default().push(raster);
    }
    let mut rows = Vec::new();
    for (years, rasters) in &by_years {
        rows.extend(align_year_group(*years, rasters, annotations, params)?);
    }

    if params.ignore_empty_geom {
        let used: BTreeSet<PathBuf> = rows
            .iter()
            .filter(|r| !r.is_placeholder())
            .map(|r| r.chip_path.clone())
            .collect();
        let orphans: BTreeSet<PathBuf> = rows
            .iter()
            .map(|r| r.chip_path.clone())
            .filter(|p| !used.contains(p))
            .collect();
        for path in &orphans {
            remove_orphan_chip(path)?;
        }
        report.unused_chips = orphans.len();
        rows.retain(|r| !r.is_placeholder());
        info!("Removed {} chips without annotations", orphans.len());
    }

    let rows = encode_rows(rows, encoder);
    let required = params.required_rows();
    if rows.len() < required {
        return Err(Error::EmptyDataset {
            found: rows.len(),
            required,
        });
    }
    info!(
        "Assembled {} rows from {} chips ({} rasters failed)",
        rows.len(),
        report.chips_written - report.unused_chips,
        report.failures.len()
    );
    Ok(ChipDataset { rows, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::labels::TreatmentEncoder;
    use crate::io::naming::{NdviDifferenceNames, build_filename, discover_rasters};
    use crate::test_support::utm_transform;
    use crate::types::{AnnotationGeometry, ChipSize};
    use geo_types::LineString;
    use ndarray::Array2;

    fn rect(x0: f64, y0: f64, x1: f64, y1: f64) -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![(x0, y0), (x1, y0), (x1, y1), (x0, y1), (x0, y0)]),
            vec![],
        )
    }

    fn annotation(poly: Polygon<f64>, years: YearPair) -> Annotation {
        Annotation {
            geometry: AnnotationGeometry::Polygon(poly),
            years,
            subregion: None,
        }
    }

    /// Writes a 512 x 512 north-up raster named per the NDVI convention.
    fn write_raster(dir: &Path, subregion: &str, years: YearPair) -> PathBuf {
        let data = Array2::from_shape_fn((512, 512), |(r, c)| 0.1 + (r + c) as f64 * 1e-4);
        write_raster_with(dir, subregion, years, &data, "EPSG:32611")
    }

    fn write_raster_with(
        dir: &Path,
        subregion: &str,
        years: YearPair,
        data: &Array2<f64>,
        projection: &str,
    ) -> PathBuf {
        let path = dir.join(build_filename(subregion, years));
        let template = RasterTemplate {
            projection: projection.to_string(),
            nodata: Some(-9999.0),
        };
        ChipWriter::default()
            .write(&data.view(), &template, &utm_transform(), ChipTarget::Disk(&path))
            .unwrap();
        path
    }

    fn params() -> DatasetParams {
        DatasetParams {
            chip_size: ChipSize::square(256),
            num_workers: Some(2),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_rasters_filters_years_and_subregion() {
        let years = YearPair::new(2015, 2019);
        let name = |sub: &str, y: YearPair| RasterName {
            subregion: sub.to_string(),
            years: y,
        };
        let candidates = vec![
            (PathBuf::from("a.tif"), name("A1", years)),
            (PathBuf::from("b.tif"), name("B1", years)),
            (PathBuf::from("c.tif"), name("A1", YearPair::new(2016, 2020))),
        ];
        let mut ann = annotation(rect(0.0, 0.0, 1.0, 1.0), years);
        ann.subregion = Some("A1".to_string());

        let selected = select_rasters(&candidates, &[ann.clone()], None).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].0, PathBuf::from("a.tif"));

        let err = select_rasters(&candidates, &[ann], Some(YearPair::new(2016, 2020))).unwrap_err();
        assert!(matches!(err, Error::MissingSource(_)));
    }

    #[test]
    fn test_assemble_keeps_intersecting_chips() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let years = YearPair::new(2015, 2019);
        write_raster(src.path(), "A12E", years);
        let candidates = discover_rasters(src.path(), &NdviDifferenceNames).unwrap();

        // Straddles the boundary between chips (0,0) and (0,256)
        let poly = rect(502_000.0, 4_198_000.0, 503_000.0, 4_199_000.0);
        let chips_dir = out.path().join("images/chips");
        let dataset = assemble_dataset(
            &candidates,
            &vec![annotation(poly, years)].into(),
            &chips_dir,
            &params(),
            &TreatmentEncoder,
        )
        .unwrap();

        assert_eq!(dataset.report.chips_written, 4);
        assert_eq!(dataset.report.unused_chips, 2);
        assert_eq!(dataset.rows.len(), 2);
        let names: BTreeSet<String> = dataset.rows.iter().map(|r| r.filename()).collect();
        let stem = "A12_Expanded_2015to2019_NDVI_Difference";
        assert!(names.contains(&format!("{stem}_chip_0_0.tif")));
        assert!(names.contains(&format!("{stem}_chip_0_256.tif")));
        for row in &dataset.rows {
            assert_eq!(row.frame, CoordFrame::Pixel);
            assert_eq!(row.class, TreatmentEncoder::treatment());
            assert!(row.chip_path.exists());
            let bbox = row.bbox.unwrap();
            assert!(bbox.x >= 0.0 && bbox.x + bbox.width <= 255.0);
            assert!(bbox.y >= 0.0 && bbox.y + bbox.height <= 255.0);
        }
        assert!(!chips_dir.join(stem).join(format!("{stem}_chip_256_0.tif")).exists());
    }

    #[test]
    fn test_annotation_outside_all_chips() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let years = YearPair::new(2015, 2019);
        write_raster(src.path(), "A1", years);
        let candidates = discover_rasters(src.path(), &NdviDifferenceNames).unwrap();
        let far: ProjectedAnnotations = vec![annotation(rect(0.0, 0.0, 100.0, 100.0), years)].into();
        let chips_dir = out.path().join("images/chips");

        // Every chip gets exactly one placeholder row
        let keep = DatasetParams {
            ignore_empty_geom: false,
            ..params()
        };
        let dataset =
            assemble_dataset(&candidates, &far, &chips_dir, &keep, &TreatmentEncoder)
                .unwrap();
        assert_eq!(dataset.rows.len(), 4);
        assert!(dataset.rows.iter().all(|r| r.geometry.is_none()));
        assert!(dataset.rows.iter().all(|r| r.class == TreatmentEncoder::background()));

        // Dropping them leaves nothing, and the emptied directories go too
        let drop_empty = DatasetParams {
            overwrite: true,
            ..params()
        };
        let err = assemble_dataset(&candidates, &far, &chips_dir, &drop_empty, &TreatmentEncoder)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::EmptyDataset {
                found: 0,
                required: 1
            }
        ));
        assert!(!chips_dir.exists());
        assert!(out.path().join("images").exists());
    }

    #[test]
    fn test_failed_raster_is_reported() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let years = YearPair::new(2015, 2019);
        write_raster(src.path(), "A1", years);
        std::fs::write(src.path().join(build_filename("B1", years)), b"not a tiff").unwrap();
        let candidates = discover_rasters(src.path(), &NdviDifferenceNames).unwrap();
        assert_eq!(candidates.len(), 2);

        let poly = rect(500_100.0, 4_199_000.0, 500_900.0, 4_199_900.0);
        let dataset = assemble_dataset(
            &candidates,
            &vec![annotation(poly, years)].into(),
            &out.path().join("chips"),
            &params(),
            &TreatmentEncoder,
        )
        .unwrap();
        assert_eq!(dataset.report.rasters_selected, 2);
        assert_eq!(dataset.report.rasters_chipped, 1);
        assert_eq!(dataset.report.failures.len(), 1);
        assert!(dataset.report.failures[0].path.ends_with(build_filename("B1", years)));
        assert_eq!(dataset.rows.len(), 1);
    }

    #[test]
    fn test_discarded_chip_never_reaches_dataset() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let years = YearPair::new(2015, 2019);
        let mut data = Array2::from_elem((512, 512), 0.35);
        data.slice_mut(ndarray::s![0..256, 0..256]).fill(-9999.0);
        let path = write_raster_with(src.path(), "A1", years, &data, "EPSG:32611");
        let candidates = discover_rasters(src.path(), &NdviDifferenceNames).unwrap();

        // Covers the whole raster, so every written chip intersects it
        let all = rect(499_000.0, 4_194_000.0, 506_000.0, 4_201_000.0);
        let chips_dir = out.path().join("images/chips");
        let dataset = assemble_dataset(
            &candidates,
            &vec![annotation(all, years)].into(),
            &chips_dir,
            &params(),
            &TreatmentEncoder,
        )
        .unwrap();

        assert_eq!(dataset.report.chips_written, 3);
        assert_eq!(dataset.report.chips_discarded, 1);
        assert_eq!(dataset.report.unused_chips, 0);
        assert_eq!(dataset.rows.len(), 3);
        let stem = path.file_stem().unwrap().to_string_lossy().into_owned();
        let discarded = format!("{stem}_chip_0_0.tif");
        assert!(dataset.rows.iter().all(|r| r.filename() != discarded));
        assert!(!chips_dir.join(&stem).join(&discarded).exists());
        assert!(chips_dir.join(&stem).join(format!("{stem}_chip_256_256.tif")).exists());
    }

    #[test]
    fn test_annotations_follow_each_raster_crs() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let years = YearPair::new(2015, 2019);
        let data = Array2::from_elem((512, 512), 0.4);
        write_raster_with(src.path(), "A1", years, &data, "EPSG:32611");
        write_raster_with(src.path(), "B1", years, &data, "EPSG:32612");
        let candidates = discover_rasters(src.path(), &NdviDifferenceNames).unwrap();

        // The same treatment lands in different chips once expressed in each zone
        let native = vec![annotation(rect(0.0, 0.0, 1.0, 1.0), years)];
        let mut projected = ProjectedAnnotations::new(native);
        projected.insert(
            "EPSG:32611",
            vec![annotation(rect(500_100.0, 4_199_000.0, 500_900.0, 4_199_900.0), years)],
        );
        projected.insert(
            "EPSG:32612",
            vec![annotation(rect(503_000.0, 4_195_500.0, 504_000.0, 4_196_500.0), years)],
        );

        let dataset = assemble_dataset(
            &candidates,
            &projected,
            &out.path().join("images/chips"),
            &params(),
            &TreatmentEncoder,
        )
        .unwrap();
        let names: BTreeSet<String> = dataset.rows.iter().map(|r| r.filename()).collect();
        assert_eq!(
            names,
            BTreeSet::from([
                "A1_2015to2019_NDVI_Difference_chip_0_0.tif".to_string(),
                "B1_2015to2019_NDVI_Difference_chip_256_256.tif".to_string(),
            ])
        );
    }

    #[test]
    fn test_encode_rows_dedups_and_sorts() {
        let row = |y: YearPair, g: Option<Polygon<f64>>| ChipAnnotationRow {
            chip_path: PathBuf::from("c.tif"),
            years: y,
            frame: CoordFrame::Pixel,
            geometry: g,
        };
        let late = YearPair::new(2017, 2021);
        let early = YearPair::new(2015, 2019);
        let sq = rect(0.0, 0.0, 4.0, 4.0);
        let rows = vec![
            row(late, Some(sq.clone())),
            row(early, Some(sq.clone())),
            row(early, Some(sq.clone())),
            row(early, Some(rect(1.0, 1.0, 3.0, 3.0))),
        ];
        let encoded = encode_rows(rows, &TreatmentEncoder);
        assert_eq!(encoded.len(), 3);
        assert_eq!(encoded[0].years, early);
        assert_eq!(encoded[1].years, early);
        assert_eq!(encoded[2].years, late);
        assert_eq!(encoded[1].bbox.unwrap().width, 2.0);
    }

    #[test]
    fn test_orphan_cleanup_stops_after_two_levels() {
        let root = tempfile::tempdir().unwrap();
        let chip = root.path().join("chips/stem/chip.tif");
        std::fs::create_dir_all(chip.parent().unwrap()).unwrap();
        std::fs::write(&chip, b"x").unwrap();

        remove_orphan_chip(&chip).unwrap();
        assert!(!root.path().join("chips").exists());
        assert!(root.path().exists());
    }
}
