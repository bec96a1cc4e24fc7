use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::processing::translate::DEFAULT_SIMPLIFY_TOLERANCE;
use crate::error::Result;
use crate::types::{ChipSize, FlattenMode, YearPair};

/// Dataset build parameters suitable for config files
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetParams {
    pub chip_size: ChipSize,
    /// Only build chips for this year span
    pub years: Option<YearPair>,
    /// Drop rows (and chips) that no annotation intersects
    pub ignore_empty_geom: bool,
    /// Replace existing chip files instead of failing
    pub overwrite: bool,
    /// Empty the chip output directory before writing
    pub clean_dest: bool,
    /// Chipping worker count; None means available parallelism
    pub num_workers: Option<usize>,
    pub flatten: FlattenMode,
    /// Emit geometry in chip pixel coordinates instead of the raster CRS
    pub pixel_coords: bool,
    /// Fewer rows than this is an error (at least one row is always required)
    pub min_rows: usize,
    pub simplify_tolerance: f64,
    /// Staging directory for exported tables; defaults to `<output>/meta`
    pub scratch_dir: Option<PathBuf>,
}

impl Default for DatasetParams {
    fn default() -> Self {
        Self {
            chip_size: ChipSize::Full,
            years: None,
            ignore_empty_geom: true,
            overwrite: false,
            clean_dest: false,
            num_workers: None,
            flatten: FlattenMode::FirstMerge,
            pixel_coords: true,
            min_rows: 1,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
            scratch_dir: None,
        }
    }
}

impl DatasetParams {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn required_rows(&self) -> usize {
        self.min_rows.max(1)
    }
}

/// Attribute columns of the annotation source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationSchema {
    pub start_year: String,
    pub end_year: String,
    pub subregion: String,
}

impl Default for AnnotationSchema {
    fn default() -> Self {
        Self {
            start_year: "StartYear".to_string(),
            end_year: "EndYear".to_string(),
            subregion: "Subregion".to_string(),
        }
    }
}
