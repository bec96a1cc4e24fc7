use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::core::params::DatasetParams;
use crate::core::processing::assemble::{ChipDataset, DatasetReport};
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct FailureSummary {
    pub path: PathBuf,
    pub error: String,
}

/// JSON sidecar describing one dataset build
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub annotations: PathBuf,
    pub ndvi_dir: PathBuf,
    pub output_dir: PathBuf,
    pub params: DatasetParams,
    pub rows: usize,
    pub treatment_rows: usize,
    pub rasters_selected: usize,
    pub rasters_chipped: usize,
    pub chips_written: usize,
    pub chips_discarded: usize,
    pub unused_chips: usize,
    pub failures: Vec<FailureSummary>,
    pub table: Option<PathBuf>,
}

impl RunSummary {
    pub fn new(
        annotations: &Path,
        ndvi_dir: &Path,
        output_dir: &Path,
        params: &DatasetParams,
        dataset: &ChipDataset,
    ) -> Self {
        let DatasetReport {
            rasters_selected,
            rasters_chipped,
            chips_written,
            chips_discarded,
            unused_chips,
            ref failures,
        } = dataset.report;
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            annotations: annotations.to_path_buf(),
            ndvi_dir: ndvi_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            params: params.clone(),
            rows: dataset.rows.len(),
            treatment_rows: dataset.rows.iter().filter(|r| r.class.id >= 0).count(),
            rasters_selected,
            rasters_chipped,
            chips_written,
            chips_discarded,
            unused_chips,
            failures: failures
                .iter()
                .map(|f| FailureSummary {
                    path: f.path.clone(),
                    error: f.error.to_string(),
                })
                .collect(),
            table: None,
        }
    }

    pub fn with_table(mut self, table: PathBuf) -> Self {
        self.table = Some(table);
        self
    }
}

/// Write the summary as pretty JSON to `path`
pub fn write_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let json_string = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json_string)?;
    info!("Created dataset summary: {:?}", path);
    Ok(())
}
