use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::info;

use crate::core::processing::assemble::DatasetRow;
use crate::error::{Error, Result};

/// Flat CSV record of one dataset row
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    start_year: i32,
    end_year: i32,
    filename: String,
    path: String,
    class_id: i32,
    class_name: &'a str,
    bbox_x: Option<f64>,
    bbox_y: Option<f64>,
    bbox_w: Option<f64>,
    bbox_h: Option<f64>,
    geometry: String,
}

impl<'a> From<&'a DatasetRow> for CsvRow<'a> {
    fn from(row: &'a DatasetRow) -> Self {
        Self {
            start_year: row.years.start,
            end_year: row.years.end,
            filename: row.filename(),
            path: row.chip_path.display().to_string(),
            class_id: row.class.id,
            class_name: &row.class.name,
            bbox_x: row.bbox.map(|b| b.x),
            bbox_y: row.bbox.map(|b| b.y),
            bbox_w: row.bbox.map(|b| b.width),
            bbox_h: row.bbox.map(|b| b.height),
            geometry: row.geometry_string(),
        }
    }
}

/// Write the dataset table to `dest`, staged in `scratch_dir` and moved into place.
///
/// An existing `dest` is an error unless `overwrite` is set.
pub fn write_dataset_csv(
    rows: &[DatasetRow],
    dest: &Path,
    scratch_dir: &Path,
    overwrite: bool,
) -> Result<PathBuf> {
    if dest.exists() && !overwrite {
        return Err(Error::FileExists {
            path: dest.to_path_buf(),
        });
    }
    std::fs::create_dir_all(scratch_dir)?;
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut staged = NamedTempFile::new_in(scratch_dir)?;
    {
        let mut wtr = csv::Writer::from_writer(&mut staged);
        for row in rows {
            wtr.serialize(CsvRow::from(row))?;
        }
        wtr.flush()?;
    }

    let persisted = if overwrite {
        staged.persist(dest)
    } else {
        staged.persist_noclobber(dest)
    };
    persisted.map_err(|e| match e.error.kind() {
        ErrorKind::AlreadyExists => Error::FileExists {
            path: dest.to_path_buf(),
        },
        _ => Error::Io(e.error),
    })?;
    info!("Wrote {} rows to {:?}", rows.len(), dest);
    Ok(dest.to_path_buf())
}
