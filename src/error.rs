//! Crate-level error type and `Result` alias for stable, structured error handling.
//! Converts underlying I/O, GDAL, CSV and JSON errors, and provides semantic variants
//! for geometry validation, source discovery and dataset assembly failures.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File '{}' already exists", path.display())]
    FileExists { path: PathBuf },

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Could not find source rasters: {0}")]
    MissingSource(String),

    #[error("Cannot pair {left} with {right}")]
    PathMismatch { left: String, right: String },

    #[error("Filename '{name}' does not follow the NDVI difference convention: {reason}")]
    InvalidFilename { name: String, reason: String },

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error(
        "Dataset has {found} usable rows but at least {required} are required"
    )]
    EmptyDataset { found: usize, required: usize },

    #[error("Processing error: {0}")]
    Processing(String),
}

impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(crate::io::GdalError::from(e))
    }
}
