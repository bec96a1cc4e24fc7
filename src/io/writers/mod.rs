//! Output writers: GeoTIFF chips, the CSV dataset table and the JSON run summary.
pub mod csv;
pub mod summary;
pub mod tiff;

pub use self::csv::write_dataset_csv;
pub use summary::{RunSummary, write_summary};
pub use tiff::{ChipTarget, ChipWriter, RasterTemplate, WrittenChip};
