//! I/O layer: GDAL-backed raster reading, OGR annotation loading, the NDVI
//! difference filename convention, and `writers` for GeoTIFF chips, CSV tables
//! and JSON summaries.
pub mod gdal;
pub use gdal::{GdalError, GdalMetadata, GdalRaster, RasterSource};

pub mod naming;
pub use naming::{FilenameParser, NdviDifferenceNames, RasterName};

pub mod vector;
pub use vector::load_annotations;

pub mod writers;
