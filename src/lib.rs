#![doc = r#"
NDVICHIP: build object-detection training chips from NDVI difference GeoTIFFs.

This crate turns paired-year NDVI difference rasters and vector treatment polygons
into a tiled, labelled dataset: fixed-size GeoTIFF chips plus a table mapping each
chip to the annotation geometry intersecting it, in chip pixel coordinates with
bounding boxes and class labels. It powers the `ndvichip` CLI and can be embedded in
your own Rust applications.

Stability
---------
The public library API is experimental in initial releases and may evolve.
Breaking changes can occur.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Build a dataset
---------------
```rust,no_run
use std::path::Path;
use ndvichip::{make_chip_dataset, AnnotationSchema, ChipSize, DatasetParams};

fn main() -> ndvichip::Result<()> {
    let params = DatasetParams {
        chip_size: ChipSize::square(256),
        num_workers: Some(8),
        ..Default::default()
    };

    let dataset = make_chip_dataset(
        Path::new("/data/treatments.shp"),
        Path::new("/data/ndvi"),
        Path::new("/out"),
        &params,
        &AnnotationSchema::default(),
    )?;

    println!(
        "rows={} chips={} failures={}",
        dataset.rows.len(),
        dataset.report.chips_written,
        dataset.report.failures.len()
    );
    Ok(())
}
```

Chip a single raster in memory
------------------------------
```rust,no_run
use std::path::Path;
use ndvichip::{chip_geotiff_to_buffers, ChipSize};

fn main() -> ndvichip::Result<()> {
    let raster = chip_geotiff_to_buffers(
        Path::new("/data/ndvi/A12_Expanded_2015to2019_NDVI_Difference.tif"),
        ChipSize::square(512),
    )?;
    for chip in &raster.chips {
        println!("{:?} at {:?} (EPSG:{})", chip.window, chip.origin, raster.epsg);
    }
    Ok(())
}
```

Pixel and geographic coordinates
--------------------------------
```rust
use ndvichip::core::georef::{GeoTransform, Georef};
use ndvichip::core::processing::translate::{pixel_to_geo, geo_to_pixel, PixelInput};

fn main() -> ndvichip::Result<()> {
    let chip = Georef::new(
        GeoTransform([500_000.0, 10.0, 0.0, 4_200_000.0, 0.0, -10.0]),
        256,
        256,
        "EPSG:32611",
    );
    let geo = pixel_to_geo(PixelInput::Text("((0 0, 10 0, 10 10, 0 10))".into()), &chip, 0.0)?;
    let pixels = geo_to_pixel(&geo, &chip, 0.0)?;
    assert_eq!(pixels.exterior().0.len(), 5);
    Ok(())
}
```

Error handling
--------------
All public functions return `ndvichip::Result<T>`; match on `ndvichip::Error` to handle
specific cases.

```rust,no_run
use std::path::Path;
use ndvichip::{make_chip_dataset, AnnotationSchema, DatasetParams, Error};

fn main() {
    let params = DatasetParams::default();
    match make_chip_dataset(
        Path::new("/data/treatments.shp"),
        Path::new("/data/ndvi"),
        Path::new("/out"),
        &params,
        &AnnotationSchema::default(),
    ) {
        Ok(dataset) => println!("{} rows", dataset.rows.len()),
        Err(Error::MissingSource(e)) => eprintln!("Nothing to chip: {e}"),
        Err(Error::EmptyDataset { found, required }) => {
            eprintln!("Only {found} rows, need {required}")
        }
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level, ergonomic entry points.
- [`core`]: georeferencing, parameters, and the chipping/alignment/labelling steps.
- [`types`]: shared types (e.g. `YearPair`, `ChipSize`, `ChipWindow`, `FlattenMode`).
- [`io`]: GDAL raster/vector readers, filename convention, and writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Curated public API surface
// Types
pub use core::georef::{GeoIndex, GeoTransform, Georef};
pub use core::params::{AnnotationSchema, DatasetParams};
pub use error::{Error, Result};
pub use types::{
    Annotation, AnnotationGeometry, BBox, ChipAnnotationRow, ChipSize, ChipWindow, ClassLabel,
    CoordFrame, FlattenMode, PixelBounds, ProjectedAnnotations, YearPair,
};

// Readers
pub use io::gdal::{GdalError, GdalMetadata, GdalRaster, RasterSource};
pub use io::naming::{FilenameParser, NdviDifferenceNames, RasterName, build_filename};
pub use io::vector::load_annotations;

// Processing steps
pub use core::processing::assemble::{
    ChipDataset, DatasetReport, DatasetRow, RasterFailure, RasterOutcome,
};
pub use core::processing::labels::{ClassEncoder, TreatmentEncoder};
pub use core::processing::translate::{PixelInput, geo_to_pixel, pixel_to_geo};

// High-level API re-exports
pub use api::{
    ChipBuffer, ChippedRaster, chip_geotiff_to_buffers, export_dataset_csv,
    load_projected_annotations, make_chip_dataset, make_chip_dataset_with,
};
