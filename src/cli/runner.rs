use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ndvichip::api::{export_dataset_csv, make_chip_dataset, meta_dir};
use ndvichip::io::writers::summary::{RunSummary, write_summary};
use ndvichip::{AnnotationSchema, ChipSize, DatasetParams, YearPair};

use super::args::CliArgs;
use super::errors::AppError;

fn init_logging(verbose: bool) {
    if verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn parse_chip_size(size: &str) -> Result<ChipSize, AppError> {
    let parsed: ChipSize = size.parse().map_err(|_| AppError::InvalidChipSize {
        size: size.to_string(),
    })?;
    match parsed {
        ChipSize::Fixed { width, height } if width == 0 || height == 0 => {
            Err(AppError::ZeroChipSize {
                size: size.to_string(),
            })
        }
        other => Ok(other),
    }
}

/// Config file values (or defaults) with command line flags applied on top
fn build_params(args: &CliArgs) -> Result<DatasetParams, AppError> {
    let mut params = match &args.config {
        Some(path) => DatasetParams::from_json_file(path)?,
        None => DatasetParams::default(),
    };
    if let Some(size) = &args.chip_size {
        params.chip_size = parse_chip_size(size)?;
    }
    if let Some(years) = &args.years {
        params.years = Some(years.parse::<YearPair>().map_err(|_| AppError::InvalidYears {
            years: years.clone(),
        })?);
    }
    if args.keep_empty {
        params.ignore_empty_geom = false;
    }
    if args.overwrite {
        params.overwrite = true;
    }
    if args.clean_dest {
        params.clean_dest = true;
    }
    if let Some(workers) = args.workers {
        params.num_workers = Some(workers);
    }
    if let Some(flatten) = args.flatten {
        params.flatten = flatten;
    }
    if args.geographic {
        params.pixel_coords = false;
    }
    if let Some(min_rows) = args.min_rows {
        params.min_rows = min_rows;
    }
    Ok(params)
}

fn default_csv_path(output_dir: &Path, ndvi_dir: &Path) -> PathBuf {
    let name = ndvi_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "ndvi".to_string());
    meta_dir(output_dir).join(format!("{name}_chips.csv"))
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);

    let params = build_params(&args)?;
    let shapefile = args.shapefile.ok_or(AppError::MissingArgument {
        arg: "--shapefile".to_string(),
    })?;
    let ndvi_dir = args.ndvi_dir.ok_or(AppError::MissingArgument {
        arg: "--ndvi-dir".to_string(),
    })?;
    let output_dir = args.output_dir.ok_or(AppError::MissingArgument {
        arg: "--output-dir".to_string(),
    })?;

    fs::create_dir_all(&output_dir)?;
    info!("Annotations: {:?}", shapefile);
    info!("NDVI rasters: {:?}", ndvi_dir);
    info!("Output directory: {:?}", output_dir);

    let dataset = make_chip_dataset(
        &shapefile,
        &ndvi_dir,
        &output_dir,
        &params,
        &AnnotationSchema::default(),
    )
    .map_err(AppError::from)?;

    for failure in &dataset.report.failures {
        warn!("Raster failed: {:?}: {}", failure.path, failure.error);
    }

    let csv_path = args
        .csv
        .unwrap_or_else(|| default_csv_path(&output_dir, &ndvi_dir));
    let table = export_dataset_csv(&dataset, &csv_path, &output_dir, &params)?;

    let summary = RunSummary::new(&shapefile, &ndvi_dir, &output_dir, &params, &dataset)
        .with_table(table.clone());
    write_summary(&summary, &table.with_extension("json"))?;

    info!("Dataset complete!");
    info!("Rows: {}", dataset.rows.len());
    info!("Chips kept: {}", summary.chips_written.saturating_sub(summary.unused_chips));
    info!("Raster failures: {}", summary.failures.len());
    println!(
        "Wrote {} rows ({} chips) to {}",
        dataset.rows.len(),
        summary.chips_written.saturating_sub(summary.unused_chips),
        table.display()
    );
    Ok(())
}
