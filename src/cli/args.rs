use clap::Parser;
use std::path::PathBuf;

use ndvichip::FlattenMode;

#[derive(Parser)]
#[command(name = "ndvichip", version, about = "NDVI difference chip dataset builder")]
pub struct CliArgs {
    /// Annotation source (shapefile, GeoPackage or any OGR vector format)
    #[arg(short, long)]
    pub shapefile: Option<PathBuf>,

    /// Directory containing <Subregion>_<Start>to<End>_NDVI_Difference.tif rasters
    #[arg(long)]
    pub ndvi_dir: Option<PathBuf>,

    /// Output root; chips go to <output>/images/chips, tables to <output>/meta
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Chip size. Options:
    /// - Square: any positive integer (e.g., 256)
    /// - Rectangular: WIDTHxHEIGHT (e.g., 256x128)
    /// - Full raster: "full"
    #[arg(long)]
    pub chip_size: Option<String>,

    /// Only use rasters and annotations for this span (e.g., 2015to2019)
    #[arg(long)]
    pub years: Option<String>,

    /// Keep chips that no annotation intersects (as background rows)
    #[arg(long, default_value_t = false)]
    pub keep_empty: bool,

    /// Overwrite existing chips and tables
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    /// Empty the chip directory before writing
    #[arg(long, default_value_t = false)]
    pub clean_dest: bool,

    /// Number of chipping workers (default: available cores)
    #[arg(long)]
    pub workers: Option<usize>,

    /// How overlapping annotation parts are merged
    #[arg(long, value_enum)]
    pub flatten: Option<FlattenMode>,

    /// Keep geometry in the raster CRS instead of chip pixel coordinates
    #[arg(long, default_value_t = false)]
    pub geographic: bool,

    /// Minimum number of dataset rows; fewer is an error
    #[arg(long)]
    pub min_rows: Option<usize>,

    /// JSON file with dataset parameters; command line flags override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// CSV table path (default: <output>/meta/<ndvi-dir name>_chips.csv)
    #[arg(long)]
    pub csv: Option<PathBuf>,

    /// Enable logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
