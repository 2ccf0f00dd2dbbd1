use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use satmatch::types::{OverviewResampling, VrtResolution};

#[derive(Parser)]
#[command(name = "satmatch", version, about = "SATMATCH CLI")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Enable logging (RUST_LOG refines the filter)
    #[arg(long, global = true, default_value_t = false)]
    pub log: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute two-point stretch bounds against a reference and save them as a style
    Equalize(EqualizeArgs),
    /// Match colors onto a reference, write 5 km tiles and a VRT mosaic
    Match(MatchArgs),
    /// Export a raster to 8 bits using the bounds of a style
    #[command(name = "to8bits")]
    To8Bits(To8BitsArgs),
    /// Run a JSON list of operations
    Batch(BatchArgs),
}

#[derive(Args)]
pub struct EqualizeArgs {
    /// Raster to equalize
    #[arg(short, long)]
    pub input: PathBuf,

    /// Reference raster
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Work area polygons (GeoPackage, Shapefile, GeoJSON...)
    #[arg(short = 'm', long)]
    pub work_area: PathBuf,

    /// Style file to write (default: <input>.style.json)
    #[arg(long)]
    pub style: Option<PathBuf>,
}

#[derive(Args)]
pub struct MatchArgs {
    /// Raster to match
    #[arg(short, long)]
    pub input: PathBuf,

    /// Reference raster
    #[arg(short, long)]
    pub reference: PathBuf,

    /// Work area polygons used for the histograms
    #[arg(short = 'm', long)]
    pub work_area: PathBuf,

    /// Final cutout polygons; without it no pixel is masked out
    #[arg(long)]
    pub cutout: Option<PathBuf>,

    /// Output VRT; tiles are written to the directory of the same name
    #[arg(short, long)]
    pub output: PathBuf,

    /// JSON parameter file; flags below override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Desaturation percentage (1-100)
    #[arg(short, long)]
    pub desaturation: Option<u8>,

    /// Saturation percentage (0-100)
    #[arg(short, long)]
    pub saturation: Option<f64>,

    /// Tile edge in map units
    #[arg(long)]
    pub cell_size: Option<f64>,

    /// VRT resolution rule
    #[arg(long, value_enum)]
    pub vrt_resolution: Option<VrtResolution>,

    /// Overview resampling
    #[arg(long, value_enum)]
    pub overview_resampling: Option<OverviewResampling>,
}

#[derive(Args)]
pub struct To8BitsArgs {
    /// Raster to export
    #[arg(short, long)]
    pub input: PathBuf,

    /// Style file (default: <input>.style.json)
    #[arg(long)]
    pub style: Option<PathBuf>,

    /// Optional cutout polygons
    #[arg(long)]
    pub cutout: Option<PathBuf>,

    /// Output GeoTIFF
    #[arg(short, long)]
    pub output: PathBuf,
}

#[derive(Args)]
pub struct BatchArgs {
    /// JSON file holding an array of operations
    #[arg(long)]
    pub operations: PathBuf,

    /// Keep going when an operation fails
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,
}
