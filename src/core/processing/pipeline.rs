//! End-to-end runs. Each takes explicit inputs and a `Feedback`, checks for
//! cancellation after every delegated operation, and returns a `RunStatus`.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::feedback::Feedback;
use crate::core::params::MatchParams;
use crate::core::processing::grid::{TileGrid, TileTask};
use crate::core::processing::histogram::{CumulativeHistogram, accumulate_band};
use crate::core::processing::lut::{TransformTable, TransformTables, match_band};
use crate::core::processing::stretch::{StretchBounds, two_point_stretch};
use crate::core::processing::tiles::map_tile;
use crate::core::processing::to8bits::{alpha_plane, scale_block};
use crate::error::{Error, Result};
use crate::io::gdal::RasterSource;
use crate::io::services::{clip_raster, rasterize_mask, read_mask_block};
use crate::io::vector::VectorMask;
use crate::io::writers::metadata::TileProvenance;
use crate::io::writers::mosaic::{build_overviews, build_vrt};
use crate::io::writers::style::{StretchStyle, sidecar_path};
use crate::io::writers::tiff::{create_byte_geotiff, tag_rgba, write_plane, write_rgba_tile};
use crate::types::{ColorBand, RunStatus};

/// Rows scaled per strip by the 8-bit export
const EXPORT_STRIP_ROWS: usize = 512;

/// Inputs of the colorimetric equalization run (two-point stretch)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizeInputs {
    pub source: PathBuf,
    pub reference: PathBuf,
    /// Work area polygons restricting the histograms
    pub work_area: PathBuf,
    /// Style file to write; defaults to `<source>.style.json`
    pub style: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizeReport {
    pub style: StretchStyle,
    pub style_path: PathBuf,
}

/// Inputs of the histogram matching run (lookup tables, tiles and mosaic)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchInputs {
    pub source: PathBuf,
    pub reference: PathBuf,
    pub work_area: PathBuf,
    /// Final cutout; without it every valid source pixel is kept
    pub cutout: Option<PathBuf>,
    /// VRT path; tiles go to the directory of the same name without extension
    pub output: PathBuf,
    #[serde(default)]
    pub params: MatchParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileReport {
    pub grid: TileGrid,
    pub tiles: Vec<PathBuf>,
    pub vrt: PathBuf,
    /// Samples saturated to the end of their table, over all tiles
    pub clamped: usize,
    pub tables: TransformTables,
    pub finished_at: DateTime<Utc>,
}

/// Inputs of the 8-bit export driven by a stretch style
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct To8BitsInputs {
    pub source: PathBuf,
    /// Style file; defaults to `<source>.style.json`
    pub style: Option<PathBuf>,
    pub cutout: Option<PathBuf>,
    pub output: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct To8BitsReport {
    pub output: PathBuf,
    pub width: usize,
    pub height: usize,
    pub bounds: [StretchBounds; 3],
    pub finished_at: DateTime<Utc>,
}

/// Set progress, then tell whether the caller asked to stop
fn checkpoint(feedback: &dyn Feedback, percent: u8) -> bool {
    feedback.set_progress(percent);
    if feedback.is_canceled() {
        info!("Run cancelled at {}%", percent);
        return true;
    }
    false
}

/// Surface a terminal error through the feedback channel before returning it
fn reported<T>(feedback: &dyn Feedback, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        feedback.report_error(&e.to_string());
    }
    result
}

fn scratch_dir() -> Result<TempDir> {
    Ok(tempfile::Builder::new().prefix("satmatch-").tempdir()?)
}

fn cumulative(source: &RasterSource, band: ColorBand) -> Result<CumulativeHistogram> {
    let hist = accumulate_band(source, band.index(), 0)?;
    let cum = hist.cumulative();
    if !cum.is_usable() {
        return Err(Error::EmptyHistogram { band });
    }
    Ok(cum)
}

/// Histograms of one band of the clipped reference and source
fn band_histograms(
    reference: &RasterSource,
    matched: &RasterSource,
    band: ColorBand,
) -> Result<(CumulativeHistogram, CumulativeHistogram)> {
    Ok((cumulative(reference, band)?, cumulative(matched, band)?))
}

/// Clip source then reference by the work area, with a checkpoint after each.
fn clip_inputs(
    source: &Path,
    reference: &Path,
    work_area: &VectorMask,
    scratch: &Path,
    feedback: &dyn Feedback,
    progress: (u8, u8),
) -> Result<RunStatus<(RasterSource, RasterSource)>> {
    feedback.push_info("Clipping source and reference by the work area");
    let clipped_source = scratch.join("source_clip.tif");
    clip_raster(source, work_area, &clipped_source)?;
    if checkpoint(feedback, progress.0) {
        return Ok(RunStatus::Cancelled);
    }
    let clipped_reference = scratch.join("reference_clip.tif");
    clip_raster(reference, work_area, &clipped_reference)?;
    if checkpoint(feedback, progress.1) {
        return Ok(RunStatus::Cancelled);
    }
    Ok(RunStatus::Completed((
        RasterSource::open(&clipped_source)?,
        RasterSource::open(&clipped_reference)?,
    )))
}

/// Derive per-band stretch bounds and persist them as a style file.
pub fn run_equalize(
    inputs: &EqualizeInputs,
    feedback: &dyn Feedback,
) -> Result<RunStatus<EqualizeReport>> {
    let work_area = VectorMask::open(&inputs.work_area)?;
    let scratch = scratch_dir()?;

    feedback.set_progress(5);
    let (matched, reference) = match clip_inputs(
        &inputs.source,
        &inputs.reference,
        &work_area,
        scratch.path(),
        feedback,
        (15, 20),
    )? {
        RunStatus::Completed(pair) => pair,
        RunStatus::Cancelled => return Ok(RunStatus::Cancelled),
    };

    let mut bounds = Vec::with_capacity(3);
    for (band, percent) in ColorBand::ALL.into_iter().zip([40u8, 65, 95]) {
        feedback.push_info(&format!("Histogram of the {} band", band));
        let result = band_histograms(&reference, &matched, band)
            .and_then(|(ref_cum, match_cum)| two_point_stretch(band, &ref_cum, &match_cum));
        bounds.push(reported(feedback, result)?);
        if checkpoint(feedback, percent) {
            return Ok(RunStatus::Cancelled);
        }
    }

    let mut style = StretchStyle::new(bounds[0], bounds[1], bounds[2]);
    style.source = Some(inputs.source.clone());
    style.reference = Some(inputs.reference.clone());
    let style_path = inputs
        .style
        .clone()
        .unwrap_or_else(|| sidecar_path(&inputs.source));
    style.save(&style_path)?;
    feedback.set_progress(100);
    Ok(RunStatus::Completed(EqualizeReport { style, style_path }))
}

fn tile_path(dir: &Path, task: &TileTask) -> PathBuf {
    dir.join(&task.file_name)
}

/// Directory receiving the tiles of a mosaic written at `output`: the same path
/// without extension, or with a `_tiles` suffix when there is no extension to drop.
pub fn tile_dir(output: &Path) -> PathBuf {
    if output.extension().is_some() {
        return output.with_extension("");
    }
    let mut name = output.as_os_str().to_os_string();
    name.push("_tiles");
    PathBuf::from(name)
}

/// Match the source onto the reference distribution, write the tiles and assemble the mosaic.
pub fn run_histogram_match(
    inputs: &MatchInputs,
    feedback: &dyn Feedback,
) -> Result<RunStatus<TileReport>> {
    let params = &inputs.params;
    params.validate()?;
    let work_area = VectorMask::open(&inputs.work_area)?;
    let cutout = match &inputs.cutout {
        Some(path) if path != &inputs.work_area => Some(VectorMask::open(path)?),
        _ => None,
    };
    let scratch = scratch_dir()?;

    feedback.set_progress(1);
    let (matched, reference) = match clip_inputs(
        &inputs.source,
        &inputs.reference,
        &work_area,
        scratch.path(),
        feedback,
        (5, 10),
    )? {
        RunStatus::Completed(pair) => pair,
        RunStatus::Cancelled => return Ok(RunStatus::Cancelled),
    };

    let mut tables: Vec<TransformTable> = Vec::with_capacity(3);
    for (band, percent) in ColorBand::ALL.into_iter().zip([20u8, 30, 40]) {
        feedback.push_info(&format!("Transformation table of the {} band", band));
        let result = band_histograms(&reference, &matched, band).and_then(|(ref_cum, match_cum)| {
            match_band(band, &ref_cum, &match_cum, params.desaturation, params.saturation)
        });
        tables.push(reported(feedback, result)?);
        if checkpoint(feedback, percent) {
            return Ok(RunStatus::Cancelled);
        }
    }
    let mut tables = tables.into_iter();
    let (Some(red), Some(green), Some(blue)) = (tables.next(), tables.next(), tables.next()) else {
        return Err(Error::Processing("missing band table".into()));
    };
    let tables = TransformTables { red, green, blue };
    drop(matched);
    drop(reference);

    // Cutout mask raster; its extent drives the grid
    let mask_source = if inputs.cutout.is_some() {
        feedback.push_info("Rasterizing the cutout mask");
        let vector = cutout.as_ref().unwrap_or(&work_area);
        let mask_path = scratch.path().join("mask.tif");
        rasterize_mask(vector, params.mask_pixel_size, &mask_path)?;
        Some(RasterSource::open(&mask_path)?)
    } else {
        None
    };
    if checkpoint(feedback, 50) {
        return Ok(RunStatus::Cancelled);
    }

    let source = RasterSource::open(&inputs.source)?;
    let origin_extent = match &mask_source {
        Some(mask) => mask.metadata.extent(),
        None => work_area.extent,
    };
    let grid = TileGrid::plan(
        &origin_extent,
        params.tile.cell_size,
        source.metadata.pixel_size_x(),
        source.metadata.pixel_size_y(),
    )?;
    if grid.cell_count() == 0 {
        return Err(Error::Processing(format!(
            "tile grid over {} is empty",
            origin_extent
        )));
    }
    let tasks = grid.tasks(&params.tile);
    if checkpoint(feedback, 60) {
        return Ok(RunStatus::Cancelled);
    }

    let dir = tile_dir(&inputs.output);
    std::fs::create_dir_all(&dir)?;
    feedback.push_debug(&format!("Final extent: {}", grid.extent));
    let provenance = TileProvenance::new(
        &inputs.source.display().to_string(),
        &inputs.reference.display().to_string(),
        params,
    )
    .with_crs(source.metadata.crs.clone());
    feedback.push_debug(&format!(
        "Source CRS: {}",
        source.metadata.crs.as_deref().unwrap_or("unknown")
    ));

    let total = tasks.len();
    let mut tiles = Vec::with_capacity(total);
    let mut clamped = 0usize;
    for (k, task) in tasks.iter().enumerate() {
        feedback.push_info(&format!("Tile {}", task.file_name));
        let (w, h) = (grid.width_px, grid.height_px);
        let red = source.read_block(ColorBand::Red.index(), &task.extent, w, h)?;
        let green = source.read_block(ColorBand::Green.index(), &task.extent, w, h)?;
        let blue = source.read_block(ColorBand::Blue.index(), &task.extent, w, h)?;
        let mask = match &mask_source {
            Some(m) => Some(read_mask_block(m, &task.extent, w, h)?),
            None => None,
        };
        let pixels = map_tile(&red, &green, &blue, mask.as_ref(), &tables)?;
        clamped += pixels.clamped;

        let path = tile_path(&dir, task);
        debug!(
            "Tile {}: {} of {} pixels opaque",
            path.display(),
            pixels.opaque_count(),
            w * h
        );
        let gt = task.geotransform(grid.pixel_size_x, grid.pixel_size_y);
        write_rgba_tile(&path, &pixels, &gt, &source.metadata.projection, Some(&provenance))?;
        tiles.push(path);

        let percent = 60 + ((k + 1) * 40 / total) as u8;
        if checkpoint(feedback, percent.min(99)) {
            return Ok(RunStatus::Cancelled);
        }
    }
    debug!("{} tiles written to {}", tiles.len(), dir.display());

    build_vrt(&tiles, &inputs.output, params.vrt_resolution)?;
    if checkpoint(feedback, 99) {
        return Ok(RunStatus::Cancelled);
    }
    build_overviews(
        &inputs.output,
        &params.overview_levels,
        params.overview_resampling,
    )?;
    feedback.set_progress(100);

    Ok(RunStatus::Completed(TileReport {
        grid,
        tiles,
        vrt: inputs.output.clone(),
        clamped,
        tables,
        finished_at: Utc::now(),
    }))
}

/// Rescale the color bands of a raster to bytes between the style bounds.
pub fn run_to8bits(
    inputs: &To8BitsInputs,
    feedback: &dyn Feedback,
) -> Result<RunStatus<To8BitsReport>> {
    let style_path = inputs
        .style
        .clone()
        .unwrap_or_else(|| sidecar_path(&inputs.source));
    let style = StretchStyle::load(&style_path)?;
    let scratch = scratch_dir()?;

    let input = match &inputs.cutout {
        Some(cutout) => {
            let mask = VectorMask::open(cutout)?;
            let clipped = scratch.path().join("to8bits_clip.tif");
            clip_raster(&inputs.source, &mask, &clipped)?;
            clipped
        }
        None => inputs.source.clone(),
    };
    if checkpoint(feedback, 10) {
        return Ok(RunStatus::Cancelled);
    }

    let source = RasterSource::open(&input)?;
    let meta = &source.metadata;
    if meta.bands < ColorBand::ALL.len() {
        return Err(Error::Processing(format!(
            "{} has {} bands, 3 color bands are required",
            input.display(),
            meta.bands
        )));
    }
    if inputs.output.exists() {
        std::fs::remove_file(&inputs.output)?;
    }
    let ds = create_byte_geotiff(
        &inputs.output,
        meta.size_x,
        meta.size_y,
        4,
        &meta.geotransform,
        &meta.projection,
    )?;
    tag_rgba(&ds)?;

    let mut row = 0;
    while row < meta.size_y {
        let rows = EXPORT_STRIP_ROWS.min(meta.size_y - row);
        let mut alpha = None;
        for band in ColorBand::ALL {
            let block = source.read_rows(band.index(), row, rows)?;
            write_plane(&ds, band.index(), row, &scale_block(&block, style.bounds(band)))?;
            if band == ColorBand::Red {
                alpha = Some(alpha_plane(&block.valid));
            }
        }
        if let Some(alpha) = alpha {
            write_plane(&ds, 4, row, &alpha)?;
        }
        row += rows;
        let percent = 10 + (row * 85 / meta.size_y) as u8;
        if checkpoint(feedback, percent) {
            return Ok(RunStatus::Cancelled);
        }
    }
    drop(ds);
    info!(
        "8-bit export of {} written to {}",
        inputs.source.display(),
        inputs.output.display()
    );
    feedback.set_progress(100);

    Ok(RunStatus::Completed(To8BitsReport {
        output: inputs.output.clone(),
        width: meta.size_x,
        height: meta.size_y,
        bounds: [style.red, style.green, style.blue],
        finished_at: Utc::now(),
    }))
}
