use gdal::raster::{Buffer, ColorInterpretation, RasterCreationOptions};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use std::path::Path;
use tracing::debug;

use crate::core::processing::tiles::TilePixels;
use crate::error::{Error, Result};
use crate::io::writers::metadata::{TileProvenance, embed_provenance};

/// Creation options shared by every GeoTIFF this crate writes
pub fn creation_options() -> Result<RasterCreationOptions> {
    let mut co = RasterCreationOptions::new();
    co.add_string("COMPRESS=DEFLATE")?;
    co.add_string("PREDICTOR=2")?;
    Ok(co)
}

/// Create a compressed byte GeoTIFF with `bands` bands, georeferenced by `geotransform`
pub fn create_byte_geotiff(
    output: &Path,
    cols: usize,
    rows: usize,
    bands: usize,
    geotransform: &[f64; 6],
    projection: &str,
) -> Result<Dataset> {
    let driver = DriverManager::get_driver_by_name("GTiff")?;
    let co = creation_options()?;
    let mut ds = driver.create_with_band_type_with_options::<u8, _>(output, cols, rows, bands, &co)?;
    ds.set_geo_transform(geotransform)?;
    if !projection.is_empty() {
        ds.set_projection(projection)?;
    }
    Ok(ds)
}

/// Write one plane into band `index` (1-based) at row `row`
pub fn write_plane(ds: &Dataset, index: usize, row: usize, plane: &Array2<u8>) -> Result<()> {
    let (rows, cols) = plane.dim();
    if rows == 0 || cols == 0 {
        return Ok(());
    }
    let data: Vec<u8> = plane.iter().copied().collect();
    let mut buf = Buffer::new((cols, rows), data);
    let mut band = ds.rasterband(index)?;
    band.write((0, row as isize), (cols, rows), &mut buf)?;
    Ok(())
}

/// Tag bands 1..=4 as red, green, blue and alpha
pub fn tag_rgba(ds: &Dataset) -> Result<()> {
    let tags = [
        ColorInterpretation::RedBand,
        ColorInterpretation::GreenBand,
        ColorInterpretation::BlueBand,
        ColorInterpretation::AlphaBand,
    ];
    for (i, tag) in tags.into_iter().enumerate() {
        let mut band = ds.rasterband(i + 1)?;
        band.set_color_interpretation(tag)?;
    }
    Ok(())
}

/// Write a 4-band RGBA tile. The file is fully rewritten.
pub fn write_rgba_tile(
    output: &Path,
    pixels: &TilePixels,
    geotransform: &[f64; 6],
    projection: &str,
    provenance: Option<&TileProvenance>,
) -> Result<()> {
    let (rows, cols) = pixels.dim();
    if rows == 0 || cols == 0 {
        return Err(Error::Processing(format!(
            "refusing to write empty tile {}",
            output.display()
        )));
    }
    if output.exists() {
        std::fs::remove_file(output)?;
    }
    let mut ds = create_byte_geotiff(output, cols, rows, 4, geotransform, projection)?;
    tag_rgba(&ds)?;
    if let Some(prov) = provenance {
        embed_provenance(&mut ds, prov)?;
    }
    for (i, plane) in pixels.planes().into_iter().enumerate() {
        write_plane(&ds, i + 1, 0, plane)?;
    }
    debug!("Wrote tile {} ({}x{})", output.display(), cols, rows);
    Ok(())
}
