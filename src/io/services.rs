//! Raster services the pipelines delegate to: cutting a raster by polygons and
//! burning polygons into a mask raster.
use std::path::Path;

use gdal::Dataset;
use ndarray::{Array2, Zip};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::io::gdal::RasterSource;
use crate::io::vector::{MASK_BURN_VALUE, VectorMask};
use crate::io::writers::tiff::{create_byte_geotiff, tag_rgba, write_plane};
use crate::types::{ColorBand, Extent};

/// Rows processed per strip
const STRIP_ROWS: usize = 512;

/// Nodata value of the clipped color bands and of rasterized masks
pub const NODATA: f64 = 0.0;

fn set_nodata(ds: &Dataset, bands: std::ops::RangeInclusive<usize>) -> Result<()> {
    for idx in bands {
        let mut band = ds.rasterband(idx)?;
        band.set_no_data_value(Some(NODATA))?;
    }
    Ok(())
}

/// Truncate to a byte, as the lookup tables index their entries
#[inline]
fn to_byte(v: f64) -> u8 {
    v.trunc().clamp(0.0, 255.0) as u8
}

/// Cut the color bands of `raster` by the polygons of `mask`.
///
/// The output covers the mask extent on the raster's own grid. Pixels outside the
/// polygons or invalid in the source red band are 0 with alpha 0.
pub fn clip_raster(raster: &Path, mask: &VectorMask, output: &Path) -> Result<()> {
    let source = RasterSource::open(raster)?;
    let meta = &source.metadata;
    if meta.bands < ColorBand::ALL.len() {
        return Err(Error::Processing(format!(
            "{} has {} bands, 3 color bands are required",
            raster.display(),
            meta.bands
        )));
    }
    let Some((offset, (cols, rows))) = meta.pixel_window(&mask.extent) else {
        return Err(Error::Processing(format!(
            "mask {} does not overlap {}",
            mask.path.display(),
            raster.display()
        )));
    };
    let gt = meta.window_geotransform(offset);

    if output.exists() {
        std::fs::remove_file(output)?;
    }
    let ds = create_byte_geotiff(output, cols, rows, 4, &gt, &meta.projection)?;
    tag_rgba(&ds)?;
    set_nodata(&ds, 1..=3)?;

    let mut inside = 0usize;
    let mut row = 0;
    while row < rows {
        let strip = STRIP_ROWS.min(rows - row);
        let origin = (offset.0, offset.1 + row);
        let burnt = mask.rasterize_window(meta.window_geotransform(origin), (cols, strip))?;

        let red = source.read_pixels(ColorBand::Red.index(), origin, (cols, strip))?;
        let mut keep = red.valid.clone();
        Zip::from(&mut keep).and(&burnt).for_each(|k, &m| {
            *k = *k && m == MASK_BURN_VALUE;
        });
        inside += keep.iter().filter(|&&k| k).count();

        for band in ColorBand::ALL {
            let block = if band == ColorBand::Red {
                red.clone()
            } else {
                source.read_pixels(band.index(), origin, (cols, strip))?
            };
            let mut plane = Array2::<u8>::zeros((strip, cols));
            Zip::from(&mut plane)
                .and(&block.values)
                .and(&keep)
                .for_each(|o, &v, &k| {
                    if k {
                        *o = to_byte(v);
                    }
                });
            write_plane(&ds, band.index(), row, &plane)?;
        }
        let alpha = keep.mapv(|k| if k { 255u8 } else { 0 });
        write_plane(&ds, 4, row, &alpha)?;
        row += strip;
    }

    info!(
        "Clipped {} by {} into {} ({}x{}, {} pixels inside)",
        raster.display(),
        mask.path.display(),
        output.display(),
        cols,
        rows,
        inside
    );
    Ok(())
}

/// Burn the polygons of `mask` into a single-band byte raster covering the layer
/// extent at `pixel_size`: 255 inside, 0 (nodata) outside.
pub fn rasterize_mask(mask: &VectorMask, pixel_size: f64, output: &Path) -> Result<()> {
    if !(pixel_size.is_finite() && pixel_size > 0.0) {
        return Err(Error::invalid("pixel_size", pixel_size));
    }
    let extent = &mask.extent;
    let cols = (extent.width() / pixel_size).ceil() as usize;
    let rows = (extent.height() / pixel_size).ceil() as usize;
    if cols == 0 || rows == 0 {
        return Err(Error::Processing(format!(
            "mask {} has an empty extent {}",
            mask.path.display(),
            extent
        )));
    }
    let gt = [extent.xmin, pixel_size, 0.0, extent.ymax, 0.0, -pixel_size];

    if output.exists() {
        std::fs::remove_file(output)?;
    }
    let projection = mask.projection.as_deref().unwrap_or("");
    let mut ds = create_byte_geotiff(output, cols, rows, 1, &gt, projection)?;
    set_nodata(&ds, 1..=1)?;
    mask.burn_into(&mut ds)?;
    debug!(
        "Rasterized {} into {} ({}x{} at {})",
        mask.path.display(),
        output.display(),
        cols,
        rows,
        pixel_size
    );
    Ok(())
}

/// Read the mask raster over a tile extent, aligned with the tile pixels.
/// Pixels outside the mask raster read as 0.
pub fn read_mask_block(
    mask: &RasterSource,
    extent: &Extent,
    width: usize,
    height: usize,
) -> Result<Array2<u8>> {
    let block = mask.read_block(1, extent, width, height)?;
    let mut out = Array2::<u8>::zeros(block.dim());
    Zip::from(&mut out)
        .and(&block.values)
        .and(&block.valid)
        .for_each(|o, &v, &ok| {
            if ok {
                *o = to_byte(v);
            }
        });
    Ok(out)
}
