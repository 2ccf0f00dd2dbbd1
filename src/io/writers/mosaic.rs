//! VRT mosaic and overview pyramid, both delegated to GDAL.
use std::path::{Path, PathBuf};

use gdal::Dataset;
use gdal::programs::raster::{BuildVRTOptions, build_vrt as gdal_build_vrt};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::types::{OverviewResampling, VrtResolution};

/// Assemble `tiles` into a VRT at `output`.
pub fn build_vrt(tiles: &[PathBuf], output: &Path, resolution: VrtResolution) -> Result<()> {
    if tiles.is_empty() {
        return Err(Error::Processing("no tile to assemble into a VRT".into()));
    }
    let datasets = tiles
        .iter()
        .map(Dataset::open)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::external)?;
    let options = BuildVRTOptions::new(vec!["-resolution", resolution.as_gdal_arg()])
        .map_err(Error::external)?;
    // Dropping the returned dataset flushes the VRT to disk
    let vrt = gdal_build_vrt(Some(output), &datasets, Some(options)).map_err(Error::external)?;
    drop(vrt);
    info!("VRT of {} tiles written to {}", tiles.len(), output.display());
    Ok(())
}

/// Build external (`.ovr`) overviews of the raster at `path`.
pub fn build_overviews(path: &Path, levels: &[i32], resampling: OverviewResampling) -> Result<()> {
    if levels.is_empty() {
        debug!("No overview level requested for {}", path.display());
        return Ok(());
    }
    let mut ds = Dataset::open(path).map_err(Error::external)?;
    ds.build_overviews(resampling.as_gdal_arg(), levels, &[])
        .map_err(Error::external)?;
    info!(
        "Overviews {:?} ({}) built for {}",
        levels,
        resampling.as_gdal_arg(),
        path.display()
    );
    Ok(())
}
