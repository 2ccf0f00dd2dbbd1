//! Polygon masks read from OGR vector sources (GeoPackage, Shapefile, GeoJSON, ...).
use std::path::{Path, PathBuf};

use gdal::raster::rasterize;
use gdal::vector::{Geometry, LayerAccess};
use gdal::{Dataset, DriverManager};
use ndarray::Array2;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::Extent;

/// Value burnt into mask rasters inside the polygons
pub const MASK_BURN_VALUE: u8 = 255;

/// Geometries of the first layer of a vector source and their extent.
pub struct VectorMask {
    pub path: PathBuf,
    pub geometries: Vec<Geometry>,
    pub extent: Extent,
    /// Layer spatial reference as WKT, when the source declares one
    pub projection: Option<String>,
}

impl VectorMask {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ds = Dataset::open(path)?;
        let mut layer = ds.layer(0)?;
        let envelope = layer.get_extent()?;
        let projection = layer.spatial_ref().and_then(|srs| srs.to_wkt().ok());
        let geometries: Vec<Geometry> = layer
            .features()
            .filter_map(|feature| feature.geometry().cloned())
            .collect();
        if geometries.is_empty() {
            return Err(Error::Processing(format!(
                "{} contains no geometry",
                path.display()
            )));
        }
        let extent = Extent::new(envelope.MinX, envelope.MinY, envelope.MaxX, envelope.MaxY);
        debug!(
            "Vector mask {}: {} geometries, extent {}",
            path.display(),
            geometries.len(),
            extent
        );
        Ok(Self {
            path: path.to_path_buf(),
            geometries,
            extent,
            projection,
        })
    }

    /// Burn the polygons into `ds` band 1
    pub fn burn_into(&self, ds: &mut Dataset) -> Result<()> {
        let burn_values = vec![MASK_BURN_VALUE as f64; self.geometries.len()];
        rasterize(ds, &[1], &self.geometries, &burn_values, None)?;
        Ok(())
    }

    /// In-memory mask for a raster window: `MASK_BURN_VALUE` inside the polygons, 0 elsewhere.
    /// `shape` is (cols, rows).
    pub fn rasterize_window(
        &self,
        geotransform: [f64; 6],
        shape: (usize, usize),
    ) -> Result<Array2<u8>> {
        let (cols, rows) = shape;
        if cols == 0 || rows == 0 {
            return Ok(Array2::zeros((rows, cols)));
        }
        let driver = DriverManager::get_driver_by_name("MEM")?;
        let mut ds = driver.create_with_band_type::<u8, _>("", cols, rows, 1)?;
        ds.set_geo_transform(&geotransform)?;
        self.burn_into(&mut ds)?;
        let band = ds.rasterband(1)?;
        let buf = band.read_as::<u8>((0, 0), shape, shape, None)?;
        Array2::from_shape_vec((rows, cols), buf.data().to_vec())
            .map_err(|e| Error::Processing(format!("mask window: {}", e)))
    }
}
