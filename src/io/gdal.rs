use gdal::raster::{ColorInterpretation, ResampleAlg};
use gdal::{Dataset, errors::GdalError as GdalCrateError};
use ndarray::{Array2, Zip, s};
use std::path::Path;
use thiserror::Error;

use crate::types::Extent;

/// Errors encountered when using GDAL reader
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// Metadata extracted from a GDAL-supported raster
#[derive(Debug, Clone)]
pub struct RasterMetadata {
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform coefficients ([origin_x, pixel_width, rot_x, origin_y, rot_y, pixel_height])
    pub geotransform: [f64; 6],
    /// Projection in WKT format, as stored in the dataset
    pub projection: String,
    /// `EPSG:XXXX` label when the WKT carries an authority code
    pub crs: Option<String>,
    /// Nodata value of each band (index 0 is band 1)
    pub nodata: Vec<Option<f64>>,
    /// 1-based index of the band tagged as alpha, if any
    pub alpha_band: Option<usize>,
}

impl RasterMetadata {
    pub fn pixel_size_x(&self) -> f64 {
        self.geotransform[1].abs()
    }

    pub fn pixel_size_y(&self) -> f64 {
        self.geotransform[5].abs()
    }

    pub fn extent(&self) -> Extent {
        let gt = &self.geotransform;
        Extent::new(
            gt[0],
            gt[3] + gt[5] * self.size_y as f64,
            gt[0] + gt[1] * self.size_x as f64,
            gt[3],
        )
    }

    /// Pixel window `(offset, size)` of this raster's grid covering `extent`
    pub fn pixel_window(&self, extent: &Extent) -> Option<((usize, usize), (usize, usize))> {
        let inter = extent.intersection(&self.extent())?;
        let gt = &self.geotransform;
        let py = gt[5].abs();
        let x0 = ((inter.xmin - gt[0]) / gt[1]).floor().max(0.0) as usize;
        let x1 = (((inter.xmax - gt[0]) / gt[1]).ceil() as usize).min(self.size_x);
        let y0 = ((gt[3] - inter.ymax) / py).floor().max(0.0) as usize;
        let y1 = (((gt[3] - inter.ymin) / py).ceil() as usize).min(self.size_y);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(((x0, y0), (x1 - x0, y1 - y0)))
    }

    /// Geotransform of a sub-window starting at pixel `offset`
    pub fn window_geotransform(&self, offset: (usize, usize)) -> [f64; 6] {
        let mut gt = self.geotransform;
        gt[0] += offset.0 as f64 * gt[1];
        gt[3] += offset.1 as f64 * gt[5];
        gt
    }
}

/// Samples of one band over a window, with per-pixel validity
#[derive(Debug, Clone)]
pub struct RasterBlock {
    pub values: Array2<f64>,
    pub valid: Array2<bool>,
}

impl RasterBlock {
    /// Block with no valid sample
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            values: Array2::zeros((height, width)),
            valid: Array2::from_elem((height, width), false),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.values.dim()
    }
}

/// Read-only access to a north-up GDAL raster
pub struct RasterSource {
    pub dataset: Dataset,
    pub metadata: RasterMetadata,
}

// Helper to extract EPSG code from WKT authority tag
fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    const KEY_WKT2: &str = "ID[\"EPSG\",";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    if let Some(idx) = wkt.rfind(KEY_WKT2) {
        let start = idx + KEY_WKT2.len();
        if let Some(end) = wkt[start..].find(']') {
            let code = wkt[start..start + end].trim();
            return Some(format!("EPSG:{}", code));
        }
    }
    None
}

/// Source pixel index holding a fractional pixel position, if inside `0..size`
fn source_index(pos: f64, size: usize) -> Option<usize> {
    let p = pos.floor();
    (p >= 0.0 && p < size as f64).then_some(p as usize)
}

impl RasterSource {
    /// Open a GDAL-supported raster (GeoTIFF, VRT, ...)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        if bands == 0 {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }
        let geotransform = dataset.geo_transform().map_err(|_| {
            GdalError::UnsupportedFormat(format!(
                "{} has no geotransform",
                path.as_ref().display()
            ))
        })?;
        if geotransform[2] != 0.0 || geotransform[4] != 0.0 {
            return Err(GdalError::UnsupportedFormat(
                "Rotated geotransforms are not supported".into(),
            ));
        }
        if geotransform[1] <= 0.0 || geotransform[5] >= 0.0 {
            return Err(GdalError::UnsupportedFormat(
                "Raster must be north-up".into(),
            ));
        }
        let projection = dataset.projection();
        let crs = parse_epsg(&projection);

        let mut nodata = Vec::with_capacity(bands);
        let mut alpha_band = None;
        for idx in 1..=bands {
            let band = dataset.rasterband(idx)?;
            nodata.push(band.no_data_value());
            if alpha_band.is_none()
                && matches!(band.color_interpretation(), ColorInterpretation::AlphaBand)
            {
                alpha_band = Some(idx);
            }
        }

        Ok(RasterSource {
            dataset,
            metadata: RasterMetadata {
                size_x,
                size_y,
                bands,
                geotransform,
                projection,
                crs,
                nodata,
                alpha_band,
            },
        })
    }

    fn check_band(&self, index: usize) -> Result<(), GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        Ok(())
    }

    /// Read a source window of one band, resampled (nearest) to `shape` = (cols, rows)
    fn read_window(
        &self,
        index: usize,
        offset: (usize, usize),
        window: (usize, usize),
        shape: (usize, usize),
    ) -> Result<Array2<f64>, GdalError> {
        let band = self.dataset.rasterband(index)?;
        let buf = band.read_as::<f64>(
            (offset.0 as isize, offset.1 as isize),
            window,
            shape,
            Some(ResampleAlg::NearestNeighbour),
        )?;
        let data_vec = buf.data().to_vec();
        let len = data_vec.len();
        Array2::from_shape_vec((shape.1, shape.0), data_vec)
            .map_err(|_| GdalError::DimensionMismatch(shape.0, shape.1, len, 1))
    }

    /// Validity of samples of `index`: not nodata, not NaN, and not transparent in the alpha band
    fn validity(
        &self,
        index: usize,
        values: &Array2<f64>,
        alpha: Option<&Array2<f64>>,
    ) -> Array2<bool> {
        let nodata = self.metadata.nodata[index - 1];
        let mut valid = values.mapv(|v| !v.is_nan() && nodata.is_none_or(|nd| v != nd));
        if let Some(alpha) = alpha {
            Zip::from(&mut valid).and(alpha).for_each(|ok, &a| {
                *ok = *ok && a != 0.0;
            });
        }
        valid
    }

    fn alpha_for(&self, index: usize) -> Option<usize> {
        self.metadata.alpha_band.filter(|&a| a != index)
    }

    /// Read a pixel window of one band (1-based index) at full resolution
    pub fn read_pixels(
        &self,
        index: usize,
        offset: (usize, usize),
        size: (usize, usize),
    ) -> Result<RasterBlock, GdalError> {
        self.check_band(index)?;
        let cols = size.0.min(self.metadata.size_x.saturating_sub(offset.0));
        let rows = size.1.min(self.metadata.size_y.saturating_sub(offset.1));
        if cols == 0 || rows == 0 {
            return Ok(RasterBlock::empty(cols, rows));
        }
        let window = (cols, rows);
        let values = self.read_window(index, offset, window, window)?;
        let alpha = match self.alpha_for(index) {
            Some(a) => Some(self.read_window(a, offset, window, window)?),
            None => None,
        };
        let valid = self.validity(index, &values, alpha.as_ref());
        Ok(RasterBlock { values, valid })
    }

    /// Read `rows` full lines of one band starting at `row`
    pub fn read_rows(
        &self,
        index: usize,
        row: usize,
        rows: usize,
    ) -> Result<RasterBlock, GdalError> {
        self.read_pixels(index, (0, row), (self.metadata.size_x, rows))
    }

    /// Read one band over a map extent at `width` x `height` pixels.
    ///
    /// Each output pixel takes the source pixel under its centre (nearest
    /// neighbour), so sources need not be aligned on the cell edges.
    /// Pixels of the extent that fall outside the raster are invalid.
    pub fn read_block(
        &self,
        index: usize,
        extent: &Extent,
        width: usize,
        height: usize,
    ) -> Result<RasterBlock, GdalError> {
        self.check_band(index)?;
        let mut block = RasterBlock::empty(width, height);
        if width == 0 || height == 0 {
            return Ok(block);
        }
        let Some(inter) = extent.intersection(&self.metadata.extent()) else {
            return Ok(block);
        };

        let dx = extent.width() / width as f64;
        let dy = extent.height() / height as f64;
        let c0 = (((inter.xmin - extent.xmin) / dx).round() as usize).min(width);
        let c1 = (((inter.xmax - extent.xmin) / dx).round() as usize).min(width);
        let r0 = (((extent.ymax - inter.ymax) / dy).round() as usize).min(height);
        let r1 = (((extent.ymax - inter.ymin) / dy).round() as usize).min(height);
        if c1 <= c0 || r1 <= r0 {
            return Ok(block);
        }

        // Sample the source pixel under each output pixel centre
        let gt = &self.metadata.geotransform;
        let px = gt[1];
        let py = gt[5].abs();
        let cols: Vec<Option<usize>> = (c0..c1)
            .map(|c| {
                let x = extent.xmin + (c as f64 + 0.5) * dx;
                source_index((x - gt[0]) / px, self.metadata.size_x)
            })
            .collect();
        let rows: Vec<Option<usize>> = (r0..r1)
            .map(|r| {
                let y = extent.ymax - (r as f64 + 0.5) * dy;
                source_index((gt[3] - y) / py, self.metadata.size_y)
            })
            .collect();
        let (Some(sx0), Some(sx1)) = (
            cols.iter().flatten().min().copied(),
            cols.iter().flatten().max().copied(),
        ) else {
            return Ok(block);
        };
        let (Some(sy0), Some(sy1)) = (
            rows.iter().flatten().min().copied(),
            rows.iter().flatten().max().copied(),
        ) else {
            return Ok(block);
        };

        let offset = (sx0, sy0);
        let window = (sx1 - sx0 + 1, sy1 - sy0 + 1);
        let values = self.read_window(index, offset, window, window)?;
        let alpha = match self.alpha_for(index) {
            Some(a) => Some(self.read_window(a, offset, window, window)?),
            None => None,
        };
        let valid = self.validity(index, &values, alpha.as_ref());

        Zip::indexed(block.values.slice_mut(s![r0..r1, c0..c1]))
            .and(block.valid.slice_mut(s![r0..r1, c0..c1]))
            .for_each(|(r, c), v, ok| {
                if let (Some(sy), Some(sx)) = (rows[r], cols[c]) {
                    let at = [sy - sy0, sx - sx0];
                    *v = values[at];
                    *ok = valid[at];
                }
            });
        Ok(block)
    }
}
