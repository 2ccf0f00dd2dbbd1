//! Fixed-size tiling grid snapped to round map coordinates.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::params::TileLayout;
use crate::error::{Error, Result};
use crate::types::Extent;

/// Grid of square cells covering a snapped extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileGrid {
    /// Snapped extent covered by the grid
    pub extent: Extent,
    pub cell_size: f64,
    pub columns: usize,
    pub rows: usize,
    /// Pixel dimensions of one cell
    pub width_px: usize,
    pub height_px: usize,
    pub pixel_size_x: f64,
    pub pixel_size_y: f64,
}

/// One unit of tile work: a grid cell and the file it is written to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileTask {
    pub column: usize,
    pub row: usize,
    pub extent: Extent,
    pub file_name: String,
}

impl TileTask {
    /// Geotransform of the tile: north-up, origin at the cell's upper-left corner.
    pub fn geotransform(&self, pixel_size_x: f64, pixel_size_y: f64) -> [f64; 6] {
        [
            self.extent.xmin,
            pixel_size_x,
            0.0,
            self.extent.ymax,
            0.0,
            -pixel_size_y,
        ]
    }
}

#[inline]
fn block_floor(coord: f64, block: f64) -> f64 {
    (coord / block).trunc() * block
}

#[inline]
fn remainder(coord: f64, block: f64) -> f64 {
    coord.trunc().abs() % block
}

/// Lower edge: stay on the block boundary in its first half, else move to the half-block.
pub fn snap_min(coord: f64, cell: f64) -> f64 {
    let block = 2.0 * cell;
    if remainder(coord, block) < cell {
        block_floor(coord, block)
    } else {
        block_floor(coord, block) + cell
    }
}

/// Upper edge: exact block boundaries are kept, otherwise round up to the next half-block.
pub fn snap_max(coord: f64, cell: f64) -> f64 {
    let block = 2.0 * cell;
    let r = remainder(coord, block);
    if r == 0.0 {
        coord
    } else if r <= cell {
        block_floor(coord, block) + cell
    } else {
        block_floor(coord, block) + block
    }
}

impl TileGrid {
    pub fn plan(
        extent: &Extent,
        cell_size: f64,
        pixel_size_x: f64,
        pixel_size_y: f64,
    ) -> Result<Self> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(Error::invalid("cell_size", cell_size));
        }
        if !(pixel_size_x.is_finite() && pixel_size_x > 0.0) {
            return Err(Error::invalid("pixel_size_x", pixel_size_x));
        }
        if !(pixel_size_y.is_finite() && pixel_size_y > 0.0) {
            return Err(Error::invalid("pixel_size_y", pixel_size_y));
        }

        let snapped = Extent::new(
            snap_min(extent.xmin, cell_size),
            snap_min(extent.ymin, cell_size),
            snap_max(extent.xmax, cell_size),
            snap_max(extent.ymax, cell_size),
        );
        let columns = (snapped.width() / cell_size).max(0.0) as usize;
        let rows = (snapped.height() / cell_size).max(0.0) as usize;
        let width_px = (cell_size / pixel_size_x) as usize;
        let height_px = (cell_size / pixel_size_y) as usize;
        if width_px == 0 || height_px == 0 {
            return Err(Error::Processing(format!(
                "pixel size {}x{} is larger than the cell size {}",
                pixel_size_x, pixel_size_y, cell_size
            )));
        }

        debug!(
            "Tile grid {} -> {}: {}x{} cells of {}x{} px",
            extent, snapped, columns, rows, width_px, height_px
        );
        Ok(Self {
            extent: snapped,
            cell_size,
            columns,
            rows,
            width_px,
            height_px,
            pixel_size_x,
            pixel_size_y,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.columns * self.rows
    }

    pub fn cell_extent(&self, column: usize, row: usize) -> Extent {
        let xmin = self.extent.xmin + column as f64 * self.cell_size;
        let ymin = self.extent.ymin + row as f64 * self.cell_size;
        Extent::new(xmin, ymin, xmin + self.cell_size, ymin + self.cell_size)
    }

    /// All cells as tasks, column by column from the grid origin.
    pub fn tasks(&self, layout: &TileLayout) -> Vec<TileTask> {
        let mut tasks = Vec::with_capacity(self.cell_count());
        for column in 0..self.columns {
            for row in 0..self.rows {
                let extent = self.cell_extent(column, row);
                tasks.push(TileTask {
                    column,
                    row,
                    file_name: layout.file_name(extent.xmin, extent.ymin),
                    extent,
                });
            }
        }
        tasks
    }
}
