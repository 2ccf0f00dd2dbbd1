//! Per-tile pixel mapping: gate, table lookup and alpha.
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array2, Zip};
use tracing::debug;

use crate::core::processing::lut::{TransformTable, TransformTables};
use crate::error::{Error, Result};
use crate::io::gdal::RasterBlock;
use crate::io::vector::MASK_BURN_VALUE;

/// Output planes of one tile
#[derive(Debug, Clone, PartialEq)]
pub struct TilePixels {
    pub red: Array2<u8>,
    pub green: Array2<u8>,
    pub blue: Array2<u8>,
    pub alpha: Array2<u8>,
    /// Samples past the end of their band table, saturated to the last entry
    pub clamped: usize,
}

impl TilePixels {
    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.alpha.dim()
    }

    /// Planes in band order: red, green, blue, alpha
    pub fn planes(&self) -> [&Array2<u8>; 4] {
        [&self.red, &self.green, &self.blue, &self.alpha]
    }

    pub fn opaque_count(&self) -> usize {
        self.alpha.iter().filter(|&&a| a != 0).count()
    }
}

/// Pixels that receive data: valid in the source red band and, when a mask
/// is given, inside its polygons.
pub fn gate(red: &RasterBlock, mask: Option<&Array2<u8>>) -> Result<Array2<bool>> {
    let mut gate = red.valid.clone();
    if let Some(mask) = mask {
        if mask.dim() != gate.dim() {
            let (rows, cols) = gate.dim();
            let (mrows, mcols) = mask.dim();
            return Err(Error::Processing(format!(
                "mask block is {}x{}, tile is {}x{}",
                mcols, mrows, cols, rows
            )));
        }
        Zip::from(&mut gate).and(mask).for_each(|g, &m| {
            *g = *g && m == MASK_BURN_VALUE;
        });
    }
    Ok(gate)
}

fn map_band(
    block: &RasterBlock,
    gate: &Array2<bool>,
    table: &TransformTable,
    clamped: &AtomicUsize,
) -> Array2<u8> {
    let mut out = Array2::<u8>::zeros(gate.dim());
    Zip::from(&mut out)
        .and(&block.values)
        .and(gate)
        .par_for_each(|o, &v, &open| {
            if open {
                let (value, saturated) = table.lookup(v);
                if saturated {
                    clamped.fetch_add(1, Ordering::Relaxed);
                }
                *o = value;
            }
        });
    out
}

/// Map the three source blocks of a tile through the band tables.
///
/// Closed pixels are 0 in every band, open pixels get alpha 255.
pub fn map_tile(
    red: &RasterBlock,
    green: &RasterBlock,
    blue: &RasterBlock,
    mask: Option<&Array2<u8>>,
    tables: &TransformTables,
) -> Result<TilePixels> {
    let dim = red.dim();
    if green.dim() != dim || blue.dim() != dim {
        return Err(Error::Processing(format!(
            "band blocks differ in size: {:?} {:?} {:?}",
            dim,
            green.dim(),
            blue.dim()
        )));
    }
    let gate = gate(red, mask)?;
    let clamped = AtomicUsize::new(0);
    let pixels = TilePixels {
        red: map_band(red, &gate, &tables.red, &clamped),
        green: map_band(green, &gate, &tables.green, &clamped),
        blue: map_band(blue, &gate, &tables.blue, &clamped),
        alpha: gate.mapv(|open| if open { 255 } else { 0 }),
        clamped: clamped.into_inner(),
    };
    if pixels.clamped > 0 {
        debug!(
            "{} samples exceeded their table range and were clamped",
            pixels.clamped
        );
    }
    Ok(pixels)
}
