//! Linear rescaling of a band to 8 bits between stretch bounds.
use ndarray::{Array2, Zip};

use crate::core::processing::stretch::StretchBounds;
use crate::io::gdal::RasterBlock;

/// Map `v` linearly from `[min, max]` onto `[0, 255]`, saturating outside.
#[inline]
pub fn scale_to_byte(v: f64, min: f64, max: f64) -> u8 {
    if max <= min {
        return if v >= min { 255 } else { 0 };
    }
    ((v - min) * 255.0 / (max - min)).round().clamp(0.0, 255.0) as u8
}

/// Scale the valid samples of a block; invalid samples are 0.
pub fn scale_block(block: &RasterBlock, bounds: StretchBounds) -> Array2<u8> {
    let mut out = Array2::<u8>::zeros(block.dim());
    Zip::from(&mut out)
        .and(&block.values)
        .and(&block.valid)
        .par_for_each(|o, &v, &ok| {
            if ok {
                *o = scale_to_byte(v, bounds.min, bounds.max);
            }
        });
    out
}

/// 255 where the block is valid
pub fn alpha_plane(valid: &Array2<bool>) -> Array2<u8> {
    valid.mapv(|ok| if ok { 255 } else { 0 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scales_between_bounds() {
        assert_eq!(scale_to_byte(10.0, 10.0, 20.0), 0);
        assert_eq!(scale_to_byte(20.0, 10.0, 20.0), 255);
        assert_eq!(scale_to_byte(15.0, 10.0, 20.0), 128);
        assert_eq!(scale_to_byte(-3.0, 10.0, 20.0), 0);
        assert_eq!(scale_to_byte(300.0, 10.0, 20.0), 255);
    }

    #[test]
    fn collapsed_bounds_threshold_at_min() {
        assert_eq!(scale_to_byte(4.0, 5.0, 5.0), 0);
        assert_eq!(scale_to_byte(5.0, 5.0, 5.0), 255);
        assert_eq!(scale_to_byte(9.0, 5.0, 1.0), 255);
    }

    #[test]
    fn invalid_samples_stay_transparent() {
        let block = RasterBlock {
            values: array![[0.0, 51.0], [102.0, 255.0]],
            valid: array![[true, false], [true, true]],
        };
        let bounds = StretchBounds { min: 0.0, max: 255.0 };
        assert_eq!(scale_block(&block, bounds), array![[0, 0], [102, 255]]);
        assert_eq!(alpha_plane(&block.valid), array![[255, 0], [255, 255]]);
    }
}
