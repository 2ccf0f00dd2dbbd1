//! Two-point linear stretch derived from the 10th/90th percentile bins of a
//! reference and a match histogram. The resulting bounds are contrast limits for
//! the match raster, consumed by the 8-bit export (`to8bits`).
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::processing::histogram::{CumulativeHistogram, locate_percentile};
use crate::error::{Error, Result};
use crate::types::ColorBand;

pub const LOW_PERCENTILE: f64 = 0.10;
pub const HIGH_PERCENTILE: f64 = 0.90;

/// Contrast limits to apply to one band of the match raster
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StretchBounds {
    pub min: f64,
    pub max: f64,
}

/// Compute the stretch bounds for one band.
///
/// Reference percentiles are expressed as percentages of the histogram length while
/// the match percentiles stay raw bin indices; both enter the final formula as is.
pub fn two_point_stretch(
    band: ColorBand,
    reference: &CumulativeHistogram,
    matched: &CumulativeHistogram,
) -> Result<StretchBounds> {
    let (Some(ref_lo), Some(ref_hi)) = (
        locate_percentile(reference, LOW_PERCENTILE),
        locate_percentile(reference, HIGH_PERCENTILE),
    ) else {
        return Err(Error::EmptyHistogram { band });
    };
    let (Some(match_lo), Some(match_hi)) = (
        locate_percentile(matched, LOW_PERCENTILE),
        locate_percentile(matched, HIGH_PERCENTILE),
    ) else {
        return Err(Error::EmptyHistogram { band });
    };

    let ref_len = reference.len() as f64;
    let ref_start = ref_lo as f64 * 100.0 / ref_len;
    let ref_end = ref_hi as f64 * 100.0 / ref_len;
    let match_start = match_lo as f64;
    let match_end = match_hi as f64;

    let span = ref_end - ref_start;
    if span.abs() < f64::EPSILON {
        return Err(Error::DegenerateHistogram {
            band,
            reason: format!(
                "reference 10th and 90th percentiles share bin {}",
                ref_lo
            ),
        });
    }

    let ratio = (match_end - match_start) / span;
    let bounds = StretchBounds {
        min: match_start - ref_start * ratio,
        max: match_end + (100.0 - ref_end) * ratio,
    };
    debug!(
        "Stretch {}: ref {:.3}%..{:.3}%, match {}..{}, ratio {:.5} -> [{:.3}, {:.3}]",
        band, ref_start, ref_end, match_lo, match_hi, ratio, bounds.min, bounds.max
    );
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::processing::histogram::Histogram;

    fn cum(counts: &[u64]) -> CumulativeHistogram {
        Histogram::from_counts(counts.to_vec()).cumulative()
    }

    #[test]
    fn identical_histograms_keep_the_full_range() {
        let h = cum(&[0, 0, 5, 20, 50, 20, 5, 0, 0, 0]);
        let b = two_point_stretch(ColorBand::Red, &h, &h).unwrap();
        assert!(b.min.abs() < 1e-9, "min was {}", b.min);
        assert!((b.max - 10.0).abs() < 1e-9, "max was {}", b.max);
    }

    #[test]
    fn identical_byte_histograms_are_an_identity_stretch() {
        let counts: Vec<u64> = (0..256u64).map(|i| (i * 7 + 3) % 23).collect();
        let h = cum(&counts);
        let b = two_point_stretch(ColorBand::Green, &h, &h).unwrap();
        assert!(b.min.abs() < 1e-9);
        assert!((b.max - 256.0).abs() < 1e-9);
    }

    #[test]
    fn narrower_match_distribution_tightens_bounds() {
        let mut reference = vec![0u64; 256];
        for v in reference.iter_mut().take(200).skip(50) {
            *v = 10;
        }
        let mut matched = vec![0u64; 256];
        for v in matched.iter_mut().take(140).skip(100) {
            *v = 10;
        }
        let b = two_point_stretch(ColorBand::Blue, &cum(&reference), &cum(&matched)).unwrap();
        assert!(b.min > 0.0 && b.max < 256.0);
        assert!(b.min < 100.0 && b.max > 140.0);
    }

    #[test]
    fn reference_without_dynamic_range_is_rejected() {
        let reference = cum(&[0, 0, 0, 100, 0, 0]);
        let matched = cum(&[0, 10, 30, 30, 20, 10]);
        let err = two_point_stretch(ColorBand::Red, &reference, &matched).unwrap_err();
        assert!(matches!(err, Error::DegenerateHistogram { band: ColorBand::Red, .. }));
    }

    #[test]
    fn empty_histograms_are_rejected() {
        let empty = cum(&[0; 256]);
        let ok = cum(&[1; 256]);
        assert!(matches!(
            two_point_stretch(ColorBand::Green, &empty, &ok),
            Err(Error::EmptyHistogram { band: ColorBand::Green })
        ));
        assert!(matches!(
            two_point_stretch(ColorBand::Blue, &ok, &cum(&[])),
            Err(Error::EmptyHistogram { band: ColorBand::Blue })
        ));
    }
}
