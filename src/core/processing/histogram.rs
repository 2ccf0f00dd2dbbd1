use ndarray::{ArrayView2, Zip};
use tracing::debug;

use crate::error::{Error, Result};
use crate::io::gdal::RasterSource;

/// Bin count used when the caller asks for automatic binning
pub const AUTO_BINS: usize = 256;

/// Rows read per strip while scanning a band
const STRIP_ROWS: usize = 256;

#[inline]
fn bin_for(value: f64, bins: usize) -> usize {
    let idx = (value * bins as f64 / 256.0).floor();
    if idx <= 0.0 {
        0
    } else {
        (idx as usize).min(bins - 1)
    }
}

/// Per-bin pixel counts of one band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Histogram {
    counts: Vec<u64>,
}

impl Histogram {
    pub fn new(bins: usize) -> Self {
        let bins = if bins == 0 { AUTO_BINS } else { bins };
        Self {
            counts: vec![0; bins],
        }
    }

    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self { counts }
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Bin for an 8-bit domain sample. Values outside the domain land in the edge bins.
    #[inline]
    pub fn bin_index(&self, value: f64) -> usize {
        bin_for(value, self.counts.len())
    }

    /// Count every valid sample of a block.
    pub fn accumulate(&mut self, values: ArrayView2<f64>, valid: ArrayView2<bool>) {
        if self.counts.is_empty() {
            return;
        }
        let bins = self.counts.len();
        let counts = &mut self.counts;
        Zip::from(values).and(valid).for_each(|&v, &ok| {
            if ok && !v.is_nan() {
                counts[bin_for(v, bins)] += 1;
            }
        });
    }

    pub fn cumulative(&self) -> CumulativeHistogram {
        let mut running = 0u64;
        let cum = self
            .counts
            .iter()
            .map(|&c| {
                running += c;
                running
            })
            .collect();
        CumulativeHistogram { cum }
    }
}

/// Running sum of a `Histogram`; non-decreasing, last entry is the sample total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CumulativeHistogram {
    cum: Vec<u64>,
}

impl CumulativeHistogram {
    pub fn values(&self) -> &[u64] {
        &self.cum
    }

    pub fn len(&self) -> usize {
        self.cum.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cum.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.cum.last().copied().unwrap_or(0)
    }

    /// Fraction of the total mass at or below `idx`.
    #[inline]
    pub fn fraction(&self, idx: usize) -> f64 {
        self.cum[idx] as f64 / self.total() as f64
    }

    /// A histogram with no bins or no samples cannot drive a stretch.
    pub fn is_usable(&self) -> bool {
        !self.cum.is_empty() && self.total() > 0
    }
}

/// First bin whose cumulative count reaches `fraction` of the total.
///
/// Returns `None` when the histogram is empty or holds no samples.
pub fn locate_percentile(cum: &CumulativeHistogram, fraction: f64) -> Option<usize> {
    if !cum.is_usable() {
        return None;
    }
    let threshold = fraction.clamp(0.0, 1.0) * cum.total() as f64;
    cum.values()
        .iter()
        .position(|&c| c as f64 >= threshold)
        .or(Some(cum.len() - 1))
}

/// Build the histogram of one band of `source`, skipping nodata and alpha-masked samples.
/// `bins == 0` selects `AUTO_BINS`.
pub fn accumulate_band(source: &RasterSource, band: usize, bins: usize) -> Result<Histogram> {
    let meta = &source.metadata;
    if band == 0 || band > meta.bands {
        return Err(Error::invalid("band", band));
    }
    let mut hist = Histogram::new(bins);
    let mut row = 0;
    while row < meta.size_y {
        let rows = STRIP_ROWS.min(meta.size_y - row);
        let strip = source.read_rows(band, row, rows)?;
        hist.accumulate(strip.values.view(), strip.valid.view());
        row += rows;
    }
    debug!(
        "Histogram band {}: {} bins, {} samples",
        band,
        hist.len(),
        hist.total()
    );
    Ok(hist)
}
