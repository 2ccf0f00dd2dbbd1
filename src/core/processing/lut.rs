//! Desaturation/saturation histogram matching: one lookup table per band mapping
//! source intensities onto the reference distribution, with linear extrapolation
//! past the matched core of the histogram.
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::processing::histogram::CumulativeHistogram;
use crate::error::{Error, Result};
use crate::types::ColorBand;

/// Where the matched core of each histogram ends and how fast to extrapolate past it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DesaturationParams {
    /// Reference bin where desaturation starts
    pub min_ref: usize,
    /// First match bin whose mass reaches the reference mass at `min_ref`
    pub min_match: usize,
    /// Match bins per desaturation percent
    pub step_match: f64,
    /// Reference bins per desaturation percent
    pub step_ref: f64,
    /// Reference histogram length (table domain)
    pub max_ref: usize,
    /// Saturation clip point in the match histogram
    pub max_match: usize,
}

pub fn desaturation_params(
    band: ColorBand,
    reference: &CumulativeHistogram,
    matched: &CumulativeHistogram,
    desaturation: u8,
    saturation: f64,
) -> Result<DesaturationParams> {
    if desaturation == 0 || desaturation > 100 {
        return Err(Error::invalid("desaturation", desaturation));
    }
    if !saturation.is_finite() || !(0.0..=100.0).contains(&saturation) {
        return Err(Error::invalid("saturation", saturation));
    }
    if !reference.is_usable() || !matched.is_usable() {
        return Err(Error::EmptyHistogram { band });
    }

    let d = desaturation as f64;
    let max_ref = reference.len();

    let match_total = matched.total() as f64;
    let clip = match_total - match_total * saturation / 100.0;
    let max_match = matched
        .values()
        .iter()
        .take_while(|&&c| (c as f64) < clip)
        .count();

    let min_ref = (max_ref as f64 - max_ref as f64 * d / 100.0) as usize;
    let ref_mass = reference.fraction(min_ref);
    let min_match = (0..matched.len())
        .take_while(|&i| matched.fraction(i) < ref_mass)
        .count();

    let params = DesaturationParams {
        min_ref,
        min_match,
        step_match: (max_match as f64 - min_match as f64) / d,
        step_ref: (max_ref as f64 - min_ref as f64) / d,
        max_ref,
        max_match,
    };
    debug!("Desaturation {}: {:?}", band, params);
    Ok(params)
}

/// Source intensity -> reference-aligned intensity for one band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformTable {
    entries: Vec<u8>,
}

impl TransformTable {
    pub fn from_entries(entries: Vec<u8>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[u8] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Map a raw sample; values past the table end saturate to the last entry.
    /// The flag reports whether saturation happened.
    #[inline]
    pub fn lookup(&self, raw: f64) -> (u8, bool) {
        let idx = raw as usize;
        match self.entries.get(idx) {
            Some(&v) => (v, false),
            None => (self.entries.last().copied().unwrap_or(0), true),
        }
    }
}

/// The three band tables of a run; built once, then shared read-only by every tile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformTables {
    pub red: TransformTable,
    pub green: TransformTable,
    pub blue: TransformTable,
}

impl TransformTables {
    pub fn get(&self, band: ColorBand) -> &TransformTable {
        match band {
            ColorBand::Red => &self.red,
            ColorBand::Green => &self.green,
            ColorBand::Blue => &self.blue,
        }
    }
}

/// Build the table for one band from its reference and match cumulative histograms.
pub fn build_transform_table(
    reference: &CumulativeHistogram,
    matched: &CumulativeHistogram,
    params: &DesaturationParams,
) -> TransformTable {
    let top = params.max_ref.saturating_sub(1).min(u8::MAX as usize) as i64;
    let entries = (0..matched.len())
        .map(|idx| reference_value(idx, reference, matched, params, top) as u8)
        .collect();
    TransformTable { entries }
}

fn reference_value(
    idx: usize,
    reference: &CumulativeHistogram,
    matched: &CumulativeHistogram,
    params: &DesaturationParams,
    top: i64,
) -> i64 {
    let target = matched.fraction(idx);
    let walked = (0..reference.len())
        .take_while(|&i| i < params.min_ref && reference.fraction(i) < target)
        .count();

    let value = if walked == params.min_ref {
        if params.step_match == 0.0 {
            top
        } else {
            let steps = (idx as f64 - params.min_match as f64) / params.step_match;
            (params.min_ref as f64 + steps * params.step_ref) as i64
        }
    } else {
        walked as i64
    };
    value.clamp(0, top)
}

/// Convenience: derive parameters and table for one band in one call.
pub fn match_band(
    band: ColorBand,
    reference: &CumulativeHistogram,
    matched: &CumulativeHistogram,
    desaturation: u8,
    saturation: f64,
) -> Result<TransformTable> {
    let params = desaturation_params(band, reference, matched, desaturation, saturation)?;
    Ok(build_transform_table(reference, matched, &params))
}
