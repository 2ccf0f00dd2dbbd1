use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{OverviewResampling, VrtResolution};

/// Naming and size of the output tiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileLayout {
    /// Cell edge in map units
    pub cell_size: f64,
    pub prefix: String,
    pub suffix: String,
}

impl Default for TileLayout {
    fn default() -> Self {
        Self {
            cell_size: 5000.0,
            prefix: "PSUD_SAT50".to_string(),
            suffix: "2019_5KM".to_string(),
        }
    }
}

impl TileLayout {
    /// `<prefix>_<xmin>_<ymin>_<suffix>.tif` with integer grid coordinates
    pub fn file_name(&self, xmin: f64, ymin: f64) -> String {
        format!(
            "{}_{}_{}_{}.tif",
            self.prefix, xmin as i64, ymin as i64, self.suffix
        )
    }
}

/// Histogram matching parameters suitable for config files and presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchParams {
    /// Share of the reference domain compressed at the top, in percent (1..=100)
    pub desaturation: u8,
    /// Share of the match pixel mass clipped at the high end, in percent
    pub saturation: f64,
    pub tile: TileLayout,
    /// Pixel size of the rasterized cutout mask, in map units
    pub mask_pixel_size: f64,
    pub vrt_resolution: VrtResolution,
    pub overview_levels: Vec<i32>,
    pub overview_resampling: OverviewResampling,
}

impl Default for MatchParams {
    fn default() -> Self {
        Self {
            desaturation: 1,
            saturation: 0.0,
            tile: TileLayout::default(),
            mask_pixel_size: 0.5,
            vrt_resolution: VrtResolution::Highest,
            overview_levels: vec![2, 4, 8, 16, 32, 64, 128],
            overview_resampling: OverviewResampling::Average,
        }
    }
}

impl MatchParams {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let params: MatchParams = serde_json::from_str(&text)?;
        Ok(params)
    }

    pub fn validate(&self) -> Result<()> {
        if self.desaturation == 0 || self.desaturation > 100 {
            return Err(Error::invalid("desaturation", self.desaturation));
        }
        if !self.saturation.is_finite() || !(0.0..=100.0).contains(&self.saturation) {
            return Err(Error::invalid("saturation", self.saturation));
        }
        if !(self.tile.cell_size.is_finite() && self.tile.cell_size > 0.0) {
            return Err(Error::invalid("cell_size", self.tile.cell_size));
        }
        if !(self.mask_pixel_size.is_finite() && self.mask_pixel_size > 0.0) {
            return Err(Error::invalid("mask_pixel_size", self.mask_pixel_size));
        }
        if let Some(level) = self.overview_levels.iter().find(|&&l| l < 2) {
            return Err(Error::invalid("overview_levels", level));
        }
        Ok(())
    }
}
