//! JSON style sidecar carrying per-band stretch bounds from `equalize` to `to8bits`.
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::processing::stretch::StretchBounds;
use crate::error::Result;
use crate::types::ColorBand;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StretchStyle {
    pub red: StretchBounds,
    pub green: StretchBounds,
    pub blue: StretchBounds,
    /// Raster the bounds apply to
    #[serde(default)]
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub reference: Option<PathBuf>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl StretchStyle {
    pub fn new(red: StretchBounds, green: StretchBounds, blue: StretchBounds) -> Self {
        Self {
            red,
            green,
            blue,
            source: None,
            reference: None,
            created_at: Some(Utc::now()),
        }
    }

    pub fn bounds(&self, band: ColorBand) -> StretchBounds {
        match band {
            ColorBand::Red => self.red,
            ColorBand::Green => self.green,
            ColorBand::Blue => self.blue,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!("Stretch style written to {:?}", path);
        Ok(())
    }
}

/// Default sidecar location next to a raster: `<raster>.style.json`
pub fn sidecar_path(raster: &Path) -> PathBuf {
    raster.with_extension("style.json")
}
