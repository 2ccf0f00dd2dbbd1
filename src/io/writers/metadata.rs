use gdal::Dataset;
use gdal::Metadata;
use std::collections::HashMap;

use crate::core::params::MatchParams;
use crate::error::Result;

/// Provenance recorded in every tile the histogram-match run writes
#[derive(Debug, Clone)]
pub struct TileProvenance {
    pub source: String,
    pub reference: String,
    pub desaturation: u8,
    pub saturation: f64,
    /// `EPSG:XXXX` label of the source, when known
    pub crs: Option<String>,
    pub processed_at: String,
}

impl TileProvenance {
    pub fn new(source: &str, reference: &str, params: &MatchParams) -> Self {
        Self {
            source: source.to_string(),
            reference: reference.to_string(),
            desaturation: params.desaturation,
            saturation: params.saturation,
            crs: None,
            processed_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn with_crs(mut self, crs: Option<String>) -> Self {
        self.crs = crs;
        self
    }
}

/// Flatten provenance into GDAL metadata items
pub fn provenance_fields(prov: &TileProvenance) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    metadata.insert(
        "SOFTWARE".to_string(),
        format!("satmatch {}", env!("CARGO_PKG_VERSION")),
    );
    metadata.insert("SOURCE".to_string(), prov.source.clone());
    metadata.insert("REFERENCE".to_string(), prov.reference.clone());
    metadata.insert("DESATURATION".to_string(), prov.desaturation.to_string());
    metadata.insert("SATURATION".to_string(), prov.saturation.to_string());
    if let Some(crs) = &prov.crs {
        metadata.insert("CRS".to_string(), crs.clone());
    }
    metadata.insert("PROCESSED_AT".to_string(), prov.processed_at.clone());
    metadata
}

/// Embed provenance metadata into a GeoTIFF dataset
pub fn embed_provenance(ds: &mut Dataset, prov: &TileProvenance) -> Result<()> {
    for (key, value) in provenance_fields(prov) {
        ds.set_metadata_item(&key, &value, "")?;
    }
    Ok(())
}
