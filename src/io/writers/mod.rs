//! Output writers: compressed byte GeoTIFFs, tile provenance metadata,
//! the VRT mosaic with its overviews, and the JSON stretch style sidecar.
pub mod metadata;
pub mod mosaic;
pub mod style;
pub mod tiff;

pub use metadata::TileProvenance;
pub use mosaic::{build_overviews, build_vrt};
pub use style::StretchStyle;
pub use tiff::{create_byte_geotiff, write_rgba_tile};
