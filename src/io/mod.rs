//! I/O layer: GDAL raster access, OGR polygon masks, the clip/rasterize
//! services the pipelines delegate to, and the output `writers`.
pub mod gdal;
pub use self::gdal::{GdalError, RasterBlock, RasterMetadata, RasterSource};

pub mod services;
pub mod vector;
pub use vector::VectorMask;

pub mod writers;
