//! Core building blocks: histograms and percentiles, the stretch and lookup-table
//! builders, the tile grid, per-tile mapping, and the pipelines that chain them.
//! These are internal primitives consumed by the high-level `api` module.
pub mod feedback;
pub mod params;
pub mod processing;
