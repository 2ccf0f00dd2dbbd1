pub mod grid;
pub mod histogram;
pub mod lut;
pub mod pipeline;
pub mod stretch;
pub mod tiles;
pub mod to8bits;
