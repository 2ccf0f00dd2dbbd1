#![doc = r#"
SATMATCH: colorimetric normalization of satellite orthoimagery.

This crate matches the colors of a source RGB raster onto a reference raster and
rewrites the result as 8-bit RGBA GeoTIFF tiles on a fixed 5 km grid, assembled into
a VRT mosaic with overviews. It also computes two-point stretch bounds ("styles") and
exports rasters to 8 bits between those bounds. It powers the SATMATCH CLI and can be
embedded in your own Rust applications.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Histogram matching to tiles and a mosaic
----------------------------------------
```rust,no_run
use std::path::Path;
use satmatch::{histogram_match, MatchParams, RunStatus};

fn main() -> satmatch::Result<()> {
    let params = MatchParams {
        desaturation: 2,
        saturation: 0.1,
        ..MatchParams::default()
    };
    let status = histogram_match(
        Path::new("/data/ortho_2019.tif"),
        Path::new("/data/reference.tif"),
        Path::new("/data/work_area.gpkg"),
        Some(Path::new("/data/cutout.gpkg")),
        Path::new("/out/ortho_2019.vrt"),
        &params,
    )?;
    if let RunStatus::Completed(report) = status {
        println!("{} tiles, {} clamped samples", report.tiles.len(), report.clamped);
    }
    Ok(())
}
```

Equalize, then export to 8 bits
-------------------------------
```rust,no_run
use std::path::Path;
use satmatch::{equalize, to8bits};

fn main() -> satmatch::Result<()> {
    equalize(
        Path::new("/data/ortho.tif"),
        Path::new("/data/reference.tif"),
        Path::new("/data/work_area.gpkg"),
        None, // writes /data/ortho.style.json
    )?;
    to8bits(Path::new("/data/ortho.tif"), None, None, Path::new("/out/ortho_8bits.tif"))?;
    Ok(())
}
```

Progress and cancellation
-------------------------
Every run takes a [`Feedback`]; [`LogFeedback`] logs through `tracing` and can share a
[`CancelFlag`] with another thread. A cancelled run returns `RunStatus::Cancelled`.

```rust,no_run
use satmatch::{api, CancelFlag, LogFeedback, Operation};

fn run_cancellable(op: &Operation) -> satmatch::Result<()> {
    let flag = CancelFlag::new();
    let feedback = LogFeedback::with_cancel_flag(flag.clone());
    // hand `flag` to whoever may stop the run, then:
    let status = api::run(op, &feedback)?;
    println!("completed: {}", status.is_completed());
    Ok(())
}
```

Pure building blocks
--------------------
```rust
use satmatch::core::processing::histogram::{Histogram, locate_percentile};
use satmatch::core::processing::stretch::two_point_stretch;
use satmatch::types::ColorBand;

let cum = Histogram::from_counts(vec![0, 0, 5, 20, 50, 20, 5, 0, 0, 0]).cumulative();
assert_eq!(locate_percentile(&cum, 0.5), Some(4));
let bounds = two_point_stretch(ColorBand::Red, &cum, &cum).unwrap();
assert!((bounds.min - 0.0).abs() < 1e-9 && (bounds.max - 10.0).abs() < 1e-9);
```

Error handling
--------------
All public functions return `satmatch::Result<T>`; match on `satmatch::Error` to handle
specific cases, e.g. empty histograms or GDAL errors.

Useful modules
--------------
- [`api`]: high-level entry points and the `Operation` enum.
- [`core`]: histograms, stretch and lookup tables, tile grid, pipelines.
- [`io`]: GDAL readers, vector masks, clip/rasterize services and writers.
- [`types`]: shared enums and the map `Extent`.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use crate::core::feedback::{CancelFlag, Feedback, LogFeedback};
pub use crate::core::params::{MatchParams, TileLayout};
pub use error::{Error, Result};
pub use types::{ColorBand, Extent, OverviewResampling, RunStatus, VrtResolution};

// Readers
pub use io::gdal::{GdalError, RasterMetadata, RasterSource};
pub use io::vector::VectorMask;

// Selected writer helpers
pub use io::writers::style::StretchStyle;

// High-level API re-exports
pub use api::{
    BatchReport, Operation, OperationReport, equalize, histogram_match, load_operations, run,
    run_all, to8bits,
};
pub use crate::core::processing::pipeline::{
    EqualizeInputs, EqualizeReport, MatchInputs, TileReport, To8BitsInputs, To8BitsReport,
};
