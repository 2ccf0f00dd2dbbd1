//! Shared types and enums used across SATMATCH.
//! Includes `ColorBand`, the map-space `Extent`, mosaic options (`VrtResolution`,
//! `OverviewResampling`) and the `RunStatus` returned by every pipeline.
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One of the three visible bands processed by the pipelines.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
pub enum ColorBand {
    Red,
    Green,
    Blue,
}

impl ColorBand {
    pub const ALL: [ColorBand; 3] = [ColorBand::Red, ColorBand::Green, ColorBand::Blue];

    /// 1-based GDAL band index
    pub fn index(self) -> usize {
        match self {
            ColorBand::Red => 1,
            ColorBand::Green => 2,
            ColorBand::Blue => 3,
        }
    }
}

impl std::fmt::Display for ColorBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorBand::Red => write!(f, "red"),
            ColorBand::Green => write!(f, "green"),
            ColorBand::Blue => write!(f, "blue"),
        }
    }
}

/// Axis-aligned rectangle in map units
#[derive(Copy, Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct Extent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Extent {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    pub fn intersection(&self, other: &Extent) -> Option<Extent> {
        let ext = Extent::new(
            self.xmin.max(other.xmin),
            self.ymin.max(other.ymin),
            self.xmax.min(other.xmax),
            self.ymax.min(other.ymax),
        );
        if ext.is_empty() { None } else { Some(ext) }
    }
}

impl std::fmt::Display for Extent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({},{},{},{})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

/// Resolution rule used when assembling tiles into a VRT
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum VrtResolution {
    Average,
    Highest,
    Lowest,
}

impl VrtResolution {
    pub fn as_gdal_arg(self) -> &'static str {
        match self {
            VrtResolution::Average => "average",
            VrtResolution::Highest => "highest",
            VrtResolution::Lowest => "lowest",
        }
    }
}

/// Resampling used to build mosaic overviews
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize)]
pub enum OverviewResampling {
    Nearest,
    Average,
    Gauss,
    Cubic,
    Mode,
}

impl OverviewResampling {
    pub fn as_gdal_arg(self) -> &'static str {
        match self {
            OverviewResampling::Nearest => "NEAREST",
            OverviewResampling::Average => "AVERAGE",
            OverviewResampling::Gauss => "GAUSS",
            OverviewResampling::Cubic => "CUBIC",
            OverviewResampling::Mode => "MODE",
        }
    }
}

/// Outcome of a pipeline that supports cooperative cancellation
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus<T> {
    Completed(T),
    Cancelled,
}

impl<T> RunStatus<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunStatus::Completed(_))
    }

    pub fn completed(self) -> Option<T> {
        match self {
            RunStatus::Completed(v) => Some(v),
            RunStatus::Cancelled => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> RunStatus<U> {
        match self {
            RunStatus::Completed(v) => RunStatus::Completed(f(v)),
            RunStatus::Cancelled => RunStatus::Cancelled,
        }
    }
}
