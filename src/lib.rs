//! A self-calibrating detection core: turns a noisy 2-D/3-D float image
//! into a labeled mask of true detections, deriving its own thresholds
//! from the image's statistics rather than applying a global cut.
//!
//! See [`pipeline::run`] for the single entry point.

#![warn(
    rust_2018_idioms,
    future_incompatible,
    unused_extern_crates,
    unused,

    missing_debug_implementations,

    clippy::all,
)]

#![deny(
    unused_must_use,
    trivial_numeric_casts,
    redundant_semicolon
)]

#![forbid(unsafe_code)]

extern crate smallvec;

pub mod error;
pub mod math;
pub mod grid;
pub mod morph;
pub mod label;
pub mod tile;
pub mod threshold;
pub mod pseudo_sn;
pub mod reference;
pub mod config;
pub mod observer;
pub mod pipeline;

/// Re-exports of the types most callers need to build and run a
/// `DetectionPipeline`.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::grid::{Binary, Connectivity, Image, Labels, Shape, BLANK_I32, BLANK_U8, NO_ERODE};
    pub use crate::observer::{CheckImage, NullObserver, Observer, Snapshot};
    pub use crate::pipeline::{run, DetectionOutput};
    pub use crate::pseudo_sn::{PseudoSN, Role, SNTable};
    pub use crate::reference::{SigmaClippedSkyStdEstimator, SkyMap, SkyStdEstimator, StdMap};
    pub use crate::threshold::{PerTileQuantiles, QuantileThresholder, ReferenceThresholder};
    pub use crate::tile::{Tile, TileEngine, TileGrid};
}

