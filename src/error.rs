//! Error kinds surfaced by the detection pipeline.
//!
//! A hand-rolled enum with `Display` rather than a derive-macro crate:
//! this core performs no I/O, so unlike a file-format library its error
//! surface is purely about invalid configuration and degenerate
//! calibration data (spec §7).

use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

/// All the ways the detection pipeline can fail to produce a result.
///
/// Every variant is fatal: stages are not retried, and the pipeline
/// releases whatever intermediate grids it had already allocated before
/// returning the error.
#[derive(Debug, Clone)]
pub enum Error {
    /// A configuration value is out of range for its meaning, or a
    /// connectivity was requested that does not exist for the grid's
    /// dimensionality. Fatal at pipeline start.
    ConfigInvalid(String),

    /// A collaborator (sky/std estimator, thresholder) returned data
    /// whose shape does not match the tile grid it was asked about.
    ShapeMismatch(String),

    /// Zero valid pseudo-detections were found over the sky region, so
    /// no S/N threshold could be derived. Comes with a diagnostic
    /// pointing at the parameters most likely to fix it.
    EmptyCalibrationSet(String),

    /// Every candidate pseudo-detection produced a non-finite S/N.
    /// Usually accompanies, or precedes, `EmptyCalibrationSet`.
    NumericDegenerate(String),
}

impl Error {
    pub fn config_invalid(message: impl Into<String>) -> Self {
        Error::ConfigInvalid(message.into())
    }

    pub fn shape_mismatch(message: impl Into<String>) -> Self {
        Error::ShapeMismatch(message.into())
    }

    pub fn empty_calibration_set(message: impl Into<String>) -> Self {
        Error::EmptyCalibrationSet(message.into())
    }

    pub fn numeric_degenerate(message: impl Into<String>) -> Self {
        Error::NumericDegenerate(message.into())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigInvalid(msg) => write!(f, "invalid configuration: {}", msg),
            Error::ShapeMismatch(msg) => write!(f, "shape mismatch: {}", msg),
            Error::EmptyCalibrationSet(msg) => write!(f, "empty calibration set: {}", msg),
            Error::NumericDegenerate(msg) => write!(f, "numeric degenerate: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
