#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Baseline emission grid synthesis and statistics.
//!
//! The baseline is built in four passes over a fixed lattice:
//!
//! 1. evaluate a deterministic [`SpatialModel`] at every lattice point,
//! 2. blend in nearby sensor observations with inverse-distance weights,
//! 3. rescale so the annual total matches the calibration constant,
//! 4. clip anything negative to zero.
//!
//! [`stats::aggregate`] is shared by the baseline and intervention paths
//! so both report totals with the same bookkeeping.

pub mod blend;
pub mod cache;
pub mod calibrate;
pub mod config;
pub mod stats;
pub mod synthesizer;
pub mod synthetic;

pub use cache::{BaselineCache, CachedBaseline};
pub use config::EngineConfig;
pub use synthesizer::{Baseline, GridSynthesizer};
pub use synthetic::{NycEmissionModel, SpatialModel};

use co2_map_grid_models::GridShapeError;
use thiserror::Error;

/// Errors that can occur while building or summarizing a grid.
#[derive(Debug, Error)]
pub enum GridError {
    /// Lattice or grid construction failed.
    #[error("Grid shape error: {0}")]
    Shape(#[from] GridShapeError),

    /// A numeric step could not produce a finite result.
    #[error("Computation error: {message}")]
    Computation {
        /// Description of what went wrong.
        message: String,
    },

    /// A configuration value is missing or malformed.
    #[error("Invalid configuration for {key}: {message}")]
    Config {
        /// Environment variable or setting name.
        key: String,
        /// Description of what went wrong.
        message: String,
    },
}
