#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Static region geometry and containment tests.
//!
//! Named regions (the five boroughs) are embedded at compile time as a
//! TOML table of `GeoJSON` polygons, indexed with an R-tree, and queried
//! with point-in-polygon tests. The union of the outlines doubles as the
//! city's land coverage: lattice points inside the bounding box but
//! outside every outline are water or neighbouring states. Intervention
//! and aggregation code only ever asks "is this lattice point inside
//! region X", so all geometry data stays behind this crate.

pub mod regions;

pub use regions::{Region, RegionSelector, RegionTable};

use thiserror::Error;

/// Errors that can occur while loading or querying region geometry.
#[derive(Debug, Error)]
pub enum GeographyError {
    /// An embedded region table could not be parsed.
    #[error("Region table '{name}' is invalid: {message}")]
    RegionTable {
        /// Table name.
        name: String,
        /// Description of what went wrong.
        message: String,
    },

    /// No region matches the requested name.
    #[error("Unknown region '{name}'")]
    UnknownRegion {
        /// The name that failed to resolve.
        name: String,
    },
}
