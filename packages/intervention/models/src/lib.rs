#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Intervention directive and result types.
//!
//! A [`Directive`] is the fixed-shape form of a parsed intervention
//! request: one geographic target, one magnitude, one direction. Loosely
//! typed input is normalized into these types before any grid work
//! happens, so the engine never sees ad hoc keys.

use co2_map_grid_models::Statistics;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Upper bound for a percentage increase.
pub const MAX_INCREASE_PERCENT: f64 = 1000.0;

/// Upper bound for an absolute adjustment in tonnes CO₂/km²/day.
pub const MAX_ABSOLUTE_CHANGE: f64 = 1_000_000.0;

/// Whether emissions go up or down.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Direction {
    /// Raise emissions.
    Increase,
    /// Lower emissions.
    Decrease,
}

/// How a radius target's effect decays from its centre.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Falloff {
    /// Full effect everywhere inside the radius.
    #[default]
    Uniform,
    /// Effect scaled by `exp(-d² / (2·(r/2)²))`.
    Gaussian,
}

/// The set of cells a directive applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeoTarget {
    /// A named region from the static region table (a borough, or a
    /// citywide alias).
    Region {
        /// Region name or alias.
        name: String,
    },
    /// Every cell within `radius_km` of a centre point.
    Radius {
        /// Centre latitude.
        lat: f64,
        /// Centre longitude.
        lon: f64,
        /// Radius in km.
        #[serde(rename = "radiusKm")]
        radius_km: f64,
        /// Decay of the effect inside the radius.
        #[serde(default)]
        falloff: Falloff,
    },
    /// Every cell inside a polygon ring of `[lon, lat]` vertices.
    Polygon {
        /// Exterior ring, `GeoJSON` axis order.
        coordinates: Vec<[f64; 2]>,
    },
}

impl GeoTarget {
    /// Short human-readable label for logs.
    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Region { name } => name.clone(),
            Self::Radius {
                lat, lon, radius_km, ..
            } => format!("{radius_km} km around ({lat:.4}, {lon:.4})"),
            Self::Polygon { coordinates } => format!("polygon ({} vertices)", coordinates.len()),
        }
    }
}

/// Size of the change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Magnitude {
    /// Relative change in percent (always non-negative; the sign lives in
    /// [`Direction`]).
    Percent(f64),
    /// Absolute change in tonnes CO₂/km²/day.
    Absolute(f64),
}

impl Magnitude {
    /// Whether the magnitude is zero.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Percent(v) | Self::Absolute(v) => *v == 0.0,
        }
    }
}

/// A normalized intervention request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Directive {
    /// Where the change applies.
    pub target: GeoTarget,
    /// How large the change is.
    pub magnitude: Magnitude,
    /// Which way the change goes.
    pub direction: Direction,
}

impl Directive {
    /// The requested change as a signed percentage, positive for a
    /// decrease. `None` for absolute magnitudes.
    #[must_use]
    pub fn nominal_percent(&self) -> Option<f64> {
        match self.magnitude {
            Magnitude::Percent(pct) => Some(match self.direction {
                Direction::Decrease => pct,
                Direction::Increase => -pct,
            }),
            Magnitude::Absolute(_) => None,
        }
    }
}

/// An ordered list of directives applied in sequence to one grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionPlan {
    /// Directives in application order.
    pub directives: Vec<Directive>,
    /// Set when the request had nothing to do with emissions. Always paired
    /// with an empty directive list.
    #[serde(default)]
    pub unrelated: bool,
}

impl InterventionPlan {
    /// A plan of one directive.
    #[must_use]
    pub fn single(directive: Directive) -> Self {
        Self {
            directives: vec![directive],
            unrelated: false,
        }
    }

    /// The empty plan produced for an unrelated request.
    #[must_use]
    pub const fn unrelated() -> Self {
        Self {
            directives: Vec::new(),
            unrelated: true,
        }
    }
}

/// Before/after comparison for an applied plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterventionStatistics {
    /// Statistics of the input grid.
    pub baseline: Statistics,
    /// Statistics of the modified grid.
    pub modified: Statistics,
    /// Baseline annual total in tonnes.
    pub baseline_tons_co2: f64,
    /// Modified annual total in tonnes.
    pub reduced_tons_co2: f64,
    /// `baseline_tons_co2 - reduced_tons_co2` (negative for increases).
    pub annual_savings_tons_co2: f64,
    /// Realized change from totals, positive for a reduction.
    pub percentage_reduction: f64,
    /// Requested change for a single percentage directive, positive for a
    /// decrease. `None` for absolute or multi-directive plans.
    pub nominal_percent: Option<f64>,
    /// Net direction of the realized change.
    pub direction: Direction,
    /// Whether the total went up.
    pub is_increase: bool,
    /// Cells whose value changed.
    pub cells_affected: usize,
    /// Whether the plan was an unrelated no-op.
    pub is_unrelated: bool,
}
