#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! City bounds, borough identifiers, and unit constants.
//!
//! Every other package works in the same coordinate frame: WGS84 degrees
//! for positions and an equirectangular projection anchored at
//! [`REFERENCE_LATITUDE_DEG`] for distances and areas. Keeping the
//! conversion factors here guarantees the lattice cell area and the
//! intervention radius tests agree on what a kilometre is.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Kilometres per degree of latitude.
pub const KM_PER_DEGREE_LAT: f64 = 111.0;

/// Latitude used to scale longitude degrees into kilometres.
pub const REFERENCE_LATITUDE_DEG: f64 = 40.7;

/// Days per year used for annualizing daily totals.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Kilometres per degree of longitude at [`REFERENCE_LATITUDE_DEG`].
#[must_use]
pub fn km_per_degree_lon() -> f64 {
    KM_PER_DEGREE_LAT * REFERENCE_LATITUDE_DEG.to_radians().cos()
}

/// Axis-aligned geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Southern latitude boundary.
    pub south: f64,
    /// Northern latitude boundary.
    pub north: f64,
    /// Western longitude boundary.
    pub west: f64,
    /// Eastern longitude boundary.
    pub east: f64,
}

impl BoundingBox {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    /// Latitude extent in degrees.
    #[must_use]
    pub fn lat_span(&self) -> f64 {
        self.north - self.south
    }

    /// Longitude extent in degrees.
    #[must_use]
    pub fn lon_span(&self) -> f64 {
        self.east - self.west
    }

    /// Latitude extent in kilometres.
    #[must_use]
    pub fn height_km(&self) -> f64 {
        self.lat_span() * KM_PER_DEGREE_LAT
    }

    /// Longitude extent in kilometres at the reference latitude.
    #[must_use]
    pub fn width_km(&self) -> f64 {
        self.lon_span() * km_per_degree_lon()
    }

    /// Whether the point lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.south..=self.north).contains(&lat) && (self.west..=self.east).contains(&lon)
    }
}

/// Bounding box of New York City.
pub const NYC_BOUNDS: BoundingBox = BoundingBox::new(40.49, 40.92, -74.26, -73.70);

/// A WGS84 position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
}

impl GeoPoint {
    /// Creates a point from latitude and longitude.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Equirectangular distance in kilometres.
    ///
    /// Accurate to well under a percent across the city extent, and cheap
    /// enough to evaluate for every (cell, observation) pair.
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let dy = (self.lat - other.lat) * KM_PER_DEGREE_LAT;
        let dx = (self.lon - other.lon) * km_per_degree_lon();
        dx.hypot(dy)
    }

    /// Plain Euclidean distance in degrees.
    #[must_use]
    pub fn distance_deg(&self, other: &Self) -> f64 {
        (self.lat - other.lat).hypot(self.lon - other.lon)
    }
}

/// The five boroughs of New York City.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Borough {
    /// New York County.
    Manhattan,
    /// Kings County.
    Brooklyn,
    /// Queens County.
    Queens,
    /// Bronx County.
    #[strum(to_string = "Bronx", serialize = "The Bronx")]
    Bronx,
    /// Richmond County.
    #[serde(rename = "Staten Island")]
    #[strum(to_string = "Staten Island", serialize = "StatenIsland")]
    StatenIsland,
}

impl Borough {
    /// All boroughs in a stable order.
    pub const ALL: [Self; 5] = [
        Self::Manhattan,
        Self::Brooklyn,
        Self::Queens,
        Self::Bronx,
        Self::StatenIsland,
    ];

    /// Approximate activity centre of the borough.
    #[must_use]
    pub const fn center(self) -> GeoPoint {
        match self {
            Self::Manhattan => GeoPoint::new(40.7831, -73.9712),
            Self::Brooklyn => GeoPoint::new(40.6782, -73.9442),
            Self::Queens => GeoPoint::new(40.7282, -73.7949),
            Self::Bronx => GeoPoint::new(40.8448, -73.8648),
            Self::StatenIsland => GeoPoint::new(40.5795, -74.1502),
        }
    }
}
