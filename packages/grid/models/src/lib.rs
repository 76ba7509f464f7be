#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Emission grid, lattice, sensor observation, and statistics types.
//!
//! A [`Grid`] is an ordered sequence of [`GeoCell`]s laid out on a
//! [`LatticeSpec`]. Every grid built from the same spec has identical
//! geometry (same cell count, same positions, same order), which is what
//! makes cell-wise comparison between a baseline and an intervention
//! result well defined.
//!
//! Units are fixed: cell values are tonnes CO₂ per km² per day, areas are
//! km², annual totals are tonnes per year.

use chrono::{DateTime, Utc};
use co2_map_geography_models::{BoundingBox, DAYS_PER_YEAR, KM_PER_DEGREE_LAT, km_per_degree_lon};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Smallest usable lattice resolution (points per dimension).
pub const MIN_RESOLUTION: usize = 2;

/// Fixed-resolution lattice over a bounding box.
///
/// Points are evenly spaced with both edges included (`resolution` samples
/// per dimension). Each point stands for a cell of
/// `(lat_span / resolution) × (lon_span / resolution)` degrees, so the
/// total coverage equals the area of the bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatticeSpec {
    /// Extent covered by the lattice.
    pub bounds: BoundingBox,
    /// Points per dimension.
    pub resolution: usize,
}

impl LatticeSpec {
    /// Creates a lattice spec.
    ///
    /// # Errors
    ///
    /// Returns [`GridShapeError::Resolution`] if `resolution` is below
    /// [`MIN_RESOLUTION`], or [`GridShapeError::Bounds`] if the bounds are
    /// empty or inverted.
    pub fn new(bounds: BoundingBox, resolution: usize) -> Result<Self, GridShapeError> {
        if resolution < MIN_RESOLUTION {
            return Err(GridShapeError::Resolution { resolution });
        }
        if !(bounds.lat_span() > 0.0 && bounds.lon_span() > 0.0) {
            return Err(GridShapeError::Bounds);
        }
        Ok(Self { bounds, resolution })
    }

    /// Resolution that yields roughly 1 km² cells:
    /// `floor(max(height_km, width_km)) + 1`.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn auto_resolution(bounds: &BoundingBox) -> usize {
        let extent_km = bounds.height_km().max(bounds.width_km()).max(0.0);
        (extent_km.floor() as usize + 1).max(MIN_RESOLUTION)
    }

    /// Number of lattice points.
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.resolution * self.resolution
    }

    /// Latitude step per cell in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lat_step(&self) -> f64 {
        self.bounds.lat_span() / self.resolution as f64
    }

    /// Longitude step per cell in degrees.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn lon_step(&self) -> f64 {
        self.bounds.lon_span() / self.resolution as f64
    }

    /// Area represented by a single cell in km².
    #[must_use]
    pub fn cell_area_km2(&self) -> f64 {
        (self.lat_step() * KM_PER_DEGREE_LAT) * (self.lon_step() * km_per_degree_lon())
    }

    /// Position of the point at row `i` (latitude index) and column `j`
    /// (longitude index).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn point(&self, i: usize, j: usize) -> (f64, f64) {
        let denom = (self.resolution - 1) as f64;
        let lat = self.bounds.south + self.bounds.lat_span() * (i as f64) / denom;
        let lon = self.bounds.west + self.bounds.lon_span() * (j as f64) / denom;
        // Rounding on the far edge must not step outside the bounds.
        (lat.min(self.bounds.north), lon.min(self.bounds.east))
    }

    /// All lattice points in row-major order (south to north, then west to
    /// east within a row).
    pub fn points(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        (0..self.resolution)
            .flat_map(move |i| (0..self.resolution).map(move |j| self.point(i, j)))
    }
}

/// One lattice point with its emission intensity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoCell {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Emission intensity in tonnes CO₂/km²/day. Never negative.
    pub value: f64,
}

/// An emission field over a lattice.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Grid {
    spec: LatticeSpec,
    cells: Vec<GeoCell>,
}

impl Grid {
    /// Builds a grid from per-point values in lattice order.
    ///
    /// # Errors
    ///
    /// Returns [`GridShapeError::CellCount`] if `values` does not have one
    /// entry per lattice point.
    pub fn from_values(spec: LatticeSpec, values: Vec<f64>) -> Result<Self, GridShapeError> {
        if values.len() != spec.cell_count() {
            return Err(GridShapeError::CellCount {
                expected: spec.cell_count(),
                actual: values.len(),
            });
        }
        let cells = spec
            .points()
            .zip(values)
            .map(|((lat, lon), value)| GeoCell { lat, lon, value })
            .collect();
        Ok(Self { spec, cells })
    }

    /// The lattice this grid lives on.
    #[must_use]
    pub const fn spec(&self) -> &LatticeSpec {
        &self.spec
    }

    /// Cells in lattice order.
    #[must_use]
    pub fn cells(&self) -> &[GeoCell] {
        &self.cells
    }

    /// Area represented by each cell in km².
    #[must_use]
    pub fn cell_area_km2(&self) -> f64 {
        self.spec.cell_area_km2()
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the grid has no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell values in lattice order.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.cells.iter().map(|c| c.value)
    }

    /// Returns a new grid with the same geometry and each value replaced
    /// by `f(cell)`.
    #[must_use]
    pub fn map_values<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&GeoCell) -> f64,
    {
        Self {
            spec: self.spec,
            cells: self
                .cells
                .iter()
                .map(|cell| GeoCell {
                    lat: cell.lat,
                    lon: cell.lon,
                    value: f(cell),
                })
                .collect(),
        }
    }

    /// Whether both grids share the same lattice geometry.
    #[must_use]
    pub fn same_geometry(&self, other: &Self) -> bool {
        self.spec == other.spec
            && self.cells.len() == other.cells.len()
            && self
                .cells
                .iter()
                .zip(&other.cells)
                .all(|(a, b)| {
                    a.lat.to_bits() == b.lat.to_bits() && a.lon.to_bits() == b.lon.to_bits()
                })
    }
}

/// Error returned when a grid or lattice cannot be constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridShapeError {
    /// Resolution below [`MIN_RESOLUTION`].
    Resolution {
        /// The rejected resolution.
        resolution: usize,
    },
    /// Bounds with zero or negative extent.
    Bounds,
    /// Value count does not match the lattice.
    CellCount {
        /// Number of lattice points.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },
}

impl std::fmt::Display for GridShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Resolution { resolution } => write!(
                f,
                "invalid lattice resolution {resolution}: expected at least {MIN_RESOLUTION}"
            ),
            Self::Bounds => write!(f, "lattice bounds have no extent"),
            Self::CellCount { expected, actual } => {
                write!(f, "expected {expected} cell values, got {actual}")
            }
        }
    }
}

impl std::error::Error for GridShapeError {}

/// A point sample from an air quality station.
///
/// Sparse and irregular; never assumed to coincide with lattice points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorObservation {
    /// Station or sensor identifier.
    pub station_id: String,
    /// Station name, when the provider reports one.
    pub location: Option<String>,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lon: f64,
    /// Measured value (PM2.5 concentration).
    pub value: f64,
    /// Measurement unit as reported (usually `µg/m³`).
    pub unit: String,
    /// When the measurement was taken.
    pub timestamp: Option<DateTime<Utc>>,
}

/// Where the baseline values came from.
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
#[strum(serialize_all = "snake_case")]
pub enum BaselineSource {
    /// Synthetic model adjusted with sensor observations.
    Blended,
    /// Synthetic model only (no usable sensor observations).
    SyntheticOnly,
}

/// Aggregate statistics for a grid.
///
/// Derived from the grid that produced it; never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    /// Number of cells.
    pub num_points: usize,
    /// Area of one cell in km².
    pub cell_area_km2: f64,
    /// Total covered area in km².
    pub coverage_area_km2: f64,
    /// Sum of cell intensities.
    pub total_intensity: f64,
    /// Mean cell intensity in tonnes CO₂/km²/day (0 for an empty grid).
    pub average_intensity: f64,
    /// Total emissions in tonnes CO₂/day.
    pub total_emissions_per_day: f64,
    /// Total emissions in tonnes CO₂/year.
    pub annual_emissions_tonnes: f64,
}

impl Statistics {
    /// Statistics of an empty cell set.
    #[must_use]
    pub const fn empty(cell_area_km2: f64) -> Self {
        Self {
            num_points: 0,
            cell_area_km2,
            coverage_area_km2: 0.0,
            total_intensity: 0.0,
            average_intensity: 0.0,
            total_emissions_per_day: 0.0,
            annual_emissions_tonnes: 0.0,
        }
    }

    /// Annualizes a daily total.
    #[must_use]
    pub fn annualize(per_day: f64) -> f64 {
        per_day * DAYS_PER_YEAR
    }
}

/// Statistics restricted to the cells of one named region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionStatistics {
    /// Region display name.
    pub region: String,
    /// Statistics over the region's cells.
    pub statistics: Statistics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use co2_map_geography_models::NYC_BOUNDS;

    #[test]
    fn auto_resolution_gives_km_cells() {
        let res = LatticeSpec::auto_resolution(&NYC_BOUNDS);
        assert_eq!(res, 48);
        let spec = LatticeSpec::new(NYC_BOUNDS, res).unwrap();
        let area = spec.cell_area_km2();
        assert!(area > 0.9 && area < 1.0, "cell area {area}");
    }

    #[test]
    fn coverage_equals_bounds_area() {
        let spec = LatticeSpec::new(NYC_BOUNDS, 22).unwrap();
        #[allow(clippy::cast_precision_loss)]
        let coverage = spec.cell_area_km2() * spec.cell_count() as f64;
        let expected = NYC_BOUNDS.height_km() * NYC_BOUNDS.width_km();
        assert!((coverage - expected).abs() / expected < 1e-12);
    }

    #[test]
    fn lattice_includes_both_edges() {
        let spec = LatticeSpec::new(NYC_BOUNDS, 10).unwrap();
        let points: Vec<_> = spec.points().collect();
        assert_eq!(points.len(), 100);
        assert_eq!(points[0], (NYC_BOUNDS.south, NYC_BOUNDS.west));
        let (lat, lon) = points[99];
        assert!((lat - NYC_BOUNDS.north).abs() < 1e-12);
        assert!((lon - NYC_BOUNDS.east).abs() < 1e-12);
        assert!(points.iter().all(|(lat, lon)| NYC_BOUNDS.contains(*lat, *lon)));
    }

    #[test]
    fn rejects_degenerate_lattice() {
        assert_eq!(
            LatticeSpec::new(NYC_BOUNDS, 1),
            Err(GridShapeError::Resolution { resolution: 1 })
        );
        let flat = BoundingBox::new(40.0, 40.0, -74.0, -73.0);
        assert_eq!(LatticeSpec::new(flat, 4), Err(GridShapeError::Bounds));
    }

    #[test]
    fn from_values_checks_count() {
        let spec = LatticeSpec::new(NYC_BOUNDS, 3).unwrap();
        let err = Grid::from_values(spec, vec![1.0; 8]).unwrap_err();
        assert_eq!(err, GridShapeError::CellCount { expected: 9, actual: 8 });
        let grid = Grid::from_values(spec, vec![1.0; 9]).unwrap();
        assert_eq!(grid.len(), 9);
    }

    #[test]
    fn map_values_preserves_geometry() {
        let spec = LatticeSpec::new(NYC_BOUNDS, 4).unwrap();
        let grid = Grid::from_values(spec, vec![2.0; 16]).unwrap();
        let doubled = grid.map_values(|c| c.value * 2.0);
        assert!(grid.same_geometry(&doubled));
        assert!(doubled.values().all(|v| (v - 4.0).abs() < f64::EPSILON));
    }

    #[test]
    fn baseline_source_names() {
        assert_eq!(BaselineSource::SyntheticOnly.to_string(), "synthetic_only");
        assert_eq!(
            "blended".parse::<BaselineSource>().ok(),
            Some(BaselineSource::Blended)
        );
    }
}
