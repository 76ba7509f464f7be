#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! API request and response types for the CO₂ map server.
//!
//! These types are serialized to JSON for the REST API. Engine values stay
//! unrounded; rounding happens only when a response is built here.

use chrono::{DateTime, Utc};
use co2_map_geography_models::BoundingBox;
use co2_map_grid_models::{BaselineSource, GeoCell, RegionStatistics, SensorObservation, Statistics};
use co2_map_intervention_models::{Direction, InterventionPlan, InterventionStatistics};
use serde::{Deserialize, Serialize};

/// Unit label for cell values.
pub const INTENSITY_UNIT: &str = "tonnes CO₂/km²/day";

/// Rounds to a fixed number of decimal places.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10_f64.powi(places);
    (value * scale).round() / scale
}

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiHealth {
    /// Whether the server is healthy.
    pub healthy: bool,
    /// Server version.
    pub version: String,
}

/// Error body for rejected requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable message.
    pub error: String,
    /// Offending directive field, when the request was rejected for one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Grid statistics and provenance as presented to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMetadata {
    /// City name.
    pub city: String,
    /// Unit of cell values.
    pub unit: String,
    /// Description of where the values come from.
    pub source: String,
    /// Whether sensor data was blended in.
    pub baseline_source: BaselineSource,
    /// Number of sensor observations used.
    pub sensor_count: usize,
    /// Lattice bounds.
    pub bounds: BoundingBox,
    /// When the baseline was generated.
    pub timestamp: DateTime<Utc>,
    /// Number of cells.
    pub datapoints: usize,
    /// Total area in km² (1 dp).
    pub coverage_area_km2: f64,
    /// Area per cell in km² (4 dp).
    pub cell_area_km2: f64,
    /// Mean intensity (2 dp).
    pub average_emission_intensity: f64,
    /// Tonnes per day (0 dp).
    pub total_emissions_per_day: f64,
    /// Tonnes per year (0 dp).
    pub annual_emissions_tonnes: f64,
    /// One-line summary of resolution and coverage.
    pub description: String,
}

/// Provenance fields for [`ApiMetadata`].
#[derive(Debug, Clone)]
pub struct Provenance<'a> {
    /// City name.
    pub city: &'a str,
    /// Description of where the values come from.
    pub source: &'a str,
    /// Whether sensor data was blended in.
    pub baseline_source: BaselineSource,
    /// Number of sensor observations used.
    pub sensor_count: usize,
    /// Lattice bounds.
    pub bounds: BoundingBox,
    /// When the baseline was generated.
    pub timestamp: DateTime<Utc>,
}

impl ApiMetadata {
    /// Builds rounded metadata from raw statistics.
    #[must_use]
    pub fn new(statistics: &Statistics, provenance: &Provenance<'_>) -> Self {
        Self {
            city: provenance.city.to_string(),
            unit: INTENSITY_UNIT.to_string(),
            source: provenance.source.to_string(),
            baseline_source: provenance.baseline_source,
            sensor_count: provenance.sensor_count,
            bounds: provenance.bounds,
            timestamp: provenance.timestamp,
            datapoints: statistics.num_points,
            coverage_area_km2: round_to(statistics.coverage_area_km2, 1),
            cell_area_km2: round_to(statistics.cell_area_km2, 4),
            average_emission_intensity: round_to(statistics.average_intensity, 2),
            total_emissions_per_day: round_to(statistics.total_emissions_per_day, 0),
            annual_emissions_tonnes: round_to(statistics.annual_emissions_tonnes, 0),
            description: format!(
                "Each datapoint represents ~{:.2} km². Total coverage: {:.0} km²",
                statistics.cell_area_km2, statistics.coverage_area_km2
            ),
        }
    }
}

/// `GET /api/baseline` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineResponse {
    /// Cells in lattice order.
    pub grid: Vec<GeoCell>,
    /// Rounded statistics and provenance.
    pub metadata: ApiMetadata,
}

/// Before/after statistics as presented to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiInterventionStatistics {
    /// Baseline tonnes per year (0 dp).
    pub baseline_tons_co2: f64,
    /// Modified tonnes per year (0 dp).
    pub reduced_tons_co2: f64,
    /// Baseline minus modified, tonnes per year (0 dp).
    pub annual_savings_tons_co2: f64,
    /// Realized change in percent, positive for a reduction (2 dp).
    pub percentage_reduction: f64,
    /// Requested change in percent, positive for a decrease (2 dp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nominal_percent: Option<f64>,
    /// Net direction.
    pub direction: Direction,
    /// Whether the total went up.
    pub is_increase: bool,
    /// Cells whose value changed.
    pub cells_affected: usize,
    /// Whether the request was unrelated to emissions.
    pub is_unrelated: bool,
}

impl From<&InterventionStatistics> for ApiInterventionStatistics {
    fn from(stats: &InterventionStatistics) -> Self {
        Self {
            baseline_tons_co2: round_to(stats.baseline_tons_co2, 0),
            reduced_tons_co2: round_to(stats.reduced_tons_co2, 0),
            annual_savings_tons_co2: round_to(stats.annual_savings_tons_co2, 0),
            percentage_reduction: round_to(stats.percentage_reduction, 2),
            nominal_percent: stats.nominal_percent.map(|p| round_to(p, 2)),
            direction: stats.direction,
            is_increase: stats.is_increase,
            cells_affected: stats.cells_affected,
            is_unrelated: stats.is_unrelated,
        }
    }
}

/// `POST /api/simulate` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResponse {
    /// Modified cells in lattice order.
    pub grid: Vec<GeoCell>,
    /// The normalized plan that was applied.
    pub intervention: InterventionPlan,
    /// Rounded statistics of the modified grid.
    pub metadata: ApiMetadata,
    /// Before/after comparison.
    pub statistics: ApiInterventionStatistics,
}

/// Per-region share of the baseline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiRegion {
    /// Region name.
    pub name: String,
    /// Cells inside the region.
    pub datapoints: usize,
    /// Region area covered by those cells in km² (1 dp).
    pub coverage_area_km2: f64,
    /// Mean intensity (2 dp).
    pub average_emission_intensity: f64,
    /// Tonnes per year (0 dp).
    pub annual_emissions_tonnes: f64,
}

impl From<&RegionStatistics> for ApiRegion {
    fn from(region: &RegionStatistics) -> Self {
        Self {
            name: region.region.clone(),
            datapoints: region.statistics.num_points,
            coverage_area_km2: round_to(region.statistics.coverage_area_km2, 1),
            average_emission_intensity: round_to(region.statistics.average_intensity, 2),
            annual_emissions_tonnes: round_to(region.statistics.annual_emissions_tonnes, 0),
        }
    }
}

/// `GET /api/sensors` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorsResponse {
    /// Observations in provider order.
    pub stations: Vec<SensorObservation>,
    /// Number of observations.
    pub count: usize,
}
