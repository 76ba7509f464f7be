#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the CO₂ emissions map.
//!
//! Serves the calibrated baseline grid, applies intervention directives
//! to it, and exposes the raw sensor snapshot and per-borough totals. The
//! baseline is built on first request and cached process-wide; `refresh`
//! rebuilds it and swaps the cached snapshot atomically.

mod handlers;

use std::sync::Arc;
use std::time::Duration;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use co2_map_geography::{GeographyError, RegionTable};
use co2_map_grid::{
    BaselineCache, CachedBaseline, EngineConfig, GridError, GridSynthesizer, NycEmissionModel,
    stats::aggregate_by_region,
};
use co2_map_grid_models::SensorObservation;
use co2_map_intervention::{InterventionError, apply_plan, normalize_plan, validate_plan};
use co2_map_sensor::{OpenAqClient, SensorConfig, SensorError, SensorSource, fetch_snapshot};
use co2_map_server_models::{
    ApiInterventionStatistics, ApiMetadata, ApiRegion, BaselineResponse, Provenance,
    SimulationResponse,
};

/// Extra time allowed for the whole sensor fetch beyond one request timeout
/// (covers the retry pause and the v3 → v2 fallback).
const SENSOR_BUDGET_SLACK: Duration = Duration::from_secs(5);

/// Errors that can occur while starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Grid configuration or computation failed.
    #[error(transparent)]
    Grid(#[from] GridError),

    /// Region table failed to load.
    #[error(transparent)]
    Geography(#[from] GeographyError),

    /// Sensor client could not be built.
    #[error(transparent)]
    Sensor(#[from] SensorError),

    /// An intervention was rejected or failed.
    #[error(transparent)]
    Intervention(#[from] InterventionError),
}

/// Shared application state.
pub struct AppState {
    /// Borough outlines used for land coverage and region targets.
    pub regions: RegionTable,
    /// Grid engine settings, fixed at startup.
    pub config: EngineConfig,
    /// Most recent baseline.
    pub cache: BaselineCache,
    /// Where sensor observations come from.
    pub sensors: Arc<dyn SensorSource>,
    /// Upper bound on one sensor snapshot fetch.
    pub sensor_budget: Duration,
}

impl AppState {
    /// Builds the state from environment variables, using `OpenAQ` as the
    /// sensor source.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the configuration is invalid, the region
    /// table fails to load, or the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, ServerError> {
        let config = EngineConfig::from_env()?;
        let sensor_config = SensorConfig::from_env();
        let client = OpenAqClient::new(&sensor_config)?;
        let budget = sensor_config.request_timeout * 2 + SENSOR_BUDGET_SLACK;
        Self::new(config, Arc::new(client), budget)
    }

    /// Builds the state with an explicit sensor source.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the configuration is invalid or the
    /// region table fails to load.
    pub fn new(
        config: EngineConfig,
        sensors: Arc<dyn SensorSource>,
        sensor_budget: Duration,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            regions: RegionTable::nyc()?,
            config,
            cache: BaselineCache::new(),
            sensors,
            sensor_budget,
        })
    }

    /// Fetches the current sensor snapshot (empty on failure).
    pub async fn sensor_snapshot(&self) -> Vec<SensorObservation> {
        fetch_snapshot(self.sensors.as_ref(), self.sensor_budget).await
    }

    /// Returns the cached baseline, building it first if there is none or
    /// `refresh` is set.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if synthesis fails.
    pub async fn baseline(&self, refresh: bool) -> Result<Arc<CachedBaseline>, GridError> {
        if !refresh {
            if let Some(cached) = self.cache.get() {
                return Ok(cached);
            }
        }

        let observations = self.sensor_snapshot().await;
        let synthesizer =
            GridSynthesizer::new(self.config.clone(), NycEmissionModel::new(&self.regions))?;
        let baseline = synthesizer.synthesize_baseline(&observations)?;
        Ok(self.cache.replace(baseline))
    }

    /// Builds the baseline response.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if synthesis fails.
    pub async fn baseline_response(&self, refresh: bool) -> Result<BaselineResponse, GridError> {
        let cached = self.baseline(refresh).await?;
        let baseline = &cached.baseline;
        let source = format!(
            "Calibrated to the {} greenhouse gas inventory ({:.0} tonnes/year)",
            self.regions.name(),
            self.config.calibration_annual_tonnes
        );
        let provenance = Provenance {
            city: self.regions.name(),
            source: &source,
            baseline_source: baseline.source,
            sensor_count: baseline.sensors_used,
            bounds: self.config.bounds,
            timestamp: cached.generated_at,
        };
        Ok(BaselineResponse {
            grid: baseline.grid.cells().to_vec(),
            metadata: ApiMetadata::new(&baseline.statistics, &provenance),
        })
    }

    /// Normalizes a raw directive payload and applies it to the cached
    /// baseline. Directives are validated before the baseline is built.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Intervention`] if the directive is invalid,
    /// or [`ServerError::Grid`] if the baseline cannot be built.
    pub async fn simulate(
        &self,
        raw: &serde_json::Value,
    ) -> Result<SimulationResponse, ServerError> {
        let plan = normalize_plan(raw)?;
        validate_plan(&plan, &self.regions)?;
        let cached = self.baseline(false).await?;
        let baseline = &cached.baseline;

        let (grid, statistics) = apply_plan(&baseline.grid, &plan, &self.regions)?;

        let provenance = Provenance {
            city: self.regions.name(),
            source: "Simulated intervention on the calibrated baseline",
            baseline_source: baseline.source,
            sensor_count: baseline.sensors_used,
            bounds: self.config.bounds,
            timestamp: cached.generated_at,
        };
        Ok(SimulationResponse {
            metadata: ApiMetadata::new(&statistics.modified, &provenance),
            statistics: ApiInterventionStatistics::from(&statistics),
            grid: grid.cells().to_vec(),
            intervention: plan,
        })
    }

    /// Per-borough share of the cached baseline.
    ///
    /// # Errors
    ///
    /// Returns [`GridError`] if the baseline cannot be built.
    pub async fn regions_response(&self) -> Result<Vec<ApiRegion>, GridError> {
        let cached = self.baseline(false).await?;
        Ok(aggregate_by_region(&cached.baseline.grid, &self.regions)
            .iter()
            .map(ApiRegion::from)
            .collect())
    }
}

/// Starts the CO₂ map API server.
///
/// Builds the application state from the environment and starts the
/// Actix-Web HTTP server on `BIND_ADDR`:`PORT`. The caller is responsible
/// for providing the async runtime and initialising logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the state cannot be built, or the
/// HTTP server fails to bind or encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server() -> std::io::Result<()> {
    let state = AppState::from_env().map_err(std::io::Error::other)?;
    log::info!(
        "Grid: {0}x{0} lattice, calibration {1:.0} tonnes/year",
        state.config.resolution,
        state.config.calibration_annual_tonnes
    );

    let state = web::Data::new(state);

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route("/baseline", web::get().to(handlers::baseline))
                    .route("/simulate", web::post().to(handlers::simulate))
                    .route("/sensors", web::get().to(handlers::sensors))
                    .route("/regions", web::get().to(handlers::regions)),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use co2_map_sensor::StaticSource;
    use serde_json::json;

    fn state(observations: Vec<SensorObservation>) -> AppState {
        let config = EngineConfig {
            resolution: 22,
            ..EngineConfig::default()
        };
        AppState::new(
            config,
            Arc::new(StaticSource::new(observations)),
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn baseline_is_cached_until_refresh() {
        let state = state(Vec::new());
        let first = state.baseline(false).await.unwrap();
        let second = state.baseline(false).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let refreshed = state.baseline(true).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
    }

    #[tokio::test]
    async fn baseline_response_matches_calibration() {
        let response = state(Vec::new()).baseline_response(false).await.unwrap();
        assert_eq!(response.grid.len(), 484);
        assert_eq!(response.metadata.datapoints, 484);
        assert!((response.metadata.annual_emissions_tonnes - 55_000_000.0).abs() <= 1.0);
        assert_eq!(response.metadata.sensor_count, 0);
    }

    #[tokio::test]
    async fn simulate_manhattan_reduction() {
        let response = state(Vec::new())
            .simulate(&json!({"target": "Manhattan", "magnitude": 50, "direction": "decrease"}))
            .await
            .unwrap();
        assert_eq!(response.grid.len(), 484);
        assert!(response.statistics.percentage_reduction > 0.0);
        assert!(response.statistics.percentage_reduction < 50.0);
        assert_eq!(response.statistics.cells_affected, 13);
        assert_eq!(response.statistics.nominal_percent, Some(50.0));
    }

    #[tokio::test]
    async fn simulate_rejects_invalid_directive() {
        let err = state(Vec::new())
            .simulate(&json!({"target": "Atlantis", "magnitude": 10, "direction": "decrease"}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServerError::Intervention(InterventionError::InvalidDirective { ref field, .. })
                if field == "target.name"
        ));
    }

    #[tokio::test]
    async fn rejected_directive_does_not_build_baseline() {
        let state = state(Vec::new());
        let err = state
            .simulate(&json!({"target": "Hoboken", "magnitude": 10, "direction": "decrease"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Intervention(_)));
        assert!(state.cache.get().is_none());
    }

    #[tokio::test]
    async fn regions_cover_all_boroughs() {
        let regions = state(Vec::new()).regions_response().await.unwrap();
        assert_eq!(regions.len(), 5);
        assert!(regions.iter().all(|r| r.datapoints > 0));
    }
}
