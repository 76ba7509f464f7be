//! HTTP handler functions for the CO₂ map API.

use actix_web::{HttpResponse, web};
use co2_map_intervention::InterventionError;
use co2_map_server_models::{ApiError, ApiHealth, SensorsResponse};
use serde::Deserialize;

use crate::{AppState, ServerError};

/// Query parameters for the baseline endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BaselineQuery {
    /// Rebuild the cached baseline (re-fetching sensor data).
    #[serde(default)]
    pub refresh: bool,
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/baseline`
///
/// Returns the calibrated baseline grid and its statistics.
pub async fn baseline(
    state: web::Data<AppState>,
    params: web::Query<BaselineQuery>,
) -> HttpResponse {
    match state.baseline_response(params.refresh).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            log::error!("Failed to build baseline: {e}");
            HttpResponse::InternalServerError().json(ApiError {
                error: format!("Failed to build baseline: {e}"),
                field: None,
            })
        }
    }
}

/// `POST /api/simulate`
///
/// Applies a directive (or list of directives) to the cached baseline.
pub async fn simulate(
    state: web::Data<AppState>,
    body: web::Json<serde_json::Value>,
) -> HttpResponse {
    match state.simulate(&body).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(ServerError::Intervention(InterventionError::InvalidDirective { field, message })) => {
            log::warn!("Rejected directive: field '{field}': {message}");
            HttpResponse::BadRequest().json(ApiError {
                error: format!("Invalid directive: {message}"),
                field: Some(field),
            })
        }
        Err(e) => {
            log::error!("Failed to simulate intervention: {e}");
            HttpResponse::InternalServerError().json(ApiError {
                error: format!("Failed to simulate intervention: {e}"),
                field: None,
            })
        }
    }
}

/// `GET /api/sensors`
///
/// Returns the raw sensor snapshot. An unavailable provider yields an
/// empty list.
pub async fn sensors(state: web::Data<AppState>) -> HttpResponse {
    let stations = state.sensor_snapshot().await;
    HttpResponse::Ok().json(SensorsResponse {
        count: stations.len(),
        stations,
    })
}

/// `GET /api/regions`
///
/// Per-borough share of the cached baseline.
pub async fn regions(state: web::Data<AppState>) -> HttpResponse {
    match state.regions_response().await {
        Ok(regions) => HttpResponse::Ok().json(regions),
        Err(e) => {
            log::error!("Failed to aggregate regions: {e}");
            HttpResponse::InternalServerError().json(ApiError {
                error: format!("Failed to aggregate regions: {e}"),
                field: None,
            })
        }
    }
}
