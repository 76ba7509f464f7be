//! `OpenAQ` PM2.5 client.
//!
//! With an API key the v3 API is used: `/v3/locations` near the city
//! centre, then the latest measurement of every PM2.5 sensor found. If
//! that fails, or no key is configured, the legacy `/v2/latest` endpoint
//! is queried instead.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use co2_map_geography_models::GeoPoint;
use co2_map_grid_models::SensorObservation;
use serde_json::Value;

use crate::{SensorConfig, SensorError, SensorSource, retry};

const API_BASE: &str = "https://api.openaq.org";
const USER_AGENT: &str = "co2-map/0.1";
const PARAMETER: &str = "pm25";
const DEFAULT_UNIT: &str = "µg/m³";

/// Query centre (lower Manhattan).
pub const QUERY_CENTER: GeoPoint = GeoPoint::new(40.7128, -74.0060);

/// Query radius in metres.
pub const QUERY_RADIUS_M: u32 = 25_000;

/// Maximum number of locations requested.
const PAGE_LIMIT: u32 = 100;

/// Maximum number of v3 sensors whose latest measurement is fetched.
const MAX_V3_SENSORS: usize = 25;

/// A PM2.5 sensor discovered through `/v3/locations`.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorRef {
    /// `OpenAQ` sensor id.
    pub sensor_id: u64,
    /// Location name.
    pub location: String,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lon: f64,
}

/// `OpenAQ` sensor source.
pub struct OpenAqClient {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

impl OpenAqClient {
    /// Creates a client from the given settings.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Http`] if the HTTP client cannot be built.
    pub fn new(config: &SensorConfig) -> Result<Self, SensorError> {
        Self::with_base_url(config, API_BASE)
    }

    /// Creates a client against a different API host.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError::Http`] if the HTTP client cannot be built.
    pub fn with_base_url(config: &SensorConfig, base_url: &str) -> Result<Self, SensorError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn fetch_v3(&self, api_key: &str) -> Result<Vec<SensorObservation>, SensorError> {
        let url = format!("{}/v3/locations", self.base_url);
        let coordinates = format!("{},{}", QUERY_CENTER.lat, QUERY_CENTER.lon);
        let body = retry::send_json(|| {
            self.client
                .get(&url)
                .header("X-API-Key", api_key)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[
                    ("limit", PAGE_LIMIT.to_string()),
                    ("page", "1".to_string()),
                    ("coordinates", coordinates.clone()),
                    ("radius", QUERY_RADIUS_M.to_string()),
                    ("parameters[]", PARAMETER.to_string()),
                ])
        })
        .await?;

        let sensors = parse_v3_locations(&body)?;
        log::debug!("OpenAQ v3: {} PM2.5 sensors near the city", sensors.len());

        if sensors.len() > MAX_V3_SENSORS {
            log::debug!("OpenAQ v3: querying the first {MAX_V3_SENSORS} sensors");
        }

        let mut observations = Vec::new();
        let mut failures = 0_usize;
        let queried = &sensors[..sensors.len().min(MAX_V3_SENSORS)];
        for sensor in queried {
            let url = format!("{}/v3/sensors/{}/measurements", self.base_url, sensor.sensor_id);
            let measurements = retry::send_json(|| {
                self.client
                    .get(&url)
                    .header("X-API-Key", api_key)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .query(&[
                        ("limit", "1"),
                        ("page", "1"),
                        ("order_by", "datetime"),
                        ("sort", "desc"),
                    ])
            })
            .await
            .and_then(|body| parse_v3_measurements(&body, sensor));

            match measurements {
                Ok(found) => observations.extend(found),
                Err(e) => {
                    log::debug!("OpenAQ v3: sensor {} skipped: {e}", sensor.sensor_id);
                    failures += 1;
                }
            }
        }

        if !queried.is_empty() && failures == queried.len() {
            return Err(SensorError::Response {
                message: format!("all {failures} v3 measurement requests failed"),
            });
        }

        Ok(observations)
    }

    async fn fetch_v2(&self) -> Result<Vec<SensorObservation>, SensorError> {
        let url = format!("{}/v2/latest", self.base_url);
        let coordinates = format!("{},{}", QUERY_CENTER.lat, QUERY_CENTER.lon);
        let body = retry::send_json(|| {
            self.client
                .get(&url)
                .header(reqwest::header::ACCEPT, "application/json")
                .query(&[
                    ("limit", PAGE_LIMIT.to_string()),
                    ("page", "1".to_string()),
                    ("parameter", PARAMETER.to_string()),
                    ("coordinates", coordinates.clone()),
                    ("radius", QUERY_RADIUS_M.to_string()),
                ])
        })
        .await?;

        parse_v2_latest(&body)
    }
}

#[async_trait]
impl SensorSource for OpenAqClient {
    fn id(&self) -> &'static str {
        "openaq"
    }

    async fn fetch(&self) -> Result<Vec<SensorObservation>, SensorError> {
        if let Some(api_key) = &self.api_key {
            match self.fetch_v3(api_key).await {
                Ok(observations) => return Ok(observations),
                Err(e) => log::warn!("OpenAQ v3 fetch failed ({e}); falling back to v2"),
            }
        }
        self.fetch_v2().await
    }
}

fn results(body: &Value) -> Result<&Vec<Value>, SensorError> {
    body.get("results")
        .and_then(Value::as_array)
        .ok_or_else(|| SensorError::Response {
            message: "missing 'results' array".to_string(),
        })
}

fn coordinates(value: &Value) -> Option<(f64, f64)> {
    let coords = value.get("coordinates")?;
    Some((
        coords.get("latitude")?.as_f64()?,
        coords.get("longitude")?.as_f64()?,
    ))
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Extracts PM2.5 sensors from a `/v3/locations` response.
///
/// Locations without coordinates are skipped.
///
/// # Errors
///
/// Returns [`SensorError::Response`] if the body has no `results` array.
pub fn parse_v3_locations(body: &Value) -> Result<Vec<SensorRef>, SensorError> {
    let mut sensors = Vec::new();
    for location in results(body)? {
        let Some((lat, lon)) = coordinates(location) else {
            continue;
        };
        let name = location
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Unknown");

        let Some(list) = location.get("sensors").and_then(Value::as_array) else {
            continue;
        };
        for sensor in list {
            let parameter = sensor
                .get("parameter")
                .and_then(|p| p.get("name"))
                .and_then(Value::as_str);
            if parameter != Some(PARAMETER) {
                continue;
            }
            if let Some(sensor_id) = sensor.get("id").and_then(Value::as_u64) {
                sensors.push(SensorRef {
                    sensor_id,
                    location: name.to_string(),
                    lat,
                    lon,
                });
            }
        }
    }
    Ok(sensors)
}

/// Extracts observations from a `/v3/sensors/{id}/measurements` response.
///
/// Measurements without a numeric value are skipped.
///
/// # Errors
///
/// Returns [`SensorError::Response`] if the body has no `results` array.
pub fn parse_v3_measurements(
    body: &Value,
    sensor: &SensorRef,
) -> Result<Vec<SensorObservation>, SensorError> {
    Ok(results(body)?
        .iter()
        .filter_map(|result| {
            let value = result.get("value")?.as_f64()?;
            let unit = result
                .get("parameter")
                .and_then(|p| p.get("units"))
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_UNIT);
            let timestamp = parse_timestamp(
                result
                    .get("period")
                    .and_then(|p| p.get("datetimeTo"))
                    .and_then(|d| d.get("utc")),
            );
            Some(SensorObservation {
                station_id: sensor.sensor_id.to_string(),
                location: Some(sensor.location.clone()),
                lat: sensor.lat,
                lon: sensor.lon,
                value,
                unit: unit.to_string(),
                timestamp,
            })
        })
        .collect())
}

/// Extracts PM2.5 observations from a `/v2/latest` response.
///
/// # Errors
///
/// Returns [`SensorError::Response`] if the body has no `results` array.
pub fn parse_v2_latest(body: &Value) -> Result<Vec<SensorObservation>, SensorError> {
    let mut observations = Vec::new();
    for result in results(body)? {
        let Some((lat, lon)) = coordinates(result) else {
            continue;
        };
        let location = result.get("location").and_then(Value::as_str);
        let station_id = result
            .get("locationId")
            .and_then(Value::as_u64)
            .map(|id| id.to_string())
            .or_else(|| location.map(str::to_string))
            .unwrap_or_else(|| format!("{lat},{lon}"));

        let Some(measurements) = result.get("measurements").and_then(Value::as_array) else {
            continue;
        };
        for m in measurements {
            if m.get("parameter").and_then(Value::as_str) != Some(PARAMETER) {
                continue;
            }
            let Some(value) = m.get("value").and_then(Value::as_f64) else {
                continue;
            };
            observations.push(SensorObservation {
                station_id: station_id.clone(),
                location: location.map(str::to_string),
                lat,
                lon,
                value,
                unit: m
                    .get("unit")
                    .and_then(Value::as_str)
                    .unwrap_or(DEFAULT_UNIT)
                    .to_string(),
                timestamp: parse_timestamp(m.get("lastUpdated")),
            });
        }
    }
    Ok(observations)
}
