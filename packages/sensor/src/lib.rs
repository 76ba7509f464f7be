#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sensor Snapshot Fetcher.
//!
//! Retrieves point observations from an external air quality service.
//! Every failure mode (transport, decoding, timeout) is a data
//! unavailability condition: [`fetch_snapshot`] logs it and returns an
//! empty snapshot so baseline synthesis falls back to the synthetic model.

pub mod openaq;
pub mod retry;

use std::time::Duration;

use async_trait::async_trait;
use co2_map_grid_models::SensorObservation;

pub use openaq::OpenAqClient;

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Errors that can occur while fetching sensor data.
#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The fetch did not finish in time.
    #[error("Sensor fetch timed out after {seconds}s")]
    Timeout {
        /// Elapsed budget in seconds.
        seconds: u64,
    },

    /// The service answered with an unusable response.
    #[error("Unexpected sensor response: {message}")]
    Response {
        /// Description of what went wrong.
        message: String,
    },
}

/// A provider of sensor observations.
#[async_trait]
pub trait SensorSource: Send + Sync {
    /// Returns a unique identifier for this source (e.g., `"openaq"`).
    fn id(&self) -> &str;

    /// Fetches the latest observations.
    ///
    /// # Errors
    ///
    /// Returns [`SensorError`] if the data cannot be retrieved.
    async fn fetch(&self) -> Result<Vec<SensorObservation>, SensorError>;
}

/// Sensor fetch settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    /// `OpenAQ` v3 API key. Without one only the legacy endpoint is tried.
    pub api_key: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl SensorConfig {
    /// Reads `OPENAQ_API_KEY` and `SENSOR_TIMEOUT_SECS` from the
    /// environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the settings from an arbitrary key lookup. A malformed
    /// timeout falls back to the default with a warning.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("OPENAQ_API_KEY")
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let timeout_secs = match lookup("SENSOR_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => {
                    log::warn!(
                        "Ignoring invalid SENSOR_TIMEOUT_SECS '{raw}', using {DEFAULT_TIMEOUT_SECS}s"
                    );
                    DEFAULT_TIMEOUT_SECS
                }
            },
        };

        Self {
            api_key,
            request_timeout: Duration::from_secs(timeout_secs),
        }
    }
}

/// Fetches a snapshot from `source`, bounded by `budget`.
///
/// Never fails: on error or timeout it logs a warning and returns an empty
/// vector, which callers treat as "no sensor data".
pub async fn fetch_snapshot(source: &dyn SensorSource, budget: Duration) -> Vec<SensorObservation> {
    match tokio::time::timeout(budget, source.fetch()).await {
        Ok(Ok(observations)) => {
            log::info!(
                "Fetched {} sensor observations from '{}'",
                observations.len(),
                source.id()
            );
            observations
        }
        Ok(Err(e)) => {
            log::warn!(
                "Sensor data unavailable from '{}', using synthetic-only baseline: {e}",
                source.id()
            );
            Vec::new()
        }
        Err(_) => {
            let e = SensorError::Timeout {
                seconds: budget.as_secs(),
            };
            log::warn!(
                "Sensor data unavailable from '{}', using synthetic-only baseline: {e}",
                source.id()
            );
            Vec::new()
        }
    }
}

/// A source that always returns the same observations. Used when sensor
/// fetching is disabled and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    observations: Vec<SensorObservation>,
}

impl StaticSource {
    /// Creates a source that returns `observations` on every fetch.
    #[must_use]
    pub const fn new(observations: Vec<SensorObservation>) -> Self {
        Self { observations }
    }
}

#[async_trait]
impl SensorSource for StaticSource {
    fn id(&self) -> &'static str {
        "static"
    }

    async fn fetch(&self) -> Result<Vec<SensorObservation>, SensorError> {
        Ok(self.observations.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    struct FailingSource;

    #[async_trait]
    impl SensorSource for FailingSource {
        fn id(&self) -> &'static str {
            "failing"
        }

        async fn fetch(&self) -> Result<Vec<SensorObservation>, SensorError> {
            Err(SensorError::Response {
                message: "HTTP 503".to_string(),
            })
        }
    }

    struct SlowSource;

    #[async_trait]
    impl SensorSource for SlowSource {
        fn id(&self) -> &'static str {
            "slow"
        }

        async fn fetch(&self) -> Result<Vec<SensorObservation>, SensorError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec![observation()])
        }
    }

    fn observation() -> SensorObservation {
        SensorObservation {
            station_id: "1".to_string(),
            location: Some("Queens College".to_string()),
            lat: 40.737,
            lon: -73.821,
            value: 9.4,
            unit: "µg/m³".to_string(),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn returns_observations_on_success() {
        let source = StaticSource::new(vec![observation()]);
        let snapshot = fetch_snapshot(&source, Duration::from_secs(1)).await;
        assert_eq!(snapshot, vec![observation()]);
    }

    #[tokio::test]
    async fn failure_degrades_to_empty() {
        let snapshot = fetch_snapshot(&FailingSource, Duration::from_secs(1)).await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn timeout_degrades_to_empty() {
        let snapshot = fetch_snapshot(&SlowSource, Duration::from_millis(50)).await;
        assert!(snapshot.is_empty());
    }

    #[test]
    fn config_from_lookup() {
        let vars: BTreeMap<&str, &str> =
            [("OPENAQ_API_KEY", " abc "), ("SENSOR_TIMEOUT_SECS", "4")].into();
        let config = SensorConfig::from_lookup(|key: &str| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.api_key.as_deref(), Some("abc"));
        assert_eq!(config.request_timeout, Duration::from_secs(4));

        let config = SensorConfig::from_lookup(|key: &str| {
            (key == "SENSOR_TIMEOUT_SECS").then(|| "zero".to_string())
        });
        assert_eq!(config, SensorConfig::default());
    }
}
