//! Engine configuration.
//!
//! Values come from environment variables with documented defaults. The
//! calibration constant is read once at startup and stays fixed for the
//! lifetime of the process.

use std::str::FromStr;

use co2_map_geography_models::{BoundingBox, NYC_BOUNDS};
use co2_map_grid_models::LatticeSpec;

use crate::GridError;

/// Published NYC greenhouse gas inventory total, tonnes CO₂e per year.
pub const DEFAULT_CALIBRATION_ANNUAL_TONNES: f64 = 55_000_000.0;

/// Default sensor influence radius in km.
pub const DEFAULT_INFLUENCE_RADIUS_KM: f64 = 3.0;

/// Default conversion from PM2.5 (µg/m³) to tonnes CO₂/km²/day.
pub const DEFAULT_SENSOR_INTENSITY_PER_UNIT: f64 = 10.0;

/// Tunables for baseline synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Area covered by the lattice.
    pub bounds: BoundingBox,
    /// Lattice points per dimension.
    pub resolution: usize,
    /// Reference annual total the baseline is calibrated to (tonnes/year).
    pub calibration_annual_tonnes: f64,
    /// Observations further than this from a cell are ignored (km).
    pub influence_radius_km: f64,
    /// Intensity contributed per unit of observed concentration.
    pub sensor_intensity_per_unit: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bounds: NYC_BOUNDS,
            resolution: LatticeSpec::auto_resolution(&NYC_BOUNDS),
            calibration_annual_tonnes: DEFAULT_CALIBRATION_ANNUAL_TONNES,
            influence_radius_km: DEFAULT_INFLUENCE_RADIUS_KM,
            sensor_intensity_per_unit: DEFAULT_SENSOR_INTENSITY_PER_UNIT,
        }
    }
}

impl EngineConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Recognized variables: `GRID_RESOLUTION`, `CALIBRATION_ANNUAL_TONNES`,
    /// `SENSOR_INFLUENCE_RADIUS_KM`, `SENSOR_INTENSITY_PER_UNIT`.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Config`] if a variable is set but malformed or
    /// out of range.
    pub fn from_env() -> Result<Self, GridError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Config`] if a value is malformed or out of range.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, GridError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            bounds: defaults.bounds,
            resolution: parse_var(&lookup, "GRID_RESOLUTION")?.unwrap_or(defaults.resolution),
            calibration_annual_tonnes: parse_var(&lookup, "CALIBRATION_ANNUAL_TONNES")?
                .unwrap_or(defaults.calibration_annual_tonnes),
            influence_radius_km: parse_var(&lookup, "SENSOR_INFLUENCE_RADIUS_KM")?
                .unwrap_or(defaults.influence_radius_km),
            sensor_intensity_per_unit: parse_var(&lookup, "SENSOR_INTENSITY_PER_UNIT")?
                .unwrap_or(defaults.sensor_intensity_per_unit),
        };

        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Config`] naming the first offending setting.
    pub fn validate(&self) -> Result<(), GridError> {
        if !(self.calibration_annual_tonnes.is_finite() && self.calibration_annual_tonnes > 0.0) {
            return Err(config_error(
                "CALIBRATION_ANNUAL_TONNES",
                "must be a positive number",
            ));
        }
        if !(self.influence_radius_km.is_finite() && self.influence_radius_km > 0.0) {
            return Err(config_error(
                "SENSOR_INFLUENCE_RADIUS_KM",
                "must be a positive number",
            ));
        }
        if !(self.sensor_intensity_per_unit.is_finite() && self.sensor_intensity_per_unit >= 0.0) {
            return Err(config_error(
                "SENSOR_INTENSITY_PER_UNIT",
                "must be a non-negative number",
            ));
        }
        LatticeSpec::new(self.bounds, self.resolution)
            .map_err(|e| config_error("GRID_RESOLUTION", &e.to_string()))?;
        Ok(())
    }

    /// The lattice described by this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Shape`] if the resolution or bounds are invalid.
    pub fn lattice(&self) -> Result<LatticeSpec, GridError> {
        Ok(LatticeSpec::new(self.bounds, self.resolution)?)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, GridError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| config_error(key, &format!("'{raw}': {e}"))),
    }
}

fn config_error(key: &str, message: &str) -> GridError {
    GridError::Config {
        key: key.to_string(),
        message: message.to_string(),
    }
}
