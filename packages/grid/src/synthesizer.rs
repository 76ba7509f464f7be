//! Grid Synthesizer: lattice, synthetic model, sensor blend, calibration.

use co2_map_geography_models::GeoPoint;
use co2_map_grid_models::{BaselineSource, Grid, SensorObservation, Statistics};
use serde::Serialize;

use crate::{
    GridError,
    blend::{blend_point, usable_samples},
    calibrate::calibrate,
    config::EngineConfig,
    stats::aggregate,
    synthetic::SpatialModel,
};

/// A calibrated baseline grid and how it was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Baseline {
    /// The calibrated emission field.
    pub grid: Grid,
    /// Statistics over `grid`.
    pub statistics: Statistics,
    /// Whether sensor data contributed.
    pub source: BaselineSource,
    /// Number of observations that passed filtering.
    pub sensors_used: usize,
    /// Multiplier applied during calibration.
    pub calibration_factor: f64,
}

/// Builds baseline grids from a spatial model and a configuration.
pub struct GridSynthesizer<M: SpatialModel> {
    config: EngineConfig,
    model: M,
}

impl<M: SpatialModel> GridSynthesizer<M> {
    /// Creates a synthesizer.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Config`] if the configuration is invalid.
    pub fn new(config: EngineConfig, model: M) -> Result<Self, GridError> {
        config.validate()?;
        Ok(Self { config, model })
    }

    /// The configuration in use.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Synthesizes a calibrated baseline.
    ///
    /// An empty `observations` slice (sensor fetch failed or returned
    /// nothing) yields a synthetic-only baseline; it is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`GridError::Computation`] if calibration cannot produce a
    /// finite positive factor.
    pub fn synthesize_baseline(
        &self,
        observations: &[SensorObservation],
    ) -> Result<Baseline, GridError> {
        let spec = self.config.lattice()?;
        let cell_area = spec.cell_area_km2();

        log::info!(
            "Synthesizing baseline with model '{}': {} cells ({}x{}), cell area {cell_area:.4} km²",
            self.model.name(),
            spec.cell_count(),
            spec.resolution,
            spec.resolution,
        );

        let samples = usable_samples(
            observations,
            &self.config.bounds,
            self.config.sensor_intensity_per_unit,
        );
        if samples.len() < observations.len() {
            log::debug!(
                "Discarded {} of {} sensor observations (out of bounds or non-finite)",
                observations.len() - samples.len(),
                observations.len()
            );
        }

        let source = if samples.is_empty() {
            BaselineSource::SyntheticOnly
        } else {
            BaselineSource::Blended
        };

        let radius = self.config.influence_radius_km;
        let mut values: Vec<f64> = spec
            .points()
            .map(|(lat, lon)| {
                let base = self.model.intensity_at(lat, lon);
                blend_point(&GeoPoint::new(lat, lon), base, &samples, radius)
            })
            .collect();

        let factor = calibrate(&mut values, cell_area, self.config.calibration_annual_tonnes)?;
        log::debug!("Calibration factor {factor:.6}");

        let grid = Grid::from_values(spec, values)?;
        let statistics = aggregate(&grid);

        log::info!(
            "Baseline ready ({source}, {} sensors): {:.0} tonnes/year",
            samples.len(),
            statistics.annual_emissions_tonnes
        );

        Ok(Baseline {
            grid,
            statistics,
            source,
            sensors_used: samples.len(),
            calibration_factor: factor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::NycEmissionModel;
    use co2_map_geography::RegionTable;
    use co2_map_geography_models::{DAYS_PER_YEAR, NYC_BOUNDS};

    fn observation(lat: f64, lon: f64, value: f64) -> SensorObservation {
        SensorObservation {
            station_id: format!("{lat},{lon}"),
            location: None,
            lat,
            lon,
            value,
            unit: "µg/m³".to_string(),
            timestamp: None,
        }
    }

    fn config(resolution: usize) -> EngineConfig {
        EngineConfig {
            resolution,
            ..EngineConfig::default()
        }
    }

    fn assert_calibrated(baseline: &Baseline, target: f64) {
        let sum: f64 = baseline.grid.values().sum();
        let annual = sum * baseline.grid.cell_area_km2() * DAYS_PER_YEAR;
        assert!((annual - target).abs() / target < 1e-3, "annual {annual}");
        assert!(
            (baseline.statistics.annual_emissions_tonnes - target).abs() / target < 1e-3,
            "statistics {}",
            baseline.statistics.annual_emissions_tonnes
        );
    }

    #[test]
    fn calibrated_without_sensors() {
        let regions = RegionTable::nyc().unwrap();
        let synth = GridSynthesizer::new(config(22), NycEmissionModel::new(&regions)).unwrap();
        let baseline = synth.synthesize_baseline(&[]).unwrap();

        assert_eq!(baseline.grid.len(), 484);
        assert_eq!(baseline.source, BaselineSource::SyntheticOnly);
        assert_eq!(baseline.sensors_used, 0);
        assert_calibrated(&baseline, 55_000_000.0);
    }

    #[test]
    fn calibrated_with_sensors() {
        let regions = RegionTable::nyc().unwrap();
        let synth = GridSynthesizer::new(config(22), NycEmissionModel::new(&regions)).unwrap();
        let observations = vec![
            observation(40.758, -73.9855, 35.0),
            observation(40.6782, -73.9442, 8.0),
            observation(41.2, -73.5, 50.0),
        ];
        let baseline = synth.synthesize_baseline(&observations).unwrap();

        assert_eq!(baseline.source, BaselineSource::Blended);
        assert_eq!(baseline.sensors_used, 2);
        assert_calibrated(&baseline, 55_000_000.0);
    }

    #[test]
    fn sensors_only_change_cells_in_range() {
        let regions = RegionTable::nyc().unwrap();
        let synth = GridSynthesizer::new(config(22), NycEmissionModel::new(&regions)).unwrap();
        let plain = synth.synthesize_baseline(&[]).unwrap();
        let sensor = GeoPoint::new(40.6, -74.15);
        let blended = synth
            .synthesize_baseline(&[observation(sensor.lat, sensor.lon, 500.0)])
            .unwrap();

        // Outside the influence radius the shape is unchanged up to the
        // global calibration factor.
        let ratio = blended.calibration_factor / plain.calibration_factor;
        for (a, b) in plain.grid.cells().iter().zip(blended.grid.cells()) {
            let d = sensor.distance_km(&GeoPoint::new(a.lat, a.lon));
            if d > 3.0 {
                assert!((b.value - a.value * ratio).abs() <= 1e-9 * a.value.max(1.0));
            }
        }
    }

    #[test]
    fn non_negative_and_within_bounds() {
        let regions = RegionTable::nyc().unwrap();
        let synth = GridSynthesizer::new(config(22), NycEmissionModel::new(&regions)).unwrap();
        let baseline = synth
            .synthesize_baseline(&[observation(40.7, -73.9, -40.0)])
            .unwrap();
        for cell in baseline.grid.cells() {
            assert!(cell.value >= 0.0 && cell.value.is_finite());
            assert!(NYC_BOUNDS.contains(cell.lat, cell.lon));
        }
    }

    #[test]
    fn deterministic_for_identical_input() {
        let regions = RegionTable::nyc().unwrap();
        let synth = GridSynthesizer::new(config(22), NycEmissionModel::new(&regions)).unwrap();
        let observations = vec![observation(40.72, -73.99, 14.0)];
        let a = synth.synthesize_baseline(&observations).unwrap();
        let b = synth.synthesize_baseline(&observations).unwrap();
        assert!(
            a.grid
                .values()
                .zip(b.grid.values())
                .all(|(x, y)| x.to_bits() == y.to_bits())
        );
    }

    #[test]
    fn default_resolution_calibrates() {
        let regions = RegionTable::nyc().unwrap();
        let synth =
            GridSynthesizer::new(EngineConfig::default(), NycEmissionModel::new(&regions)).unwrap();
        let baseline = synth.synthesize_baseline(&[]).unwrap();
        assert_eq!(baseline.grid.len(), 48 * 48);
        assert_calibrated(&baseline, 55_000_000.0);
    }
}
