//! Inverse-distance blending of sensor observations into the synthetic
//! field.

use co2_map_geography_models::{BoundingBox, GeoPoint};
use co2_map_grid_models::SensorObservation;

/// Distances below this are treated as this, so an observation sitting
/// on a lattice point does not produce an infinite weight.
pub const MIN_DISTANCE_KM: f64 = 0.1;

/// An observation converted to an intensity estimate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntensitySample {
    /// Where the sample was taken.
    pub point: GeoPoint,
    /// Estimated intensity in tonnes CO₂/km²/day.
    pub intensity: f64,
}

/// Converts raw observations into intensity samples.
///
/// Observations with non-finite coordinates or values, or lying outside
/// `bounds`, are dropped. Negative readings count as zero.
#[must_use]
pub fn usable_samples(
    observations: &[SensorObservation],
    bounds: &BoundingBox,
    intensity_per_unit: f64,
) -> Vec<IntensitySample> {
    observations
        .iter()
        .filter(|o| o.lat.is_finite() && o.lon.is_finite() && o.value.is_finite())
        .filter(|o| bounds.contains(o.lat, o.lon))
        .map(|o| IntensitySample {
            point: GeoPoint::new(o.lat, o.lon),
            intensity: o.value.max(0.0) * intensity_per_unit,
        })
        .collect()
}

/// Blends samples within `radius_km` of `point` with the synthetic value.
///
/// The synthetic value acts as a pseudo-observation with weight
/// `1 / radius²`; each sample in range has weight `1 / max(d, 0.1)²`.
/// Returns `base` unchanged when no sample is in range.
#[must_use]
pub fn blend_point(point: &GeoPoint, base: f64, samples: &[IntensitySample], radius_km: f64) -> f64 {
    let base_weight = 1.0 / (radius_km * radius_km);
    let mut weight_sum = base_weight;
    let mut weighted = base_weight * base;
    let mut in_range = false;

    for sample in samples {
        let d = point.distance_km(&sample.point);
        if d > radius_km {
            continue;
        }
        let d = d.max(MIN_DISTANCE_KM);
        let w = 1.0 / (d * d);
        weight_sum += w;
        weighted += w * sample.intensity;
        in_range = true;
    }

    if in_range { weighted / weight_sum } else { base }
}
