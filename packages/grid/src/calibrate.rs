//! Global calibration against a reference annual total.

use co2_map_geography_models::DAYS_PER_YEAR;

use crate::GridError;

/// Factor that rescales `values` so that
/// `sum(values) * cell_area_km2 * 365 == target_annual_tonnes`.
///
/// # Errors
///
/// Returns [`GridError::Computation`] if the raw total is zero, or the
/// resulting factor is not a finite positive number.
pub fn calibration_factor(
    values: &[f64],
    cell_area_km2: f64,
    target_annual_tonnes: f64,
) -> Result<f64, GridError> {
    if values.is_empty() {
        return Err(GridError::Computation {
            message: "cannot calibrate an empty grid".to_string(),
        });
    }

    let raw_annual = values.iter().sum::<f64>() * cell_area_km2 * DAYS_PER_YEAR;
    let factor = target_annual_tonnes / raw_annual;

    if !(raw_annual.is_finite() && raw_annual > 0.0 && factor.is_finite() && factor > 0.0) {
        return Err(GridError::Computation {
            message: format!(
                "calibration factor undefined (raw annual total {raw_annual}, target {target_annual_tonnes})"
            ),
        });
    }

    Ok(factor)
}

/// Clips negatives, rescales to the target total, and clips again.
///
/// Returns the factor that was applied.
///
/// # Errors
///
/// See [`calibration_factor`].
pub fn calibrate(
    values: &mut [f64],
    cell_area_km2: f64,
    target_annual_tonnes: f64,
) -> Result<f64, GridError> {
    clip_negative(values);
    let factor = calibration_factor(values, cell_area_km2, target_annual_tonnes)?;
    for v in values.iter_mut() {
        *v *= factor;
    }
    clip_negative(values);
    Ok(factor)
}

/// Replaces negative values (and negative zero) with zero.
pub fn clip_negative(values: &mut [f64]) {
    for v in values.iter_mut() {
        if *v <= 0.0 {
            *v = 0.0;
        }
    }
}
