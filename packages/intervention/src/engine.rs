//! Applies directives to a grid and reports before/after statistics.

use co2_map_geography::RegionTable;
use co2_map_grid::stats::aggregate;
use co2_map_grid_models::Grid;
use co2_map_intervention_models::{
    Direction, Directive, InterventionPlan, InterventionStatistics, Magnitude,
};

use crate::{InterventionError, normalize::validate_directive, predicate::CellPredicate};

/// Applies a single directive.
///
/// # Errors
///
/// Returns [`InterventionError::InvalidDirective`] if the directive is out
/// of range or its target cannot be resolved, or [`InterventionError::Computation`] if the result is not
/// finite.
pub fn apply_intervention(
    grid: &Grid,
    directive: &Directive,
    regions: &RegionTable,
) -> Result<(Grid, InterventionStatistics), InterventionError> {
    apply_plan(grid, &InterventionPlan::single(directive.clone()), regions)
}

/// Checks every directive of `plan` and resolves its target without
/// touching any grid.
///
/// # Errors
///
/// Returns [`InterventionError::InvalidDirective`] for the first directive
/// that is out of range or names an unknown region.
pub fn validate_plan(plan: &InterventionPlan, regions: &RegionTable) -> Result<(), InterventionError> {
    compile_plan(plan, regions).map(|_| ())
}

fn compile_plan<'a>(
    plan: &InterventionPlan,
    regions: &'a RegionTable,
) -> Result<Vec<CellPredicate<'a>>, InterventionError> {
    let indexed = plan.directives.len() > 1;
    plan.directives
        .iter()
        .enumerate()
        .map(|(i, d)| {
            validate_directive(d, "")
                .and_then(|()| CellPredicate::compile(&d.target, regions))
                .map_err(|e| match e {
                    InterventionError::InvalidDirective { field, message } if indexed => {
                        InterventionError::InvalidDirective {
                            field: format!("directives[{i}].{field}"),
                            message,
                        }
                    }
                    other => other,
                })
        })
        .collect()
}

/// Applies every directive of `plan` in order and compares the final grid
/// with the input.
///
/// All directives are range-checked and their targets resolved before any
/// cell is touched, so an invalid directive anywhere in the plan rejects
/// the whole request.
///
/// # Errors
///
/// See [`apply_intervention`].
pub fn apply_plan(
    grid: &Grid,
    plan: &InterventionPlan,
    regions: &RegionTable,
) -> Result<(Grid, InterventionStatistics), InterventionError> {
    let predicates = compile_plan(plan, regions)?;

    if plan.unrelated {
        log::info!("Unrelated request, returning the grid unchanged");
    }

    let mut modified = grid.clone();
    for (directive, predicate) in plan.directives.iter().zip(&predicates) {
        let mut touched = 0_usize;
        modified = modified.map_values(|cell| match predicate.weight(cell.lat, cell.lon) {
            Some(weight) => {
                touched += 1;
                adjust(cell.value, directive, weight)
            }
            None => cell.value,
        });
        log::info!(
            "Applied {} {:?} to {} ({touched} cells)",
            directive.direction,
            directive.magnitude,
            directive.target.label(),
        );
    }

    let statistics = compare(grid, &modified, plan)?;
    Ok((modified, statistics))
}

/// New value for a cell inside the predicate, clipped at zero.
fn adjust(value: f64, directive: &Directive, weight: f64) -> f64 {
    let sign = match directive.direction {
        Direction::Increase => 1.0,
        Direction::Decrease => -1.0,
    };
    let new = match directive.magnitude {
        Magnitude::Percent(pct) => value * (1.0 + sign * pct / 100.0 * weight),
        Magnitude::Absolute(amount) => value + sign * amount * weight,
    };
    if new > 0.0 { new } else { 0.0 }
}

fn compare(
    baseline: &Grid,
    modified: &Grid,
    plan: &InterventionPlan,
) -> Result<InterventionStatistics, InterventionError> {
    debug_assert!(baseline.same_geometry(modified));
    let before = aggregate(baseline);
    let after = aggregate(modified);

    if !after.annual_emissions_tonnes.is_finite() {
        return Err(InterventionError::Computation {
            message: "modified grid total is not finite".to_string(),
        });
    }

    let baseline_tons = before.annual_emissions_tonnes;
    let modified_tons = after.annual_emissions_tonnes;
    let savings = baseline_tons - modified_tons;
    let percentage_reduction = if baseline_tons > 0.0 {
        savings / baseline_tons * 100.0
    } else {
        0.0
    };
    let is_increase = modified_tons > baseline_tons;

    let cells_affected = baseline
        .values()
        .zip(modified.values())
        .filter(|(a, b)| a.to_bits() != b.to_bits())
        .count();

    let nominal_percent = match plan.directives.as_slice() {
        [only] => only.nominal_percent(),
        _ => None,
    };

    Ok(InterventionStatistics {
        baseline: before,
        modified: after,
        baseline_tons_co2: baseline_tons,
        reduced_tons_co2: modified_tons,
        annual_savings_tons_co2: savings,
        percentage_reduction,
        nominal_percent,
        direction: if is_increase {
            Direction::Increase
        } else {
            Direction::Decrease
        },
        is_increase,
        cells_affected,
        is_unrelated: plan.unrelated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use co2_map_geography_models::NYC_BOUNDS;
    use co2_map_grid_models::LatticeSpec;
    use co2_map_intervention_models::{Falloff, GeoTarget};

    fn baseline(regions: &RegionTable) -> Grid {
        let spec = LatticeSpec::new(NYC_BOUNDS, 22).unwrap();
        let values = spec
            .points()
            .map(|(lat, lon)| {
                if regions.in_city(lat, lon) {
                    100.0 + (lat - 40.49) * 50.0
                } else {
                    5.0
                }
            })
            .collect();
        Grid::from_values(spec, values).unwrap()
    }

    fn region(name: &str, magnitude: Magnitude, direction: Direction) -> Directive {
        Directive {
            target: GeoTarget::Region {
                name: name.to_string(),
            },
            magnitude,
            direction,
        }
    }

    #[test]
    fn manhattan_half_reduction() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let manhattan = regions.get("Manhattan").unwrap();
        let directive = region("Manhattan", Magnitude::Percent(50.0), Direction::Decrease);

        let (modified, stats) = apply_intervention(&grid, &directive, &regions).unwrap();

        assert!(grid.same_geometry(&modified));
        let mut inside = 0;
        for (before, after) in grid.cells().iter().zip(modified.cells()) {
            if manhattan.contains(before.lat, before.lon) {
                inside += 1;
                assert!((after.value - before.value * 0.5).abs() < 1e-12);
            } else {
                assert_eq!(before.value.to_bits(), after.value.to_bits());
            }
        }
        assert_eq!(inside, 13);
        assert_eq!(stats.cells_affected, 13);
        assert!(stats.percentage_reduction > 0.0 && stats.percentage_reduction < 50.0);
        assert_eq!(stats.nominal_percent, Some(50.0));
        assert!(!stats.is_increase);
        assert!(
            (stats.annual_savings_tons_co2 - (stats.baseline_tons_co2 - stats.reduced_tons_co2))
                .abs()
                < 1e-6
        );
    }

    #[test]
    fn zero_magnitude_is_identity() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        for magnitude in [Magnitude::Percent(0.0), Magnitude::Absolute(0.0)] {
            let directive = region("citywide", magnitude, Direction::Decrease);
            let (modified, stats) = apply_intervention(&grid, &directive, &regions).unwrap();
            assert_eq!(modified, grid);
            assert!(stats.percentage_reduction.abs() < f64::EPSILON);
            assert_eq!(stats.cells_affected, 0);
        }
    }

    #[test]
    fn target_with_no_cells_is_not_an_error() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let directive = Directive {
            target: GeoTarget::Radius {
                lat: 41.5,
                lon: -72.0,
                radius_km: 1.0,
                falloff: Falloff::Uniform,
            },
            magnitude: Magnitude::Percent(80.0),
            direction: Direction::Decrease,
        };
        let (modified, stats) = apply_intervention(&grid, &directive, &regions).unwrap();
        assert_eq!(modified, grid);
        assert!(stats.percentage_reduction.abs() < f64::EPSILON);
    }

    #[test]
    fn absolute_decrease_clips_at_zero() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let directive = region("Bronx", Magnitude::Absolute(10_000.0), Direction::Decrease);
        let (modified, stats) = apply_intervention(&grid, &directive, &regions).unwrap();

        let bronx = regions.get("Bronx").unwrap();
        for cell in modified.cells() {
            assert!(cell.value >= 0.0);
            if bronx.contains(cell.lat, cell.lon) {
                assert_eq!(cell.value.to_bits(), 0.0_f64.to_bits());
            }
        }
        // Realized reduction reflects the clipped values, not the request.
        let removed: f64 = grid
            .cells()
            .iter()
            .filter(|c| bronx.contains(c.lat, c.lon))
            .map(|c| c.value)
            .sum::<f64>()
            * grid.cell_area_km2()
            * 365.0;
        assert!((stats.annual_savings_tons_co2 - removed).abs() / removed < 1e-9);
        assert_eq!(stats.nominal_percent, None);
    }

    #[test]
    fn increase_is_reported_as_negative_reduction() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let directive = region("Queens", Magnitude::Percent(20.0), Direction::Increase);
        let (_, stats) = apply_intervention(&grid, &directive, &regions).unwrap();
        assert!(stats.is_increase);
        assert_eq!(stats.direction, Direction::Increase);
        assert!(stats.percentage_reduction < 0.0);
        assert_eq!(stats.nominal_percent, Some(-20.0));
    }

    #[test]
    fn deterministic_output() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let directive = Directive {
            target: GeoTarget::Radius {
                lat: 40.6413,
                lon: -73.7781,
                radius_km: 5.0,
                falloff: Falloff::Gaussian,
            },
            magnitude: Magnitude::Percent(25.0),
            direction: Direction::Decrease,
        };
        let a = apply_intervention(&grid, &directive, &regions).unwrap();
        let b = apply_intervention(&grid, &directive, &regions).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn plan_applies_in_sequence() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let plan = InterventionPlan {
            directives: vec![
                region("Brooklyn", Magnitude::Percent(50.0), Direction::Decrease),
                region("Brooklyn", Magnitude::Percent(50.0), Direction::Decrease),
            ],
            unrelated: false,
        };
        let (modified, stats) = apply_plan(&grid, &plan, &regions).unwrap();
        let brooklyn = regions.get("Brooklyn").unwrap();
        for (before, after) in grid.cells().iter().zip(modified.cells()) {
            if brooklyn.contains(before.lat, before.lon) {
                assert!((after.value - before.value * 0.25).abs() < 1e-12);
            }
        }
        assert_eq!(stats.nominal_percent, None);
    }

    #[test]
    fn unknown_region_rejects_whole_plan() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let plan = InterventionPlan {
            directives: vec![
                region("Brooklyn", Magnitude::Percent(10.0), Direction::Decrease),
                region("Hoboken", Magnitude::Percent(10.0), Direction::Decrease),
            ],
            unrelated: false,
        };
        let err = apply_plan(&grid, &plan, &regions).unwrap_err();
        assert_eq!(err.field(), Some("directives[1].target.name"));
    }

    #[test]
    fn unrelated_plan_is_noop() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let (modified, stats) = apply_plan(&grid, &InterventionPlan::unrelated(), &regions).unwrap();
        assert_eq!(modified, grid);
        assert!(stats.is_unrelated);
        assert!(stats.percentage_reduction.abs() < f64::EPSILON);
    }

    fn radius(lat: f64, lon: f64, radius_km: f64, magnitude: Magnitude) -> Directive {
        Directive {
            target: GeoTarget::Radius {
                lat,
                lon,
                radius_km,
                falloff: Falloff::Uniform,
            },
            magnitude,
            direction: Direction::Decrease,
        }
    }

    #[test]
    fn out_of_range_typed_directives_are_rejected() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let cases = [
            (
                region("Manhattan", Magnitude::Percent(f64::NAN), Direction::Decrease),
                "magnitude",
            ),
            (
                region("Manhattan", Magnitude::Percent(-80.0), Direction::Decrease),
                "magnitude",
            ),
            (
                region("Manhattan", Magnitude::Percent(500.0), Direction::Decrease),
                "magnitude",
            ),
            (
                region("Queens", Magnitude::Absolute(-1.0), Direction::Increase),
                "magnitude",
            ),
            (
                region("Queens", Magnitude::Absolute(f64::INFINITY), Direction::Increase),
                "magnitude",
            ),
            (
                radius(40.7, -73.9, f64::NAN, Magnitude::Percent(50.0)),
                "target.radiusKm",
            ),
            (
                radius(40.7, -73.9, 0.0, Magnitude::Percent(50.0)),
                "target.radiusKm",
            ),
            (
                radius(40.7, -73.9, -3.0, Magnitude::Percent(50.0)),
                "target.radiusKm",
            ),
            (
                radius(f64::NAN, -73.9, 3.0, Magnitude::Percent(50.0)),
                "target.lat",
            ),
        ];
        for (directive, expected) in cases {
            let err = apply_intervention(&grid, &directive, &regions).unwrap_err();
            assert_eq!(err.field(), Some(expected), "{directive:?}");
        }
    }

    #[test]
    fn invalid_magnitude_in_plan_is_indexed() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let plan = InterventionPlan {
            directives: vec![
                region("Brooklyn", Magnitude::Percent(10.0), Direction::Decrease),
                region("Bronx", Magnitude::Percent(f64::NAN), Direction::Decrease),
            ],
            unrelated: false,
        };
        let err = apply_plan(&grid, &plan, &regions).unwrap_err();
        assert_eq!(err.field(), Some("directives[1].magnitude"));
        assert!(validate_plan(&plan, &regions).is_err());
    }

    #[test]
    fn polygon_with_too_few_vertices_is_rejected() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let directive = Directive {
            target: GeoTarget::Polygon {
                coordinates: vec![[-74.0, 40.7], [-73.9, 40.8]],
            },
            magnitude: Magnitude::Percent(10.0),
            direction: Direction::Decrease,
        };
        let err = apply_intervention(&grid, &directive, &regions).unwrap_err();
        assert_eq!(err.field(), Some("target.coordinates"));
    }

    fn assert_outside_untouched(grid: &Grid, directive: &Directive, regions: &RegionTable) {
        let predicate = CellPredicate::compile(&directive.target, regions).unwrap();
        let (modified, stats) = apply_intervention(grid, directive, regions).unwrap();
        let mut inside = 0;
        for (before, after) in grid.cells().iter().zip(modified.cells()) {
            if predicate.weight(before.lat, before.lon).is_none() {
                assert_eq!(before.value.to_bits(), after.value.to_bits());
            } else {
                inside += 1;
                assert!(after.value < before.value);
            }
        }
        assert!(inside > 0);
        assert_eq!(stats.cells_affected, inside);
    }

    #[test]
    fn radius_target_leaves_outside_cells_bit_identical() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let directive = radius(40.75, -73.95, 6.0, Magnitude::Percent(30.0));
        assert_outside_untouched(&grid, &directive, &regions);
    }

    #[test]
    fn polygon_target_leaves_outside_cells_bit_identical() {
        let regions = RegionTable::nyc().unwrap();
        let grid = baseline(&regions);
        let directive = Directive {
            target: GeoTarget::Polygon {
                coordinates: vec![
                    [-74.02, 40.60],
                    [-73.85, 40.60],
                    [-73.85, 40.72],
                    [-74.02, 40.72],
                    [-74.02, 40.60],
                ],
            },
            magnitude: Magnitude::Absolute(20.0),
            direction: Direction::Decrease,
        };
        assert_outside_untouched(&grid, &directive, &regions);
    }
}
