//! Statistics Aggregator.
//!
//! The one routine both the baseline and intervention paths use to turn a
//! grid into totals. Pure, and safe on empty input.

use co2_map_geography::RegionTable;
use co2_map_grid_models::{GeoCell, Grid, RegionStatistics, Statistics};

/// Statistics over every cell of `grid`.
#[must_use]
pub fn aggregate(grid: &Grid) -> Statistics {
    aggregate_cells(grid.cells(), grid.cell_area_km2())
}

/// Statistics over an arbitrary cell set with a fixed per-cell area.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn aggregate_cells<'a, I>(cells: I, cell_area_km2: f64) -> Statistics
where
    I: IntoIterator<Item = &'a GeoCell>,
{
    let (count, total_intensity) = cells
        .into_iter()
        .fold((0_usize, 0.0_f64), |(n, sum), cell| (n + 1, sum + cell.value));

    if count == 0 {
        return Statistics::empty(cell_area_km2);
    }

    let total_emissions_per_day = total_intensity * cell_area_km2;

    Statistics {
        num_points: count,
        cell_area_km2,
        coverage_area_km2: count as f64 * cell_area_km2,
        total_intensity,
        average_intensity: total_intensity / count as f64,
        total_emissions_per_day,
        annual_emissions_tonnes: Statistics::annualize(total_emissions_per_day),
    }
}

/// Statistics per named region, in region table order.
///
/// A cell belongs to a region when its lattice point lies inside that
/// region's outline. Cells outside every outline are not reported.
#[must_use]
pub fn aggregate_by_region(grid: &Grid, regions: &RegionTable) -> Vec<RegionStatistics> {
    let area = grid.cell_area_km2();
    regions
        .regions()
        .iter()
        .map(|region| RegionStatistics {
            region: region.name().to_string(),
            statistics: aggregate_cells(
                grid.cells().iter().filter(|c| region.contains(c.lat, c.lon)),
                area,
            ),
        })
        .collect()
}
