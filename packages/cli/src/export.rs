//! `GeoJSON` export of grid cells.

use co2_map_grid_models::GeoCell;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};

/// Converts cells into a `FeatureCollection` of points carrying the cell
/// intensity as the `value` property.
#[must_use]
pub fn to_feature_collection(cells: &[GeoCell]) -> FeatureCollection {
    let features = cells
        .iter()
        .map(|cell| {
            let mut properties = JsonObject::new();
            properties.insert("value".to_string(), serde_json::Value::from(cell.value));
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(Value::Point(vec![cell.lon, cell.lat]))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
