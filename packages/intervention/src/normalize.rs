//! Normalization of raw directive payloads.
//!
//! Two input shapes are accepted.
//!
//! Canonical:
//!
//! ```json
//! {"target": "Manhattan", "magnitude": 50, "direction": "decrease"}
//! {"target": {"type": "radius", "lat": 40.64, "lon": -73.78, "radiusKm": 5,
//!             "falloff": "gaussian"},
//!  "magnitude": {"type": "absolute", "value": 12.5},
//!  "direction": "increase"}
//! {"directives": [ ... ]}
//! ```
//!
//! Modification list, as emitted by the prompt parser:
//!
//! ```json
//! {"is_unrelated": false,
//!  "geographic_modifications": [
//!    {"area": "JFK Airport", "lat": 40.6413, "lon": -73.7781,
//!     "change_percent": -25, "type": "hotspot", "radius_km": 5},
//!    {"area": "Manhattan", "change_percent": -15, "type": "borough"},
//!    {"area": "citywide_baseline", "change_percent": -5, "type": "baseline"}]}
//! ```
//!
//! Anything else is rejected with [`InterventionError::InvalidDirective`]
//! naming the field.

use co2_map_intervention_models::{
    Direction, Directive, Falloff, GeoTarget, InterventionPlan, MAX_ABSOLUTE_CHANGE,
    MAX_INCREASE_PERCENT, Magnitude,
};
use serde_json::{Map, Value};

use crate::InterventionError;

/// Radius used for a `hotspot` modification without `radius_km`.
pub const DEFAULT_HOTSPOT_RADIUS_KM: f64 = 5.0;

/// Normalizes a raw payload into a plan.
///
/// # Errors
///
/// Returns [`InterventionError::InvalidDirective`] if the payload matches
/// neither accepted shape or any directive in it is invalid.
pub fn normalize_plan(raw: &Value) -> Result<InterventionPlan, InterventionError> {
    let Some(obj) = raw.as_object() else {
        return Err(InterventionError::invalid("", "expected a JSON object"));
    };

    let unrelated = ["unrelated", "is_unrelated", "isUnrelated"]
        .iter()
        .any(|key| obj.get(*key).and_then(Value::as_bool) == Some(true));
    if unrelated {
        return Ok(InterventionPlan::unrelated());
    }

    if let Some(list) = obj.get("directives") {
        return normalize_list(list, "directives", normalize_canonical);
    }
    if let Some(list) = obj.get("geographic_modifications") {
        return normalize_list(list, "geographic_modifications", normalize_modification);
    }
    if obj.contains_key("change_percent") {
        return Ok(InterventionPlan::single(normalize_modification(obj, "")?));
    }

    Ok(InterventionPlan::single(normalize_canonical(obj, "")?))
}

/// Normalizes a single canonical directive.
///
/// # Errors
///
/// Returns [`InterventionError::InvalidDirective`] naming the offending
/// field.
pub fn normalize_directive(raw: &Value) -> Result<Directive, InterventionError> {
    let Some(obj) = raw.as_object() else {
        return Err(InterventionError::invalid("", "expected a JSON object"));
    };
    normalize_canonical(obj, "")
}

fn normalize_list(
    list: &Value,
    key: &str,
    each: fn(&Map<String, Value>, &str) -> Result<Directive, InterventionError>,
) -> Result<InterventionPlan, InterventionError> {
    let Some(items) = list.as_array() else {
        return Err(InterventionError::invalid(key, "expected an array"));
    };
    if items.is_empty() {
        return Err(InterventionError::invalid(
            key,
            "no directives given; mark the request unrelated instead",
        ));
    }

    let directives = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("{key}[{i}]");
            item.as_object()
                .ok_or_else(|| InterventionError::invalid(&path, "expected a JSON object"))
                .and_then(|obj| each(obj, &path))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(InterventionPlan {
        directives,
        unrelated: false,
    })
}

fn normalize_canonical(
    obj: &Map<String, Value>,
    path: &str,
) -> Result<Directive, InterventionError> {
    let target = match obj.get("target") {
        None | Some(Value::Null) => {
            return Err(InterventionError::invalid(field(path, "target"), "missing"));
        }
        Some(Value::String(name)) => region_target(name, &field(path, "target"))?,
        Some(Value::Object(target)) => parse_target(target, &field(path, "target"))?,
        Some(_) => {
            return Err(InterventionError::invalid(
                field(path, "target"),
                "expected a region name or a target object",
            ));
        }
    };

    let direction_field = field(path, "direction");
    let direction = match obj.get("direction") {
        Some(Value::String(s)) => s.trim().parse::<Direction>().map_err(|_| {
            InterventionError::invalid(
                &direction_field,
                format!("'{s}' is not 'increase' or 'decrease'"),
            )
        })?,
        None | Some(Value::Null) => {
            return Err(InterventionError::invalid(direction_field, "missing"));
        }
        Some(_) => {
            return Err(InterventionError::invalid(direction_field, "expected a string"));
        }
    };

    let magnitude_field = field(path, "magnitude");
    let magnitude = match obj.get("magnitude") {
        Some(Value::Number(_)) => Magnitude::Percent(number(obj, "magnitude", path)?),
        Some(Value::Object(m)) => {
            let kind = m.get("type").and_then(Value::as_str).unwrap_or("percent");
            let value = number(m, "value", &magnitude_field)?;
            match kind {
                "percent" => Magnitude::Percent(value),
                "absolute" => Magnitude::Absolute(value),
                other => {
                    return Err(InterventionError::invalid(
                        field(&magnitude_field, "type"),
                        format!("'{other}' is not 'percent' or 'absolute'"),
                    ));
                }
            }
        }
        None | Some(Value::Null) => {
            return Err(InterventionError::invalid(magnitude_field, "missing"));
        }
        Some(_) => {
            return Err(InterventionError::invalid(
                magnitude_field,
                "expected a number or a magnitude object",
            ));
        }
    };
    validate_magnitude(magnitude, direction, &magnitude_field)?;

    Ok(Directive {
        target,
        magnitude,
        direction,
    })
}

/// Legacy modification entry. `type: "baseline"` scales every cell of the
/// city, not only the low-intensity background cells.
fn normalize_modification(
    obj: &Map<String, Value>,
    path: &str,
) -> Result<Directive, InterventionError> {
    let change = number(obj, "change_percent", path)?;
    let direction = if change > 0.0 {
        Direction::Increase
    } else {
        Direction::Decrease
    };
    let magnitude = Magnitude::Percent(change.abs());
    validate_magnitude(magnitude, direction, &field(path, "change_percent"))?;

    let kind = obj.get("type").and_then(Value::as_str).unwrap_or("borough");
    let target = match kind {
        "borough" | "region" => {
            let area = obj
                .get("area")
                .and_then(Value::as_str)
                .ok_or_else(|| InterventionError::invalid(field(path, "area"), "missing"))?;
            region_target(area, &field(path, "area"))?
        }
        "hotspot" => {
            let radius_km = match obj.get("radius_km") {
                None | Some(Value::Null) => DEFAULT_HOTSPOT_RADIUS_KM,
                Some(_) => number(obj, "radius_km", path)?,
            };
            let target = GeoTarget::Radius {
                lat: number(obj, "lat", path)?,
                lon: number(obj, "lon", path)?,
                radius_km,
                falloff: Falloff::Gaussian,
            };
            validate_target(&target, path)?;
            target
        }
        "baseline" | "citywide" => GeoTarget::Region {
            name: "citywide".to_string(),
        },
        other => {
            return Err(InterventionError::invalid(
                field(path, "type"),
                format!("'{other}' is not 'borough', 'hotspot', or 'baseline'"),
            ));
        }
    };

    Ok(Directive {
        target,
        magnitude,
        direction,
    })
}

fn parse_target(obj: &Map<String, Value>, path: &str) -> Result<GeoTarget, InterventionError> {
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| InterventionError::invalid(field(path, "type"), "missing"))?;

    let target = match kind {
        "region" | "borough" => {
            let name = obj
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| InterventionError::invalid(field(path, "name"), "missing"))?;
            return region_target(name, &field(path, "name"));
        }
        "radius" => {
            let radius_key = if obj.contains_key("radiusKm") {
                "radiusKm"
            } else {
                "radius_km"
            };
            let falloff = match obj.get("falloff") {
                None | Some(Value::Null) => Falloff::Uniform,
                Some(Value::String(s)) => s.parse::<Falloff>().map_err(|_| {
                    InterventionError::invalid(
                        field(path, "falloff"),
                        format!("'{s}' is not 'uniform' or 'gaussian'"),
                    )
                })?,
                Some(_) => {
                    return Err(InterventionError::invalid(
                        field(path, "falloff"),
                        "expected a string",
                    ));
                }
            };
            GeoTarget::Radius {
                lat: number(obj, "lat", path)?,
                lon: number(obj, "lon", path)?,
                radius_km: number(obj, radius_key, path)?,
                falloff,
            }
        }
        "polygon" => GeoTarget::Polygon {
            coordinates: parse_ring(obj.get("coordinates"), &field(path, "coordinates"))?,
        },
        other => {
            return Err(InterventionError::invalid(
                field(path, "type"),
                format!("'{other}' is not 'region', 'radius', or 'polygon'"),
            ));
        }
    };

    validate_target(&target, path)?;
    Ok(target)
}

fn parse_ring(value: Option<&Value>, path: &str) -> Result<Vec<[f64; 2]>, InterventionError> {
    let items = value
        .and_then(Value::as_array)
        .ok_or_else(|| InterventionError::invalid(path, "expected an array of [lon, lat] pairs"))?;

    items
        .iter()
        .enumerate()
        .map(|(i, pair)| {
            let coords = pair.as_array().filter(|c| c.len() == 2).ok_or_else(|| {
                InterventionError::invalid(format!("{path}[{i}]"), "expected a [lon, lat] pair")
            })?;
            match (coords[0].as_f64(), coords[1].as_f64()) {
                (Some(lon), Some(lat)) => Ok([lon, lat]),
                _ => Err(InterventionError::invalid(
                    format!("{path}[{i}]"),
                    "coordinates must be numbers",
                )),
            }
        })
        .collect()
}

fn region_target(name: &str, path: &str) -> Result<GeoTarget, InterventionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(InterventionError::invalid(path, "region name is empty"));
    }
    Ok(GeoTarget::Region {
        name: name.to_string(),
    })
}

/// Range checks for a typed directive. Field paths are relative to `path`.
pub(crate) fn validate_directive(directive: &Directive, path: &str) -> Result<(), InterventionError> {
    validate_target(&directive.target, &field(path, "target"))?;
    validate_magnitude(
        directive.magnitude,
        directive.direction,
        &field(path, "magnitude"),
    )
}

/// Range checks for a target's numeric fields.
pub(crate) fn validate_target(target: &GeoTarget, path: &str) -> Result<(), InterventionError> {
    match target {
        GeoTarget::Region { .. } => Ok(()),
        GeoTarget::Radius {
            lat,
            lon,
            radius_km,
            ..
        } => {
            if !(lat.is_finite() && (-90.0..=90.0).contains(lat)) {
                return Err(InterventionError::invalid(
                    field(path, "lat"),
                    format!("{lat} is not a valid latitude"),
                ));
            }
            if !(lon.is_finite() && (-180.0..=180.0).contains(lon)) {
                return Err(InterventionError::invalid(
                    field(path, "lon"),
                    format!("{lon} is not a valid longitude"),
                ));
            }
            if !(radius_km.is_finite() && *radius_km > 0.0) {
                return Err(InterventionError::invalid(
                    field(path, "radiusKm"),
                    format!("{radius_km} is not a positive distance"),
                ));
            }
            Ok(())
        }
        GeoTarget::Polygon { coordinates } => {
            if coordinates.len() < 3 {
                return Err(InterventionError::invalid(
                    field(path, "coordinates"),
                    "a polygon needs at least 3 vertices",
                ));
            }
            if coordinates.iter().flatten().any(|c| !c.is_finite()) {
                return Err(InterventionError::invalid(
                    field(path, "coordinates"),
                    "coordinates must be finite",
                ));
            }
            Ok(())
        }
    }
}

pub(crate) fn validate_magnitude(
    magnitude: Magnitude,
    direction: Direction,
    path: &str,
) -> Result<(), InterventionError> {
    match magnitude {
        Magnitude::Percent(pct) => {
            let max = match direction {
                Direction::Decrease => 100.0,
                Direction::Increase => MAX_INCREASE_PERCENT,
            };
            if !pct.is_finite() || pct < 0.0 {
                return Err(InterventionError::invalid(
                    path,
                    format!("{pct}% is not a non-negative percentage; use 'direction' for the sign"),
                ));
            }
            if pct > max {
                return Err(InterventionError::invalid(
                    path,
                    format!("{pct}% {direction} exceeds the {max}% limit"),
                ));
            }
            Ok(())
        }
        Magnitude::Absolute(amount) => {
            if !amount.is_finite() || amount < 0.0 {
                return Err(InterventionError::invalid(
                    path,
                    format!("{amount} is not a non-negative amount; use 'direction' for the sign"),
                ));
            }
            if amount > MAX_ABSOLUTE_CHANGE {
                return Err(InterventionError::invalid(
                    path,
                    format!("{amount} exceeds the {MAX_ABSOLUTE_CHANGE} limit"),
                ));
            }
            Ok(())
        }
    }
}

fn number(obj: &Map<String, Value>, key: &str, path: &str) -> Result<f64, InterventionError> {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| InterventionError::invalid(field(path, key), "not representable")),
        None | Some(Value::Null) => Err(InterventionError::invalid(field(path, key), "missing")),
        Some(_) => Err(InterventionError::invalid(
            field(path, key),
            "expected a number",
        )),
    }
}

fn field(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}
