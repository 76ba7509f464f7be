//! Containment predicates for directive targets.

use co2_map_geography::{GeographyError, RegionSelector, RegionTable};
use co2_map_geography_models::GeoPoint;
use co2_map_intervention_models::{Falloff, GeoTarget};
use geo::{Contains, LineString, Point, Polygon};

use crate::InterventionError;

/// A compiled geographic target.
///
/// Every lattice point is either inside (with an effect weight in
/// `(0, 1]`) or outside.
pub enum CellPredicate<'a> {
    /// Membership in a named region or the whole city.
    Region(RegionSelector<'a>),
    /// Within a distance of a centre point.
    Radius {
        /// Centre.
        center: GeoPoint,
        /// Radius in km.
        radius_km: f64,
        /// Decay inside the radius.
        falloff: Falloff,
    },
    /// Inside an arbitrary polygon.
    Polygon(Polygon<f64>),
}

impl<'a> CellPredicate<'a> {
    /// Compiles a target, resolving region names against `regions`.
    ///
    /// # Errors
    ///
    /// Returns [`InterventionError::InvalidDirective`] on `target.name` if
    /// the region is unknown.
    pub fn compile(target: &GeoTarget, regions: &'a RegionTable) -> Result<Self, InterventionError> {
        Ok(match target {
            GeoTarget::Region { name } => match regions.resolve(name) {
                Ok(selector) => Self::Region(selector),
                Err(GeographyError::UnknownRegion { name }) => {
                    let known = regions
                        .regions()
                        .iter()
                        .map(co2_map_geography::Region::name)
                        .collect::<Vec<_>>()
                        .join(", ");
                    return Err(InterventionError::invalid(
                        "target.name",
                        format!("unknown region '{name}' (known: {known}, citywide)"),
                    ));
                }
                Err(e) => {
                    return Err(InterventionError::invalid("target.name", e.to_string()));
                }
            },
            GeoTarget::Radius {
                lat,
                lon,
                radius_km,
                falloff,
            } => Self::Radius {
                center: GeoPoint::new(*lat, *lon),
                radius_km: *radius_km,
                falloff: *falloff,
            },
            GeoTarget::Polygon { coordinates } => Self::Polygon(Polygon::new(
                LineString::from(
                    coordinates
                        .iter()
                        .map(|[lon, lat]| (*lon, *lat))
                        .collect::<Vec<_>>(),
                ),
                vec![],
            )),
        })
    }

    /// Effect weight at a point, or `None` if the point is outside.
    #[must_use]
    pub fn weight(&self, lat: f64, lon: f64) -> Option<f64> {
        match self {
            Self::Region(selector) => selector.contains(lat, lon).then_some(1.0),
            Self::Radius {
                center,
                radius_km,
                falloff,
            } => {
                let d = center.distance_km(&GeoPoint::new(lat, lon));
                if d > *radius_km {
                    return None;
                }
                Some(match falloff {
                    Falloff::Uniform => 1.0,
                    Falloff::Gaussian => {
                        let sigma = radius_km / 2.0;
                        (-(d * d) / (2.0 * sigma * sigma)).exp()
                    }
                })
            }
            Self::Polygon(polygon) => polygon.contains(&Point::new(lon, lat)).then_some(1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_membership() {
        let regions = RegionTable::nyc().unwrap();
        let target = GeoTarget::Region {
            name: "manhattan".to_string(),
        };
        let predicate = CellPredicate::compile(&target, &regions).unwrap();
        assert_eq!(predicate.weight(40.758, -73.9855), Some(1.0));
        assert_eq!(predicate.weight(40.6782, -73.9442), None);
    }

    #[test]
    fn unknown_region_names_field() {
        let regions = RegionTable::nyc().unwrap();
        let target = GeoTarget::Region {
            name: "Atlantis".to_string(),
        };
        let Err(err) = CellPredicate::compile(&target, &regions) else {
            panic!("expected an error");
        };
        assert_eq!(err.field(), Some("target.name"));
    }

    #[test]
    fn gaussian_radius_decays() {
        let regions = RegionTable::nyc().unwrap();
        let target = GeoTarget::Radius {
            lat: 40.7,
            lon: -73.9,
            radius_km: 4.0,
            falloff: Falloff::Gaussian,
        };
        let predicate = CellPredicate::compile(&target, &regions).unwrap();
        let center = predicate.weight(40.7, -73.9).unwrap();
        let edge = predicate.weight(40.7 + 3.9 / 111.0, -73.9).unwrap();
        assert!((center - 1.0).abs() < 1e-12);
        assert!(edge < 0.2 && edge > 0.0, "edge weight {edge}");
        assert_eq!(predicate.weight(40.8, -73.9), None);
    }

    #[test]
    fn polygon_containment() {
        let regions = RegionTable::nyc().unwrap();
        let target = GeoTarget::Polygon {
            coordinates: vec![[-74.0, 40.7], [-73.9, 40.7], [-73.9, 40.8], [-74.0, 40.8]],
        };
        let predicate = CellPredicate::compile(&target, &regions).unwrap();
        assert_eq!(predicate.weight(40.75, -73.95), Some(1.0));
        assert_eq!(predicate.weight(40.65, -73.95), None);
    }
}
