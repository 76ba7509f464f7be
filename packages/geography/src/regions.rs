//! Region-to-geometry table with R-tree backed point lookups.
//!
//! The NYC table is embedded from `regions/nyc.toml` via [`include_str!`].
//! Each entry carries a `GeoJSON` polygon which is converted to a
//! [`MultiPolygon`] once at load time.

use co2_map_geography_models::Borough;
use geo::{BoundingRect, Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use serde::Deserialize;

use crate::GeographyError;

/// Embedded NYC borough outlines.
const NYC_REGIONS_TOML: &str = include_str!("../regions/nyc.toml");

/// Names that select the whole city rather than a single region.
const CITYWIDE_NAMES: &[&str] = &["citywide", "all", "nyc", "new york city", "city"];

#[derive(Debug, Deserialize)]
struct RegionTableFile {
    name: String,
    regions: Vec<RegionDefinition>,
}

#[derive(Debug, Deserialize)]
struct RegionDefinition {
    name: String,
    #[serde(default)]
    aliases: Vec<String>,
    geometry: String,
}

/// A named region with its outline.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    aliases: Vec<String>,
    borough: Option<Borough>,
    polygon: MultiPolygon<f64>,
}

impl Region {
    /// Display name of the region (e.g. `"Manhattan"`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The borough this region corresponds to, if any.
    #[must_use]
    pub const fn borough(&self) -> Option<Borough> {
        self.borough
    }

    /// The region outline.
    #[must_use]
    pub const fn polygon(&self) -> &MultiPolygon<f64> {
        &self.polygon
    }

    /// Strict point-in-polygon test. Points exactly on the outline are
    /// outside.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        self.polygon.contains(&geo::Point::new(lon, lat))
    }

    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// Envelope of one region, pointing back into [`RegionTable::regions`].
struct RegionEnvelope {
    index: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for RegionEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Static table mapping region names to outlines.
///
/// Built once at startup and shared read-only across requests.
pub struct RegionTable {
    name: String,
    regions: Vec<Region>,
    index: RTree<RegionEnvelope>,
}

impl std::fmt::Debug for RegionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionTable")
            .field("name", &self.name)
            .field("regions", &self.regions.len())
            .finish()
    }
}

/// What a region name resolved to.
#[derive(Debug, Clone, Copy)]
pub enum RegionSelector<'a> {
    /// Every region in the table.
    Citywide(&'a RegionTable),
    /// A single region.
    Region(&'a Region),
}

impl RegionSelector<'_> {
    /// Whether the point lies inside the selection.
    #[must_use]
    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        match self {
            Self::Citywide(table) => table.in_city(lat, lon),
            Self::Region(region) => region.contains(lat, lon),
        }
    }

    /// Display name of the selection.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Citywide(table) => table.name(),
            Self::Region(region) => region.name(),
        }
    }
}

impl RegionTable {
    /// Loads the embedded New York City borough table.
    ///
    /// # Errors
    ///
    /// Returns [`GeographyError::RegionTable`] if the embedded TOML or any
    /// of its geometries fail to parse.
    pub fn nyc() -> Result<Self, GeographyError> {
        Self::from_toml("nyc", NYC_REGIONS_TOML)
    }

    /// Parses a region table from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`GeographyError::RegionTable`] if the TOML is malformed, a
    /// geometry is not a `Polygon`/`MultiPolygon`, or two regions share a
    /// name.
    pub fn from_toml(table_id: &str, toml_str: &str) -> Result<Self, GeographyError> {
        let file: RegionTableFile =
            toml::de::from_str(toml_str).map_err(|e| GeographyError::RegionTable {
                name: table_id.to_string(),
                message: e.to_string(),
            })?;

        let mut regions: Vec<Region> = Vec::with_capacity(file.regions.len());

        for def in file.regions {
            if regions.iter().any(|r| r.matches(&def.name)) {
                return Err(GeographyError::RegionTable {
                    name: table_id.to_string(),
                    message: format!("duplicate region '{}'", def.name),
                });
            }

            let polygon = parse_geojson_to_multipolygon(&def.geometry).ok_or_else(|| {
                GeographyError::RegionTable {
                    name: table_id.to_string(),
                    message: format!("region '{}' has no usable polygon geometry", def.name),
                }
            })?;

            let borough = def.name.parse::<Borough>().ok();

            regions.push(Region {
                name: def.name,
                aliases: def.aliases,
                borough,
                polygon,
            });
        }

        let index = RTree::bulk_load(
            regions
                .iter()
                .enumerate()
                .map(|(index, region)| RegionEnvelope {
                    index,
                    envelope: compute_envelope(&region.polygon),
                })
                .collect(),
        );

        log::debug!("Loaded {} regions from table '{table_id}'", regions.len());

        Ok(Self {
            name: file.name,
            regions,
            index,
        })
    }

    /// Display name of the table (e.g. `"New York City"`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All regions in table order.
    #[must_use]
    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    /// Case-insensitive lookup by name or alias.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Region> {
        let name = name.trim();
        self.regions.iter().find(|r| r.matches(name))
    }

    /// Resolves a region name, including the citywide names (`"citywide"`,
    /// `"all"`, `"nyc"`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`GeographyError::UnknownRegion`] if nothing matches.
    pub fn resolve(&self, name: &str) -> Result<RegionSelector<'_>, GeographyError> {
        let trimmed = name.trim();
        if CITYWIDE_NAMES.iter().any(|c| c.eq_ignore_ascii_case(trimmed))
            || self.name.eq_ignore_ascii_case(trimmed)
        {
            return Ok(RegionSelector::Citywide(self));
        }
        self.get(trimmed)
            .map(RegionSelector::Region)
            .ok_or_else(|| GeographyError::UnknownRegion {
                name: name.to_string(),
            })
    }

    /// Returns the first region containing the point.
    ///
    /// The embedded outlines do not overlap, so first match wins.
    #[must_use]
    pub fn locate(&self, lat: f64, lon: f64) -> Option<&Region> {
        let query_env = AABB::from_point([lon, lat]);

        self.index
            .locate_in_envelope_intersecting(&query_env)
            .map(|entry| &self.regions[entry.index])
            .find(|region| region.contains(lat, lon))
    }

    /// Whether the point lies inside any region of the table.
    #[must_use]
    pub fn in_city(&self, lat: f64, lon: f64) -> bool {
        self.locate(lat, lon).is_some()
    }
}

/// Parse a `GeoJSON` string into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn parse_geojson_to_multipolygon(geojson_str: &str) -> Option<MultiPolygon<f64>> {
    let geojson: GeoJson = geojson_str.parse().ok()?;
    if let GeoJson::Geometry(geom) = geojson {
        let geo_geom: geo::Geometry<f64> = geom.try_into().ok()?;
        match geo_geom {
            geo::Geometry::MultiPolygon(mp) => Some(mp),
            geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
            _ => None,
        }
    } else {
        None
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RegionTable {
        RegionTable::nyc().unwrap()
    }

    #[test]
    fn loads_five_boroughs() {
        let table = table();
        assert_eq!(table.regions().len(), 5);
        assert_eq!(table.name(), "New York City");
        for borough in Borough::ALL {
            let region = table.get(&borough.to_string()).unwrap();
            assert_eq!(region.borough(), Some(borough));
        }
    }

    #[test]
    fn landmarks_locate_to_expected_borough() {
        let table = table();
        let cases = [
            (40.758, -73.9855, "Manhattan"),
            (40.7831, -73.9712, "Manhattan"),
            (40.6782, -73.9442, "Brooklyn"),
            (40.7282, -73.7949, "Queens"),
            (40.6413, -73.7781, "Queens"),
            (40.8448, -73.8648, "Bronx"),
            (40.5795, -74.1502, "Staten Island"),
        ];
        for (lat, lon, expected) in cases {
            let region = table.locate(lat, lon).map(Region::name);
            assert_eq!(region, Some(expected), "({lat}, {lon})");
        }
    }

    #[test]
    fn new_jersey_is_outside() {
        let table = table();
        assert!(table.locate(40.75, -74.20).is_none());
        assert!(!table.in_city(40.75, -74.20));
    }

    #[test]
    fn lookup_by_alias_is_case_insensitive() {
        let table = table();
        assert_eq!(table.get("kings county").map(Region::name), Some("Brooklyn"));
        assert_eq!(table.get("  the bronx ").map(Region::name), Some("Bronx"));
        assert!(table.get("Hoboken").is_none());
    }

    #[test]
    fn resolve_citywide_names() {
        let table = table();
        for name in ["citywide", "ALL", "nyc", "New York City"] {
            assert!(matches!(
                table.resolve(name).unwrap(),
                RegionSelector::Citywide(_)
            ));
        }
        let selector = table.resolve("manhattan").unwrap();
        assert_eq!(selector.name(), "Manhattan");
        assert!(selector.contains(40.758, -73.9855));
        assert!(!selector.contains(40.6782, -73.9442));
    }

    #[test]
    fn resolve_unknown_region() {
        let err = table().resolve("Atlantis").unwrap_err();
        assert!(matches!(err, GeographyError::UnknownRegion { name } if name == "Atlantis"));
    }

    #[test]
    fn duplicate_regions_rejected() {
        let toml_str = r#"
name = "dup"

[[regions]]
name = "A"
geometry = '{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}'

[[regions]]
name = "a"
geometry = '{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}'
"#;
        let err = RegionTable::from_toml("dup", toml_str).unwrap_err();
        assert!(matches!(err, GeographyError::RegionTable { .. }));
    }

    #[test]
    fn non_polygon_geometry_rejected() {
        let toml_str = r#"
name = "points"

[[regions]]
name = "A"
geometry = '{"type":"Point","coordinates":[0,0]}'
"#;
        assert!(RegionTable::from_toml("points", toml_str).is_err());
    }
}
