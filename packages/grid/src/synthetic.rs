//! Deterministic synthetic emission model.
//!
//! Intensity (tonnes CO₂/km²/day, before calibration) at a point is built
//! from three layers:
//!
//! * **Urban base.** A constant 29 plus, for every borough centre, a
//!   piecewise falloff over the plain degree distance `d`:
//!   `w·47` if `d < 0.05`, `w·29/(10d + 1)` if `d < 0.15`, else
//!   `w·18/(20d + 1)`, with borough weight `w`.
//! * **Hotspots.** Airports add a Gaussian peak (σ = 2 km, cut at 6 km).
//!   Dense commercial districts add a linear falloff `1 - d/(r + 1)`
//!   within their radius `r` (km). Where hotspots sum past
//!   [`HOTSPOT_DOMINANCE`] the urban base is ignored, otherwise the larger
//!   of the two wins.
//! * **Land coverage.** Points outside every borough outline (rivers,
//!   harbor, New Jersey) drop to `max(5, v·0.05)`. Everything floors at 5.
//!
//! The absolute level is irrelevant once calibration rescales the field;
//! only the spatial shape matters.

use co2_map_geography::RegionTable;
use co2_map_geography_models::{Borough, GeoPoint};

/// A reproducible intensity surface.
///
/// Implementations must be pure: the same point always yields the same
/// finite, non-negative value.
pub trait SpatialModel: Send + Sync {
    /// Short identifier for logs and response metadata.
    fn name(&self) -> &str;

    /// Raw intensity at the point.
    fn intensity_at(&self, lat: f64, lon: f64) -> f64;
}

const URBAN_BASE: f64 = 29.0;
const HOTSPOT_DOMINANCE: f64 = 1000.0;
const OFF_LAND_FACTOR: f64 = 0.05;
const MIN_INTENSITY: f64 = 5.0;

/// Shape of a hotspot's spatial decay.
#[derive(Debug, Clone, Copy)]
enum Falloff {
    Gaussian { sigma_km: f64 },
    Linear,
}

/// A localized emission source.
#[derive(Debug, Clone, Copy)]
struct Hotspot {
    center: GeoPoint,
    peak: f64,
    radius_km: f64,
    falloff: Falloff,
}

impl Hotspot {
    fn contribution(&self, point: &GeoPoint) -> f64 {
        let d = self.center.distance_km(point);
        if d > self.radius_km {
            return 0.0;
        }
        match self.falloff {
            Falloff::Gaussian { sigma_km } => {
                self.peak * (-(d * d) / (2.0 * sigma_km * sigma_km)).exp()
            }
            Falloff::Linear => self.peak * (1.0 - d / (self.radius_km + 1.0)),
        }
    }
}

const HOTSPOTS: &[Hotspot] = &[
    // JFK
    Hotspot {
        center: GeoPoint::new(40.6413, -73.7781),
        peak: 1800.0,
        radius_km: 6.0,
        falloff: Falloff::Gaussian { sigma_km: 2.0 },
    },
    // LaGuardia
    Hotspot {
        center: GeoPoint::new(40.7769, -73.8740),
        peak: 1200.0,
        radius_km: 6.0,
        falloff: Falloff::Gaussian { sigma_km: 2.0 },
    },
    // Midtown
    Hotspot {
        center: GeoPoint::new(40.758, -73.9855),
        peak: 164.0,
        radius_km: 3.0,
        falloff: Falloff::Linear,
    },
    // Financial District
    Hotspot {
        center: GeoPoint::new(40.7074, -74.0113),
        peak: 146.0,
        radius_km: 2.0,
        falloff: Falloff::Linear,
    },
    // Upper West Side
    Hotspot {
        center: GeoPoint::new(40.7870, -73.9754),
        peak: 129.0,
        radius_km: 2.0,
        falloff: Falloff::Linear,
    },
];

/// Relative activity weight of each borough.
const fn borough_weight(borough: Borough) -> f64 {
    match borough {
        Borough::Manhattan => 1.5,
        Borough::Brooklyn => 1.2,
        Borough::Queens => 1.0,
        Borough::Bronx => 1.1,
        Borough::StatenIsland => 0.7,
    }
}

fn urban_base(point: &GeoPoint) -> f64 {
    URBAN_BASE
        + Borough::ALL
            .iter()
            .map(|b| {
                let w = borough_weight(*b);
                let d = b.center().distance_deg(point);
                if d < 0.05 {
                    w * 47.0
                } else if d < 0.15 {
                    w * 29.0 / (d * 10.0 + 1.0)
                } else {
                    w * 18.0 / (d * 20.0 + 1.0)
                }
            })
            .sum::<f64>()
}

/// Borough-centre, hotspot, and land-coverage model for New York City.
pub struct NycEmissionModel<'a> {
    regions: &'a RegionTable,
}

impl<'a> NycEmissionModel<'a> {
    /// Creates the model over the given land coverage.
    #[must_use]
    pub const fn new(regions: &'a RegionTable) -> Self {
        Self { regions }
    }
}

impl SpatialModel for NycEmissionModel<'_> {
    fn name(&self) -> &'static str {
        "nyc_borough_hotspot"
    }

    fn intensity_at(&self, lat: f64, lon: f64) -> f64 {
        let point = GeoPoint::new(lat, lon);

        let hotspots: f64 = HOTSPOTS.iter().map(|h| h.contribution(&point)).sum();
        let mut value = if hotspots < HOTSPOT_DOMINANCE {
            hotspots.max(urban_base(&point))
        } else {
            hotspots
        };

        if !self.regions.in_city(lat, lon) {
            value = MIN_INTENSITY.max(value * OFF_LAND_FACTOR);
        }

        value.max(MIN_INTENSITY)
    }
}
