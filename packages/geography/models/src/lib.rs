#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Transit stop, census tract region, and coordinate reference types.
//!
//! These are the typed records every analysis consumes: bus stops as
//! weighted points, census tracts as polygons with a derived area, and the
//! [`Crs`] tag that both collections carry so geometric operations can
//! refuse to mix coordinate systems.

use geo::{Area, GeodesicArea, MultiPolygon};
use serde::{Deserialize, Serialize};

/// Square metres per square kilometre.
pub const SQ_M_PER_SQ_KM: f64 = 1_000_000.0;

/// A coordinate reference system tag (e.g. `"EPSG:4326"`).
///
/// Codes are normalized on construction so that the URN spellings found in
/// `GeoJSON` `crs` members compare equal to their short `AUTHORITY:CODE`
/// form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Crs(String);

impl Crs {
    /// WGS 84 longitude/latitude.
    pub const WGS84: &'static str = "EPSG:4326";

    /// Creates a CRS tag from any common spelling of an authority code.
    #[must_use]
    pub fn new(code: &str) -> Self {
        Self(normalize_crs_code(code))
    }

    /// Returns the normalized `AUTHORITY:CODE` string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether coordinates in this CRS are longitude/latitude degrees
    /// rather than projected linear units.
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        matches!(self.0.as_str(), "EPSG:4326" | "EPSG:4269" | "EPSG:4258")
    }
}

impl Default for Crs {
    fn default() -> Self {
        Self::new(Self::WGS84)
    }
}

impl From<String> for Crs {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<Crs> for String {
    fn from(value: Crs) -> Self {
        value.0
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalizes `urn:ogc:def:crs:EPSG::26916`, `epsg:26916` and friends to
/// `EPSG:26916`. `GeoJSON` `CRS84` is lon/lat WGS 84 and maps to
/// `EPSG:4326`.
fn normalize_crs_code(code: &str) -> String {
    let trimmed = code.trim();
    let upper = trimmed.to_ascii_uppercase();

    if upper.ends_with("CRS84") {
        return Crs::WGS84.to_string();
    }

    if let Some(rest) = upper.strip_prefix("URN:OGC:DEF:CRS:") {
        let mut parts = rest.split(':').filter(|p| !p.is_empty());
        if let (Some(authority), Some(code)) = (parts.next(), parts.next_back()) {
            return format!("{authority}:{code}");
        }
    }

    upper
}

/// A set of features that share one coordinate reference system.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    /// CRS of every feature in the layer.
    pub crs: Crs,
    /// Features in input order.
    pub features: Vec<T>,
}

impl<T> Layer<T> {
    /// Creates a layer.
    #[must_use]
    pub const fn new(crs: Crs, features: Vec<T>) -> Self {
        Self { crs, features }
    }

    /// Number of features in the layer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Whether the layer has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Bus stops sharing one CRS.
pub type StopLayer = Layer<StopPoint>;

/// Census tracts sharing one CRS.
pub type RegionLayer = Layer<Region>;

/// A bus stop location, optionally weighted by scheduled visits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StopPoint {
    /// Transit agency stop identifier (CTA `SYSTEMSTOP`, GTFS `stop_id`).
    pub stop_id: String,
    /// Easting or longitude.
    pub x: f64,
    /// Northing or latitude.
    pub y: f64,
    /// Scheduled stop visits. `None` means the stop counts once.
    pub weight: Option<u64>,
}

impl StopPoint {
    /// Creates an unweighted stop.
    #[must_use]
    pub fn new(stop_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            stop_id: stop_id.into(),
            x,
            y,
            weight: None,
        }
    }

    /// Returns the stop with its scheduled visit count set.
    #[must_use]
    pub const fn with_weight(mut self, visits: u64) -> Self {
        self.weight = Some(visits);
        self
    }

    /// Coordinate pair for spatial indexing.
    #[must_use]
    pub const fn coord(&self) -> [f64; 2] {
        [self.x, self.y]
    }

    /// Scheduled visits, defaulting to a single visit for unweighted stops.
    #[must_use]
    pub fn weight_or_unit(&self) -> u64 {
        self.weight.unwrap_or(1)
    }
}

/// A census tract (or any areal unit) with a unique identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Unique region identifier (e.g. tract GEOID `"17031010100"`).
    pub region_id: String,
    /// Tract boundary; single polygons are stored as one-part multipolygons.
    pub polygon: MultiPolygon<f64>,
    /// Area in square kilometres.
    pub area_km2: f64,
}

impl Region {
    /// Creates a region, deriving its area from the polygon.
    ///
    /// Geographic CRSs use the geodesic area on the WGS 84 ellipsoid;
    /// projected CRSs are assumed to be in metres.
    #[must_use]
    pub fn from_polygon(region_id: impl Into<String>, polygon: MultiPolygon<f64>, crs: &Crs) -> Self {
        let area_km2 = polygon_area_km2(&polygon, crs);
        Self {
            region_id: region_id.into(),
            polygon,
            area_km2,
        }
    }

    /// Creates a region with a caller-supplied area (e.g. a published land
    /// area attribute).
    #[must_use]
    pub fn with_area(region_id: impl Into<String>, polygon: MultiPolygon<f64>, area_km2: f64) -> Self {
        Self {
            region_id: region_id.into(),
            polygon,
            area_km2,
        }
    }
}

/// Computes the area of a polygon in square kilometres.
#[must_use]
pub fn polygon_area_km2(polygon: &MultiPolygon<f64>, crs: &Crs) -> f64 {
    let sq_m = if crs.is_geographic() {
        polygon.geodesic_area_unsigned()
    } else {
        polygon.unsigned_area()
    };
    sq_m / SQ_M_PER_SQ_KM
}

#[cfg(test)]
mod tests {
    use geo::polygon;

    use super::*;

    #[test]
    fn normalizes_crs_spellings() {
        assert_eq!(Crs::new("urn:ogc:def:crs:EPSG::26916").as_str(), "EPSG:26916");
        assert_eq!(Crs::new("epsg:3435").as_str(), "EPSG:3435");
        assert_eq!(Crs::new("urn:ogc:def:crs:OGC:1.3:CRS84"), Crs::default());
    }

    #[test]
    fn geographic_crs_detection() {
        assert!(Crs::new("EPSG:4326").is_geographic());
        assert!(!Crs::new("EPSG:26916").is_geographic());
    }

    #[test]
    fn projected_area_in_km2() {
        let square = MultiPolygon(vec![polygon![
            (x: 0.0, y: 0.0),
            (x: 2000.0, y: 0.0),
            (x: 2000.0, y: 1000.0),
            (x: 0.0, y: 1000.0),
        ]]);
        let region = Region::from_polygon("a", square, &Crs::new("EPSG:26916"));
        assert!((region.area_km2 - 2.0).abs() < 1e-9);
    }

    #[test]
    fn geodesic_area_is_plausible() {
        // Roughly 0.01 x 0.01 degrees near Chicago, about 0.93 km2.
        let cell = MultiPolygon(vec![polygon![
            (x: -87.64, y: 41.88),
            (x: -87.63, y: 41.88),
            (x: -87.63, y: 41.89),
            (x: -87.64, y: 41.89),
        ]]);
        let area = polygon_area_km2(&cell, &Crs::default());
        assert!(area > 0.8 && area < 1.0, "unexpected area {area}");
    }

    #[test]
    fn unweighted_stop_counts_once() {
        let stop = StopPoint::new("1", 0.0, 0.0);
        assert_eq!(stop.weight_or_unit(), 1);
        assert_eq!(stop.with_weight(42).weight_or_unit(), 42);
    }
}
