//! Census tract boundaries from a `GeoJSON` `FeatureCollection`.
//!
//! Each feature becomes one [`Region`]. Its identifier comes from a
//! configurable property (`geoid10` by default, matched case-insensitively
//! so shapefile-style `GEOID10` works too) and its area is derived from the
//! polygon in the layer's CRS.
//!
//! The layer CRS is, in order: the caller's override, the legacy top-level
//! `crs` member some older exports carry, then the caller's default (WGS 84
//! longitude/latitude unless configured otherwise, as RFC 7946 requires).

use std::collections::BTreeSet;
use std::path::Path;

use geo::MultiPolygon;
use geojson::{Feature, FeatureCollection, GeoJson};
use serde_json::Value;
use transit_density_geography_models::{Crs, Region, RegionLayer};

use crate::GeographyError;

/// Default property holding the tract identifier.
pub const DEFAULT_REGION_ID_FIELD: &str = "geoid10";

/// How to interpret a tract file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TractOptions {
    /// Property holding the region identifier.
    pub region_id_field: String,
    /// CRS to assume regardless of what the file declares.
    pub crs: Option<Crs>,
    /// CRS to assume when the file declares none.
    pub default_crs: Crs,
}

impl Default for TractOptions {
    fn default() -> Self {
        Self {
            region_id_field: DEFAULT_REGION_ID_FIELD.to_string(),
            crs: None,
            default_crs: Crs::default(),
        }
    }
}

/// Loads tracts from a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`GeographyError::Io`] if the file cannot be read, otherwise see
/// [`parse_tracts`].
pub fn load_tracts(path: &Path, options: &TractOptions) -> Result<RegionLayer, GeographyError> {
    let text = std::fs::read_to_string(path).map_err(|e| GeographyError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_tracts(&text, &path.display().to_string(), options)
}

/// Parses tracts from `GeoJSON` text. `source` names the input in errors.
///
/// # Errors
///
/// * [`GeographyError::GeoJson`] if the text is not valid `GeoJSON`
/// * [`GeographyError::Conversion`] if it is not a `FeatureCollection` or a
///   feature lacks a polygonal geometry
/// * [`GeographyError::InvalidRegion`] if a feature lacks an identifier or
///   repeats one
pub fn parse_tracts(
    text: &str,
    source: &str,
    options: &TractOptions,
) -> Result<RegionLayer, GeographyError> {
    let geojson: GeoJson = text.parse().map_err(|e| GeographyError::GeoJson {
        path: source.to_string(),
        source: Box::new(e),
    })?;

    let GeoJson::FeatureCollection(collection) = geojson else {
        return Err(GeographyError::Conversion {
            message: format!("{source} is not a FeatureCollection"),
        });
    };

    let crs = options
        .crs
        .clone()
        .or_else(|| declared_crs(&collection))
        .unwrap_or_else(|| options.default_crs.clone());

    let mut seen = BTreeSet::new();
    let mut regions = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.iter().enumerate() {
        let region_id = feature_id(feature, &options.region_id_field).ok_or_else(|| {
            GeographyError::InvalidRegion {
                region_id: format!("feature #{index}"),
                reason: format!("missing `{}` property", options.region_id_field),
            }
        })?;

        if !seen.insert(region_id.clone()) {
            return Err(GeographyError::InvalidRegion {
                region_id,
                reason: "duplicate region identifier".to_string(),
            });
        }

        let polygon = feature_polygon(feature).ok_or_else(|| GeographyError::Conversion {
            message: format!("region {region_id} in {source} has no Polygon or MultiPolygon geometry"),
        })?;

        let region = Region::from_polygon(region_id, polygon, &crs);
        if region.area_km2 <= 0.0 {
            log::warn!("Region {} has zero area", region.region_id);
        }
        regions.push(region);
    }

    log::info!("Loaded {} tracts from {source} ({crs})", regions.len());

    Ok(RegionLayer::new(crs, regions))
}

/// The legacy `{"crs": {"type": "name", "properties": {"name": ...}}}`
/// member, if present.
fn declared_crs(collection: &FeatureCollection) -> Option<Crs> {
    let name = collection
        .foreign_members
        .as_ref()?
        .get("crs")?
        .get("properties")?
        .get("name")?
        .as_str()?;
    Some(Crs::new(name))
}

fn feature_id(feature: &Feature, field: &str) -> Option<String> {
    let properties = feature.properties.as_ref()?;
    let value = properties.get(field).or_else(|| {
        properties
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(field))
            .map(|(_, value)| value)
    })?;

    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn feature_polygon(feature: &Feature) -> Option<MultiPolygon<f64>> {
    let geometry = feature.geometry.clone()?;
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACTS: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"geoid10": "17031010100", "name": "A"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-87.64, 41.88], [-87.63, 41.88], [-87.63, 41.89], [-87.64, 41.89], [-87.64, 41.88]]]
                }
            },
            {
                "type": "Feature",
                "properties": {"geoid10": 17031010200},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[-87.63, 41.88], [-87.62, 41.88], [-87.62, 41.89], [-87.63, 41.89], [-87.63, 41.88]]]]
                }
            }
        ]
    }"#;

    #[test]
    fn parses_polygons_and_multipolygons() {
        let layer = parse_tracts(TRACTS, "tracts.geojson", &TractOptions::default()).unwrap();

        assert_eq!(layer.crs, Crs::default());
        assert_eq!(layer.len(), 2);
        assert_eq!(layer.features[0].region_id, "17031010100");
        assert_eq!(layer.features[1].region_id, "17031010200");
        assert!(layer.features.iter().all(|r| r.area_km2 > 0.8 && r.area_km2 < 1.0));
    }

    #[test]
    fn id_field_is_case_insensitive() {
        let options = TractOptions {
            region_id_field: "GEOID10".to_string(),
            ..TractOptions::default()
        };
        let layer = parse_tracts(TRACTS, "tracts.geojson", &options).unwrap();
        assert_eq!(layer.features[0].region_id, "17031010100");
    }

    #[test]
    fn honours_declared_projected_crs() {
        let text = r#"{
            "type": "FeatureCollection",
            "crs": {"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::26916"}},
            "features": [{
                "type": "Feature",
                "properties": {"geoid10": "x"},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[0, 0], [1000, 0], [1000, 1000], [0, 1000], [0, 0]]]
                }
            }]
        }"#;
        let layer = parse_tracts(text, "inline", &TractOptions::default()).unwrap();

        assert_eq!(layer.crs.as_str(), "EPSG:26916");
        assert!((layer.features[0].area_km2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn override_beats_declared_crs() {
        let options = TractOptions {
            crs: Some(Crs::new("EPSG:3435")),
            ..TractOptions::default()
        };
        let layer = parse_tracts(TRACTS, "inline", &options).unwrap();
        assert_eq!(layer.crs.as_str(), "EPSG:3435");
    }

    #[test]
    fn rejects_duplicate_and_missing_ids() {
        let duplicate = TRACTS.replace("17031010200", "\"17031010100\"");
        assert!(matches!(
            parse_tracts(&duplicate, "inline", &TractOptions::default()),
            Err(GeographyError::InvalidRegion { .. })
        ));

        let options = TractOptions {
            region_id_field: "tract".to_string(),
            ..TractOptions::default()
        };
        assert!(matches!(
            parse_tracts(TRACTS, "inline", &options),
            Err(GeographyError::InvalidRegion { .. })
        ));
    }

    #[test]
    fn rejects_non_polygon_geometry() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": {"geoid10": "p"},
                "geometry": {"type": "Point", "coordinates": [0, 0]}
            }]
        }"#;
        assert!(matches!(
            parse_tracts(text, "inline", &TractOptions::default()),
            Err(GeographyError::Conversion { .. })
        ));
    }

    #[test]
    fn rejects_bare_geometry_and_bad_json() {
        let geometry = r#"{"type": "Point", "coordinates": [0, 0]}"#;
        assert!(matches!(
            parse_tracts(geometry, "inline", &TractOptions::default()),
            Err(GeographyError::Conversion { .. })
        ));
        assert!(matches!(
            parse_tracts("{not json", "inline", &TractOptions::default()),
            Err(GeographyError::GeoJson { .. })
        ));
    }
}
