//! Feature source: decoded feature collections for a given location.

use async_trait::async_trait;
use geojson::{FeatureCollection, GeoJson};
use serde_json::{Map, Value};
use tracing::info;

use geoentity_common::{GeoError, GeoResult};

/// One decoded feature: geometry plus attribute map, WGS84 coordinates.
#[derive(Debug, Clone)]
pub struct Feature {
    /// Absent when the source feature carried a null geometry.
    pub geometry: Option<geojson::Geometry>,
    pub attributes: Map<String, Value>,
}

/// Yields a decoded feature collection for a location.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn load(&self, location: &str) -> GeoResult<Vec<Feature>>;
}

/// Reads GeoJSON feature collections from the filesystem.
pub struct GeoJsonFileSource;

#[async_trait]
impl FeatureSource for GeoJsonFileSource {
    async fn load(&self, location: &str) -> GeoResult<Vec<Feature>> {
        let text = tokio::fs::read_to_string(location)
            .await
            .map_err(|e| GeoError::FeatureRead(format!("{}: {}", location, e)))?;

        let collection = parse_collection(&text)
            .map_err(|e| GeoError::FeatureRead(format!("{}: {}", location, e)))?;

        let features: Vec<Feature> = collection
            .features
            .into_iter()
            .map(|f| Feature {
                geometry: f.geometry,
                attributes: f.properties.unwrap_or_default(),
            })
            .collect();

        info!(location, total = features.len(), "Feature collection decoded");
        Ok(features)
    }
}

fn parse_collection(text: &str) -> Result<FeatureCollection, String> {
    let geojson: GeoJson = text.parse().map_err(|e| format!("{}", e))?;
    match geojson {
        GeoJson::FeatureCollection(fc) => Ok(fc),
        other => Err(format!(
            "Expected a FeatureCollection, got {}",
            match other {
                GeoJson::Geometry(_) => "a bare geometry",
                GeoJson::Feature(_) => "a single feature",
                GeoJson::FeatureCollection(_) => unreachable!(),
            }
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "properties": {"NAME": "Alpha", "CODE": 1},
                "geometry": {"type": "Point", "coordinates": [72.5, 23.0]}
            },
            {
                "type": "Feature",
                "properties": {"NAME": "Beta", "CODE": 2},
                "geometry": null
            }
        ]
    }"#;

    #[test]
    fn parses_feature_collection() {
        let fc = parse_collection(SAMPLE).unwrap();
        assert_eq!(fc.features.len(), 2);
    }

    #[test]
    fn rejects_bare_geometry() {
        let err = parse_collection(r#"{"type":"Point","coordinates":[0,0]}"#).unwrap_err();
        assert!(err.contains("FeatureCollection"));
    }

    #[tokio::test]
    async fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let source = GeoJsonFileSource;
        let features = source.load(file.path().to_str().unwrap()).await.unwrap();

        assert_eq!(features.len(), 2);
        assert_eq!(features[0].attributes["NAME"], "Alpha");
        assert!(features[0].geometry.is_some());
        assert!(features[1].geometry.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_feature_read_error() {
        let source = GeoJsonFileSource;
        let err = source.load("/nonexistent/path.geojson").await.unwrap_err();
        assert!(matches!(err, GeoError::FeatureRead(_)));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn malformed_json_is_feature_read_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not geojson").unwrap();

        let source = GeoJsonFileSource;
        let err = source.load(file.path().to_str().unwrap()).await.unwrap_err();
        assert!(matches!(err, GeoError::FeatureRead(_)));
    }
}
