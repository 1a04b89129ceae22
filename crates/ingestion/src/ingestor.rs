//! Geometry ingestor: streams features into the entity table.
//!
//! Row preparation is pure and separated from the SQL so the skip/fail
//! rules are testable on their own. The actual insertion runs through
//! [`storage::Store::insert_entities`] (one transaction per batch,
//! savepoint per row).

use serde_json::{json, Map, Value};
use tracing::info;

use geoentity_common::{GeoError, GeoResult};
use storage::{NewEntity, Store};

use crate::config::{FeatureIdKind, FeatureIngestConfig};
use crate::feature::Feature;

/// Counters for one ingestion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Input features in the collection.
    pub total: u64,
    /// Rows inserted (or already present under reprocess).
    pub processed: u64,
    /// Rows that failed preparation or insertion.
    pub failed: u64,
    /// Features skipped for a missing/empty name (not failures).
    pub skipped: u64,
}

/// Outcome of preparing one feature.
#[derive(Debug)]
enum RowPrep {
    Row(Box<NewEntity>),
    Skip,
    Fail(GeoError),
}

/// Streams features into the entity table under a given source id.
pub struct GeometryIngestor {
    store: Store,
}

impl GeometryIngestor {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Ingest a feature collection for `source_id`.
    ///
    /// `parent_source_id` is the resolved parent layer (already past the
    /// inherit sentinel); when positive it is stored on each row as the
    /// expected parent layer.
    pub async fn ingest(
        &self,
        source_id: i64,
        parent_source_id: Option<i64>,
        features: &[Feature],
        cfg: &FeatureIngestConfig,
        reprocess: bool,
    ) -> GeoResult<IngestStats> {
        let mut stats = IngestStats {
            total: features.len() as u64,
            ..Default::default()
        };

        let mut rows = Vec::new();
        for feature in features {
            match prepare_row(feature, parent_source_id, cfg) {
                RowPrep::Row(row) => rows.push(*row),
                RowPrep::Skip => stats.skipped += 1,
                RowPrep::Fail(err) => {
                    tracing::warn!(source_id, error = %err, "Feature preparation failed");
                    stats.failed += 1;
                }
            }
        }

        let batch = self.store.insert_entities(source_id, &rows, reprocess).await?;
        stats.processed = batch.processed;
        stats.failed += batch.failed;

        info!(
            source_id,
            total = stats.total,
            processed = stats.processed,
            failed = stats.failed,
            skipped = stats.skipped,
            "Entity insertion completed"
        );
        Ok(stats)
    }
}

/// Prepare one feature: coerce the id, extract and sanitize the name,
/// serialize the geometry, build the auxiliary payload.
fn prepare_row(
    feature: &Feature,
    parent_source_id: Option<i64>,
    cfg: &FeatureIngestConfig,
) -> RowPrep {
    // A feature without a usable name is skipped, not failed. Upstream
    // tooling writes missing names as JSON null (pandas NaN), so null,
    // absent, and empty all mean "no name".
    let name = match extract_name(&feature.attributes, &cfg.name_attribute) {
        Some(name) => sanitize_name(&name),
        None => return RowPrep::Skip,
    };

    let raw_id = match feature.attributes.get(&cfg.feature_id_attribute) {
        Some(value) => value,
        None => {
            return RowPrep::Fail(GeoError::RowInsert(format!(
                "Missing id attribute '{}'",
                cfg.feature_id_attribute
            )))
        }
    };
    let entity_id = match coerce_feature_id(raw_id, cfg.feature_id_type) {
        Ok(id) => format!("{}{}", cfg.prefix, id),
        Err(reason) => return RowPrep::Fail(GeoError::RowInsert(reason)),
    };

    let geometry = match &feature.geometry {
        Some(geom) => geom.to_string(),
        None => {
            return RowPrep::Fail(GeoError::RowInsert(format!(
                "Null geometry for entity '{}'",
                entity_id
            )))
        }
    };

    let auxdata = cfg
        .aux_attributes
        .as_ref()
        .map(|attrs| build_auxdata(&feature.attributes, attrs));

    RowPrep::Row(Box::new(NewEntity {
        entity_id,
        name,
        geometry,
        parent_source_id: parent_source_id.filter(|id| *id > 0),
        auxdata,
    }))
}

/// Extract the display name. Returns None for absent, null, NaN-ish, and
/// empty values.
fn extract_name(attributes: &Map<String, Value>, name_attribute: &str) -> Option<String> {
    match attributes.get(name_attribute) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Minimum injection-safety measure carried over from the original
/// pipeline; real safety comes from bind parameters.
fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| *c != '\'' && *c != '"').collect()
}

/// Coerce the raw feature id per the configured kind.
fn coerce_feature_id(value: &Value, kind: FeatureIdKind) -> Result<String, String> {
    match kind {
        FeatureIdKind::Str => match value {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            other => Err(format!("Unusable feature id value: {}", other)),
        },
        FeatureIdKind::Int => match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(i.to_string())
                } else if let Some(f) = n.as_f64() {
                    // Fractional ids truncate toward zero.
                    Ok((f.trunc() as i64).to_string())
                } else {
                    Err(format!("Feature id out of integer range: {}", n))
                }
            }
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(|i| i.to_string())
                .map_err(|_| format!("Feature id '{}' is not an integer", s)),
            other => Err(format!("Unusable feature id value: {}", other)),
        },
    }
}

/// Build the auxiliary payload: `{"features": {attr: stringified value}}`.
///
/// Attribute names containing "Level_IV" map to the literal key
/// "Level_lV". The misspelling is load-bearing: existing consumers read
/// the payload under that key.
fn build_auxdata(attributes: &Map<String, Value>, aux_attributes: &[String]) -> Value {
    let mut features = Map::new();
    for attr in aux_attributes {
        let key = if attr.contains("Level_IV") {
            "Level_lV".to_string()
        } else {
            attr.clone()
        };
        let value = match attributes.get(attr) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "null".to_string(),
            Some(other) => other.to_string(),
        };
        features.insert(key, Value::String(value));
    }
    json!({ "features": features })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureIdKind;

    fn attrs(pairs: &[(&str, Value)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn cfg() -> FeatureIngestConfig {
        FeatureIngestConfig {
            file_path: "/data/x.geojson".to_string(),
            parent_type: "state".to_string(),
            parent_source_id: 0,
            prefix: "DT".to_string(),
            name_attribute: "NAME".to_string(),
            feature_id_attribute: "CODE".to_string(),
            feature_id_type: FeatureIdKind::Int,
            aux_attributes: None,
            apply_spatial_join: false,
        }
    }

    fn point() -> geojson::Geometry {
        geojson::Geometry::new(geojson::Value::Point(vec![72.5, 23.0]))
    }

    #[test]
    fn coerce_int_from_number() {
        assert_eq!(
            coerce_feature_id(&serde_json::json!(42), FeatureIdKind::Int).unwrap(),
            "42"
        );
        // Floats truncate, matching integer coercion of numeric columns.
        assert_eq!(
            coerce_feature_id(&serde_json::json!(42.9), FeatureIdKind::Int).unwrap(),
            "42"
        );
    }

    #[test]
    fn coerce_int_from_string() {
        assert_eq!(
            coerce_feature_id(&serde_json::json!("17"), FeatureIdKind::Int).unwrap(),
            "17"
        );
        assert!(coerce_feature_id(&serde_json::json!("17.5"), FeatureIdKind::Int).is_err());
        assert!(coerce_feature_id(&serde_json::json!("abc"), FeatureIdKind::Int).is_err());
    }

    #[test]
    fn coerce_str_verbatim() {
        assert_eq!(
            coerce_feature_id(&serde_json::json!("GA-07"), FeatureIdKind::Str).unwrap(),
            "GA-07"
        );
        assert_eq!(
            coerce_feature_id(&serde_json::json!(7), FeatureIdKind::Str).unwrap(),
            "7"
        );
    }

    #[test]
    fn name_sanitization_strips_quotes() {
        assert_eq!(sanitize_name("D'Souza \"North\""), "DSouza North");
    }

    #[test]
    fn missing_or_null_name_skips_row() {
        let feature = Feature {
            geometry: Some(point()),
            attributes: attrs(&[("CODE", serde_json::json!(1)), ("NAME", Value::Null)]),
        };
        assert!(matches!(prepare_row(&feature, None, &cfg()), RowPrep::Skip));

        let feature = Feature {
            geometry: Some(point()),
            attributes: attrs(&[("CODE", serde_json::json!(1)), ("NAME", serde_json::json!(""))]),
        };
        assert!(matches!(prepare_row(&feature, None, &cfg()), RowPrep::Skip));
    }

    #[test]
    fn unparseable_id_fails_row() {
        let feature = Feature {
            geometry: Some(point()),
            attributes: attrs(&[
                ("CODE", serde_json::json!("not-a-number")),
                ("NAME", serde_json::json!("Alpha")),
            ]),
        };
        assert!(matches!(
            prepare_row(&feature, None, &cfg()),
            RowPrep::Fail(GeoError::RowInsert(_))
        ));
    }

    #[test]
    fn null_geometry_fails_row() {
        let feature = Feature {
            geometry: None,
            attributes: attrs(&[
                ("CODE", serde_json::json!(3)),
                ("NAME", serde_json::json!("Gamma")),
            ]),
        };
        assert!(matches!(
            prepare_row(&feature, None, &cfg()),
            RowPrep::Fail(GeoError::RowInsert(_))
        ));
    }

    #[test]
    fn preparation_failures_are_row_level_not_fatal() {
        let feature = Feature {
            geometry: None,
            attributes: attrs(&[
                ("CODE", serde_json::json!(3)),
                ("NAME", serde_json::json!("Gamma")),
            ]),
        };
        match prepare_row(&feature, None, &cfg()) {
            RowPrep::Fail(err) => assert!(!err.is_fatal()),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn prepared_row_has_prefixed_id_and_parent() {
        let feature = Feature {
            geometry: Some(point()),
            attributes: attrs(&[
                ("CODE", serde_json::json!(12)),
                ("NAME", serde_json::json!("Delta")),
            ]),
        };
        match prepare_row(&feature, Some(9), &cfg()) {
            RowPrep::Row(row) => {
                assert_eq!(row.entity_id, "DT12");
                assert_eq!(row.name, "Delta");
                assert_eq!(row.parent_source_id, Some(9));
                assert!(row.geometry.contains("Point"));
            }
            other => panic!("expected row, got {:?}", other),
        }
    }

    #[test]
    fn auxdata_remaps_level_iv_key() {
        let attributes = attrs(&[
            ("Level_IV_Code", serde_json::json!("L4-9")),
            ("AREA", serde_json::json!(12.5)),
        ]);
        let aux = build_auxdata(
            &attributes,
            &["Level_IV_Code".to_string(), "AREA".to_string()],
        );
        let features = &aux["features"];
        assert_eq!(features["Level_lV"], "L4-9");
        assert!(features.get("Level_IV_Code").is_none());
        assert_eq!(features["AREA"], "12.5");
    }

    #[test]
    fn auxdata_missing_attribute_stringifies_null() {
        let aux = build_auxdata(&attrs(&[]), &["ABSENT".to_string()]);
        assert_eq!(aux["features"]["ABSENT"], "null");
    }
}
