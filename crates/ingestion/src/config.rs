//! Per-entity ingestion directives.
//!
//! A directive pairs the provenance attributes of a source layer with the
//! instructions for reading and ingesting its feature collection. The
//! Config Provider contract yields these in processing order; that order
//! matters because the `-1` parent sentinel inherits the previously
//! registered source id.

use serde::{Deserialize, Serialize};

use geoentity_common::{GeoError, GeoResult};

/// Parent-source-id sentinel: inherit the previously registered source id.
pub const PARENT_INHERIT: i64 = -1;

/// Parent-source-id value meaning "this layer has no parent".
pub const PARENT_NONE: i64 = 0;

/// How the raw feature id attribute is coerced into the composite id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FeatureIdKind {
    /// Parse the raw value as an integer before stringifying; a value that
    /// does not parse fails the row.
    Int,
    /// Use the raw value verbatim.
    #[default]
    Str,
}

/// Provenance attributes for one source layer.
///
/// (name, publish_date, project, provider, category) is the natural key
/// and must be unique in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub name: String,
    /// Publication date as `yyyymmdd`.
    pub publish_date: String,
    pub project: String,
    pub provider: String,
    pub category: String,
    /// Free-form auxiliary text; "NULL" spellings and "" store as NULL.
    #[serde(default)]
    pub aux_data: String,
    /// Treat an existing registration (or existing entity rows) as success
    /// instead of aborting, enabling idempotent re-runs.
    #[serde(default)]
    pub reprocess: bool,
}

/// Instructions for reading and ingesting one feature collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureIngestConfig {
    /// Feature collection location (GeoJSON file path).
    pub file_path: String,
    /// Parent layer type tag (informational, e.g. "state").
    pub parent_type: String,
    /// Positive id = explicit parent layer, 0 = no parent, -1 = inherit
    /// the previously registered source id.
    pub parent_source_id: i64,
    /// Prefix prepended to every coerced feature id.
    pub prefix: String,
    /// Attribute holding the display name.
    pub name_attribute: String,
    /// Attribute holding the raw feature id.
    pub feature_id_attribute: String,
    #[serde(default)]
    pub feature_id_type: FeatureIdKind,
    /// Attribute names copied into the auxiliary JSON payload.
    #[serde(default)]
    pub aux_attributes: Option<Vec<String>>,
    /// When false the spatial join is computed and logged but not applied.
    #[serde(default)]
    pub apply_spatial_join: bool,
}

/// One entry of the ordered entity list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDirective {
    /// Stable key naming this entity batch in logs and reports.
    pub key: String,
    pub source: SourceDescriptor,
    pub ingest: FeatureIngestConfig,
}

impl EntityDirective {
    /// Check every required field. A missing value skips the whole entity,
    /// not just one phase.
    pub fn validate(&self) -> GeoResult<()> {
        let required = [
            ("name", &self.source.name),
            ("publish_date", &self.source.publish_date),
            ("project", &self.source.project),
            ("provider", &self.source.provider),
            ("category", &self.source.category),
            ("file_path", &self.ingest.file_path),
            ("parent_type", &self.ingest.parent_type),
            ("prefix", &self.ingest.prefix),
            ("name_attribute", &self.ingest.name_attribute),
            ("feature_id_attribute", &self.ingest.feature_id_attribute),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| *field)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(GeoError::Config(format!(
                "Missing required fields for '{}': {}",
                self.key,
                missing.join(", ")
            )))
        }
    }
}

/// Ordered list of ingestion directives for one run.
pub trait ConfigProvider: Send + Sync {
    fn directives(&self) -> GeoResult<Vec<EntityDirective>>;
}

impl ConfigProvider for Vec<EntityDirective> {
    fn directives(&self) -> GeoResult<Vec<EntityDirective>> {
        Ok(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directive() -> EntityDirective {
        EntityDirective {
            key: "districts".to_string(),
            source: SourceDescriptor {
                name: "districts_2023".to_string(),
                publish_date: "20230216".to_string(),
                project: "agri-dss".to_string(),
                provider: "survey-dept".to_string(),
                category: "admin".to_string(),
                aux_data: String::new(),
                reprocess: false,
            },
            ingest: FeatureIngestConfig {
                file_path: "/data/districts.geojson".to_string(),
                parent_type: "state".to_string(),
                parent_source_id: PARENT_INHERIT,
                prefix: "DT".to_string(),
                name_attribute: "DIST_NAME".to_string(),
                feature_id_attribute: "DIST_CODE".to_string(),
                feature_id_type: FeatureIdKind::Int,
                aux_attributes: None,
                apply_spatial_join: true,
            },
        }
    }

    #[test]
    fn complete_directive_validates() {
        assert!(directive().validate().is_ok());
    }

    #[test]
    fn empty_required_field_is_config_error() {
        let mut d = directive();
        d.ingest.name_attribute = String::new();
        let err = d.validate().unwrap_err();
        assert!(matches!(err, GeoError::Config(_)));
        assert!(err.to_string().contains("name_attribute"));
    }

    #[test]
    fn whitespace_only_counts_as_missing() {
        let mut d = directive();
        d.source.provider = "   ".to_string();
        assert!(d.validate().is_err());
    }

    #[test]
    fn reports_all_missing_fields() {
        let mut d = directive();
        d.source.name = String::new();
        d.ingest.prefix = String::new();
        let msg = d.validate().unwrap_err().to_string();
        assert!(msg.contains("name"));
        assert!(msg.contains("prefix"));
    }

    #[test]
    fn feature_id_type_defaults_to_str() {
        assert_eq!(FeatureIdKind::default(), FeatureIdKind::Str);
    }
}
