//! Error types for geoentity services.

use thiserror::Error;

/// Result type alias using GeoError.
pub type GeoResult<T> = Result<T, GeoError>;

/// Primary error type for geoentity operations.
#[derive(Debug, Error)]
pub enum GeoError {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot inherit parent source id for '{0}': no previously registered source in this run")]
    UnsatisfiableInherit(String),

    // === Registry Errors ===
    #[error("Source already registered for natural key ({name}, {publish_date}, {project}, {provider}, {category})")]
    DuplicateSource {
        name: String,
        publish_date: i64,
        project: String,
        provider: String,
        category: String,
    },

    // === Feature Errors ===
    #[error("Failed to read feature collection: {0}")]
    FeatureRead(String),

    #[error("Row insert failed: {0}")]
    RowInsert(String),

    #[error("Duplicate entity row: {0}")]
    RowDuplicate(String),

    // === Hierarchy Errors ===
    #[error("Ambiguous parent assignment: {child_count} child entities match more than one parent in source {parent_source_id}")]
    AmbiguousParent {
        parent_source_id: i64,
        child_count: i64,
    },

    // === Pyramid Errors ===
    #[error("Pyramid generation failed at level {level}: {message}")]
    Pyramid { level: i32, message: String },

    // === Storage Errors ===
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl GeoError {
    /// Whether this error must abort the whole run rather than skip the
    /// current entity.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            GeoError::UnsatisfiableInherit(_)
                | GeoError::DuplicateSource { .. }
                | GeoError::RowDuplicate(_)
                | GeoError::Connection(_)
        )
    }
}

impl From<std::io::Error> for GeoError {
    fn from(err: std::io::Error) -> Self {
        GeoError::FeatureRead(err.to_string())
    }
}
