//! Storage layer for geoentity services.
//!
//! Provides the PostgreSQL/PostGIS access layer:
//! - Schema bootstrap (tables + GIST indexes)
//! - Source registry (provenance rows with a natural-key uniqueness rule)
//! - Entity batch insertion (transactional, savepoint per row)
//! - Hierarchy link SQL (bulk spatial join update)
//! - Pyramid level SQL (insert-select per level)
//!
//! Every data-carrying statement uses parameter binding.

pub mod entities;
pub mod hierarchy;
pub mod pyramid;
pub mod registry;
pub mod store;

pub use entities::{BatchStats, NewEntity};
pub use hierarchy::{parent_link_sql, LinkOutcome};
pub use pyramid::UnpyramidedSource;
pub use registry::SourceRecord;
pub use store::Store;

/// True when a sqlx error is a PostgreSQL uniqueness violation (23505).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}
