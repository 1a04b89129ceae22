//! Geoentity ingestion library.
//!
//! Provides core logic for ingesting administrative/geographic entity
//! layers (GeoJSON feature collections) into PostGIS:
//!
//! - Per-entity ingestion directives and validation
//! - GeoJSON feature source abstraction
//! - Entity row preparation and batch insertion
//! - Spatial parent linkage (hierarchy)
//! - The orchestrator fold threading parent-source-id inheritance
//!   across an ordered entity list
//!
//! # Architecture
//!
//! The orchestrator consumes two external contracts: a [`ConfigProvider`]
//! yielding ordered ingestion directives, and a [`FeatureSource`] yielding
//! decoded feature collections. Everything it does against the store goes
//! through the [`Registrar`] and [`EntitySink`] seams, so the fold is
//! testable without a database.

pub mod config;
pub mod feature;
pub mod ingestor;
pub mod linker;
pub mod orchestrator;

// Re-exports
pub use config::{ConfigProvider, EntityDirective, FeatureIdKind, FeatureIngestConfig, SourceDescriptor};
pub use feature::{Feature, FeatureSource, GeoJsonFileSource};
pub use ingestor::{GeometryIngestor, IngestStats};
pub use linker::HierarchyLinker;
pub use orchestrator::{
    resolve_parent, EntityOutcome, EntitySink, Orchestrator, Registrar, RunSummary, StorePipeline,
};
