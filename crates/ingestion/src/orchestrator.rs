//! Run orchestration: an explicit fold over the ordered entity list.
//!
//! The only state carried between entities is the most recently
//! successfully registered source id, consumed by the `-1` inherit
//! sentinel. Registration and feature-read failures reset that state;
//! a later entity that asks to inherit with nothing to inherit from is
//! fatal to the whole run. Entities are processed strictly in order and
//! never retried within a run.

use async_trait::async_trait;
use tracing::{error, info, warn};

use geoentity_common::{parse_publish_date, GeoError, GeoResult};
use storage::{LinkOutcome, SourceRecord, Store};

use crate::config::{ConfigProvider, EntityDirective, SourceDescriptor, PARENT_INHERIT, PARENT_NONE};
use crate::feature::FeatureSource;
use crate::ingestor::{GeometryIngestor, IngestStats};
use crate::linker::HierarchyLinker;

/// Store seam for source registration.
#[async_trait]
pub trait Registrar: Send + Sync {
    async fn register(
        &self,
        record: &SourceRecord,
        parent_source_id: Option<i64>,
        reprocess: bool,
    ) -> GeoResult<i64>;
}

#[async_trait]
impl<T: Registrar + ?Sized> Registrar for std::sync::Arc<T> {
    async fn register(
        &self,
        record: &SourceRecord,
        parent_source_id: Option<i64>,
        reprocess: bool,
    ) -> GeoResult<i64> {
        (**self).register(record, parent_source_id, reprocess).await
    }
}

#[async_trait]
impl Registrar for Store {
    async fn register(
        &self,
        record: &SourceRecord,
        parent_source_id: Option<i64>,
        reprocess: bool,
    ) -> GeoResult<i64> {
        self.register_source(record, parent_source_id, reprocess).await
    }
}

/// Store seam for entity insertion and parent linkage.
#[async_trait]
pub trait EntitySink: Send + Sync {
    async fn ingest(
        &self,
        source_id: i64,
        parent_source_id: Option<i64>,
        features: &[crate::feature::Feature],
        cfg: &crate::config::FeatureIngestConfig,
        reprocess: bool,
    ) -> GeoResult<IngestStats>;

    async fn link(
        &self,
        source_id: i64,
        parent_source_id: i64,
        apply: bool,
    ) -> GeoResult<LinkOutcome>;
}

#[async_trait]
impl<T: EntitySink + ?Sized> EntitySink for std::sync::Arc<T> {
    async fn ingest(
        &self,
        source_id: i64,
        parent_source_id: Option<i64>,
        features: &[crate::feature::Feature],
        cfg: &crate::config::FeatureIngestConfig,
        reprocess: bool,
    ) -> GeoResult<IngestStats> {
        (**self)
            .ingest(source_id, parent_source_id, features, cfg, reprocess)
            .await
    }

    async fn link(
        &self,
        source_id: i64,
        parent_source_id: i64,
        apply: bool,
    ) -> GeoResult<LinkOutcome> {
        (**self).link(source_id, parent_source_id, apply).await
    }
}

/// Production sink: geometry ingestor plus hierarchy linker over one store.
pub struct StorePipeline {
    ingestor: GeometryIngestor,
    linker: HierarchyLinker,
}

impl StorePipeline {
    pub fn new(store: Store) -> Self {
        Self {
            ingestor: GeometryIngestor::new(store.clone()),
            linker: HierarchyLinker::new(store),
        }
    }
}

#[async_trait]
impl EntitySink for StorePipeline {
    async fn ingest(
        &self,
        source_id: i64,
        parent_source_id: Option<i64>,
        features: &[crate::feature::Feature],
        cfg: &crate::config::FeatureIngestConfig,
        reprocess: bool,
    ) -> GeoResult<IngestStats> {
        self.ingestor
            .ingest(source_id, parent_source_id, features, cfg, reprocess)
            .await
    }

    async fn link(
        &self,
        source_id: i64,
        parent_source_id: i64,
        apply: bool,
    ) -> GeoResult<LinkOutcome> {
        self.linker
            .link(source_id, Some(parent_source_id), apply)
            .await
            .map(|outcome| outcome.unwrap_or(LinkOutcome::AlreadyLinked))
    }
}

/// Resolve the configured parent-source-id against the carried state.
///
/// `0` means no parent, a positive id names the parent layer explicitly,
/// and `-1` inherits the previously registered source id. Inheriting with
/// no valid predecessor is fatal.
pub fn resolve_parent(
    configured: i64,
    carried: Option<i64>,
    key: &str,
) -> GeoResult<Option<i64>> {
    match configured {
        PARENT_NONE => Ok(None),
        PARENT_INHERIT => carried
            .map(Some)
            .ok_or_else(|| GeoError::UnsatisfiableInherit(key.to_string())),
        id if id > 0 => Ok(Some(id)),
        other => Err(GeoError::Config(format!(
            "Invalid parent_source_id {} for '{}'",
            other, key
        ))),
    }
}

/// Build the persisted source record from a descriptor.
fn source_record(descriptor: &SourceDescriptor) -> GeoResult<SourceRecord> {
    Ok(SourceRecord {
        name: descriptor.name.clone(),
        publish_date: parse_publish_date(&descriptor.publish_date)?,
        project: descriptor.project.clone(),
        provider: descriptor.provider.clone(),
        category: descriptor.category.clone(),
        auxdata: SourceRecord::normalize_auxdata(&descriptor.aux_data),
    })
}

/// What happened to one entity of the run.
#[derive(Debug)]
pub enum EntityOutcome {
    Ingested {
        source_id: i64,
        stats: IngestStats,
        link: Option<LinkOutcome>,
        /// Set when the spatial join failed (e.g. ambiguous parents);
        /// the entity's rows are kept, the linkage is not applied.
        link_error: Option<String>,
    },
    Skipped {
        reason: String,
    },
}

/// Ordered per-entity outcomes of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(String, EntityOutcome)>,
}

impl RunSummary {
    pub fn ingested(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, EntityOutcome::Ingested { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.len() - self.ingested()
    }
}

/// Iterates the Config Provider's ordered entity list, threading
/// parent-source-id inheritance across iterations.
pub struct Orchestrator {
    provider: Box<dyn ConfigProvider>,
    features: Box<dyn FeatureSource>,
    registrar: Box<dyn Registrar>,
    sink: Box<dyn EntitySink>,
}

impl Orchestrator {
    pub fn new(
        provider: Box<dyn ConfigProvider>,
        features: Box<dyn FeatureSource>,
        registrar: Box<dyn Registrar>,
        sink: Box<dyn EntitySink>,
    ) -> Self {
        Self {
            provider,
            features,
            registrar,
            sink,
        }
    }

    /// Wire the production store into both seams.
    pub fn with_store(
        provider: Box<dyn ConfigProvider>,
        features: Box<dyn FeatureSource>,
        store: Store,
    ) -> Self {
        Self::new(
            provider,
            features,
            Box::new(store.clone()),
            Box::new(StorePipeline::new(store)),
        )
    }

    /// Process every entity in order. Fatal errors abort the run; anything
    /// else skips the entity and moves on.
    pub async fn run(&self) -> GeoResult<RunSummary> {
        let directives = self.provider.directives()?;
        info!(entities = directives.len(), "Ingestion run started");

        let mut summary = RunSummary::default();
        let mut carried: Option<i64> = None;

        for directive in &directives {
            match self.process_entity(directive, carried).await {
                Ok((new_carried, outcome)) => {
                    carried = new_carried;
                    summary.outcomes.push((directive.key.clone(), outcome));
                }
                Err(e) if e.is_fatal() => {
                    error!(entity = %directive.key, error = %e, "Fatal error, aborting run");
                    return Err(e);
                }
                Err(e) => {
                    warn!(entity = %directive.key, error = %e, "Entity failed, continuing");
                    carried = None;
                    summary.outcomes.push((
                        directive.key.clone(),
                        EntityOutcome::Skipped {
                            reason: e.to_string(),
                        },
                    ));
                }
            }
        }

        info!(
            ingested = summary.ingested(),
            skipped = summary.skipped(),
            "Ingestion run completed"
        );
        Ok(summary)
    }

    /// One fold step: `(carried, entity) -> (new_carried, outcome)`.
    async fn process_entity(
        &self,
        directive: &EntityDirective,
        carried: Option<i64>,
    ) -> GeoResult<(Option<i64>, EntityOutcome)> {
        // The inherit sentinel resolves before anything else: asking to
        // inherit with nothing to inherit from aborts the run even when the
        // directive is otherwise broken.
        let parent = resolve_parent(directive.ingest.parent_source_id, carried, &directive.key)?;
        if let Some(parent_id) = parent {
            info!(entity = %directive.key, parent_id, "Parent source resolved");
        }

        // A configuration error skips the whole entity but does not
        // invalidate the carried id: the predecessor still registered.
        if let Err(e) = directive.validate() {
            warn!(entity = %directive.key, error = %e, "Configuration error, entity skipped");
            return Ok((carried, EntityOutcome::Skipped { reason: e.to_string() }));
        }

        let record = match source_record(&directive.source) {
            Ok(record) => record,
            Err(e) => {
                warn!(entity = %directive.key, error = %e, "Configuration error, entity skipped");
                return Ok((carried, EntityOutcome::Skipped { reason: e.to_string() }));
            }
        };

        let reprocess = directive.source.reprocess;
        let source_id = match self.registrar.register(&record, parent, reprocess).await {
            Ok(id) => id,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                // A failed registration cannot be inherited from.
                warn!(entity = %directive.key, error = %e, "Source registration failed, entity skipped");
                return Ok((None, EntityOutcome::Skipped { reason: e.to_string() }));
            }
        };

        let features = match self.features.load(&directive.ingest.file_path).await {
            Ok(features) => features,
            Err(e) => {
                warn!(entity = %directive.key, error = %e, "Feature read failed, entity skipped");
                return Ok((None, EntityOutcome::Skipped { reason: e.to_string() }));
            }
        };

        let stats = self
            .sink
            .ingest(source_id, parent, &features, &directive.ingest, reprocess)
            .await?;

        let (link, link_error) = match parent {
            Some(parent_id) => {
                match self
                    .sink
                    .link(source_id, parent_id, directive.ingest.apply_spatial_join)
                    .await
                {
                    Ok(outcome) => (Some(outcome), None),
                    Err(e) => {
                        error!(entity = %directive.key, error = %e, "Spatial join failed");
                        (None, Some(e.to_string()))
                    }
                }
            }
            None => (None, None),
        };

        Ok((
            Some(source_id),
            EntityOutcome::Ingested {
                source_id,
                stats,
                link,
                link_error,
            },
        ))
    }
}
