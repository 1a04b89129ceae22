//! Hierarchy linker: assigns each ingested entity its parent entity.
//!
//! Thin component over the store's bulk spatial join. Runs only when a
//! parent layer is configured, skips sources that were linked by a
//! previous run, and refuses to update when the parent layer produces
//! ambiguous (multiple-parent) matches.

use tracing::info;

use geoentity_common::GeoResult;
use storage::{LinkOutcome, Store};

/// One-shot spatial parent linkage for a finished entity batch.
pub struct HierarchyLinker {
    store: Store,
}

impl HierarchyLinker {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Link `source_id`'s entities to parents in `parent_source_id`.
    ///
    /// Returns `None` when no parent layer is configured. `apply = false`
    /// is dry-run mode: the update statement is logged, not executed.
    pub async fn link(
        &self,
        source_id: i64,
        parent_source_id: Option<i64>,
        apply: bool,
    ) -> GeoResult<Option<LinkOutcome>> {
        let parent_source_id = match parent_source_id {
            Some(id) => id,
            None => return Ok(None),
        };

        info!(source_id, parent_source_id, apply, "Spatial join started");
        let outcome = self.store.link_parents(source_id, parent_source_id, apply).await?;
        Ok(Some(outcome))
    }
}
