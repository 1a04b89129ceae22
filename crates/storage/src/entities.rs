//! Entity row insertion.
//!
//! One batch covers all features of one source. The batch runs inside a
//! single transaction with a savepoint per row, so an individual bad row
//! rolls back alone while the surviving rows commit together. A duplicate
//! composite id is resolved by the reprocess flag: counted as already
//! present, or fatal to the run (the whole batch rolls back).

use sqlx::Acquire;
use tracing::{error, warn};

use geoentity_common::{GeoError, GeoResult, SRID_WGS84};

use crate::{is_unique_violation, Store};

/// A prepared entity row, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewEntity {
    /// Composite id: configured prefix + coerced raw feature id.
    pub entity_id: String,
    /// Display name, already sanitized.
    pub name: String,
    /// Geometry as GeoJSON text, WGS84 coordinates.
    pub geometry: String,
    /// Expected parent layer, when one is configured.
    pub parent_source_id: Option<i64>,
    /// Auxiliary attribute payload.
    pub auxdata: Option<serde_json::Value>,
}

/// Counts for one insertion batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub processed: u64,
    pub failed: u64,
}

const INSERT_ENTITY_SQL: &str = "INSERT INTO geoentity \
     (geoentity_source_id, geoentity_id, name, geom, parent_geoentity_source_id, auxdata) \
     VALUES ($1, $2, $3, ST_SetSRID(ST_GeomFromGeoJSON($4), $7), $5, $6)";

impl Store {
    /// Insert a batch of entity rows for `source_id`.
    pub async fn insert_entities(
        &self,
        source_id: i64,
        rows: &[NewEntity],
        reprocess: bool,
    ) -> GeoResult<BatchStats> {
        let mut stats = BatchStats::default();

        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| GeoError::Database(format!("Begin failed: {}", e)))?;

        for row in rows {
            // Savepoint keeps a failing row from poisoning the batch.
            let mut sp = tx
                .begin()
                .await
                .map_err(|e| GeoError::Database(format!("Savepoint failed: {}", e)))?;

            let result = sqlx::query(INSERT_ENTITY_SQL)
                .bind(source_id)
                .bind(&row.entity_id)
                .bind(&row.name)
                .bind(&row.geometry)
                .bind(row.parent_source_id)
                .bind(&row.auxdata)
                .bind(SRID_WGS84)
                .execute(&mut *sp)
                .await;

            match result {
                Ok(_) => {
                    sp.commit()
                        .await
                        .map_err(|e| GeoError::Database(format!("Commit failed: {}", e)))?;
                    stats.processed += 1;
                }
                Err(e) if is_unique_violation(&e) => {
                    sp.rollback()
                        .await
                        .map_err(|e| GeoError::Database(format!("Rollback failed: {}", e)))?;
                    if reprocess {
                        // Already present from a previous run.
                        stats.processed += 1;
                    } else {
                        error!(entity_id = %row.entity_id, "Duplicate entity id, aborting run");
                        return Err(GeoError::RowDuplicate(row.entity_id.clone()));
                    }
                }
                Err(e) => {
                    sp.rollback()
                        .await
                        .map_err(|e| GeoError::Database(format!("Rollback failed: {}", e)))?;
                    let err = GeoError::RowInsert(e.to_string());
                    warn!(entity_id = %row.entity_id, error = %err, "Entity insert failed");
                    stats.failed += 1;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| GeoError::Database(format!("Commit failed: {}", e)))?;

        Ok(stats)
    }

    /// Count entity rows for a source.
    pub async fn entity_count(&self, source_id: i64) -> GeoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM geoentity WHERE geoentity_source_id = $1",
        )
        .bind(source_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| GeoError::Database(format!("Count failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_sql_tags_geometry_with_bound_srid() {
        // Geometry arrives as GeoJSON text and is tagged with the shared
        // SRID constant at bind time, never an inlined literal.
        assert!(INSERT_ENTITY_SQL.contains("ST_SetSRID(ST_GeomFromGeoJSON($4), $7)"));
        assert_eq!(SRID_WGS84, 4326);
    }
}
