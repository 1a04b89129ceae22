//! Spatial parent linkage: one bulk update per child layer.
//!
//! A child belongs to the parent whose geometry intersects it and contains
//! its centroid. The centroid clause is the tie-break for children
//! straddling parent boundaries; with non-overlapping parents at most one
//! parent wins per child. Overlapping parents can still produce more than
//! one centroid match, which is detected up front and refused instead of
//! letting the update pick an arbitrary winner.

use tracing::{info, warn};

use geoentity_common::{GeoError, GeoResult};

use crate::Store;

/// What the linker did for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// Bulk update applied; number of child rows rewritten.
    Applied { rows: u64 },
    /// Dry-run mode: the update was logged, not executed.
    DryRun { sql: String },
    /// A previous run already linked this source.
    AlreadyLinked,
}

/// Bulk update assigning each child to its containing parent and rewriting
/// the composite id to parent-first concatenation.
/// `$1` = child source id, `$2` = parent source id.
const PARENT_LINK_SQL: &str = "UPDATE geoentity AS child \
     SET geoentity_id = CONCAT(parent.geoentity_id, child.geoentity_id), \
         parent_id = parent.geoentity_id, \
         parent_name = parent.name, \
         parent_geoentity_source_id = parent.geoentity_source_id \
     FROM (SELECT geoentity_source_id, geoentity_id, name, geom \
           FROM geoentity WHERE geoentity_source_id = $2) AS parent \
     WHERE child.geoentity_source_id = $1 \
       AND ST_Intersects(parent.geom, child.geom) \
       AND ST_Contains(parent.geom, ST_Centroid(child.geom))";

/// The statement the linker would run, for dry-run reporting.
pub fn parent_link_sql() -> &'static str {
    PARENT_LINK_SQL
}

impl Store {
    /// True when any entity of `source_id` already carries a parent name.
    pub async fn already_linked(&self, source_id: i64) -> GeoResult<bool> {
        let linked = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM geoentity \
             WHERE geoentity_source_id = $1 AND parent_name IS NOT NULL",
        )
        .bind(source_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| GeoError::Database(format!("Link guard query failed: {}", e)))?;

        Ok(linked > 0)
    }

    /// Count children whose centroid falls inside more than one parent.
    /// Nonzero means the parent layer overlaps itself and the update
    /// outcome would be arbitrary.
    pub async fn ambiguous_parent_count(
        &self,
        source_id: i64,
        parent_source_id: i64,
    ) -> GeoResult<i64> {
        sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM ( \
                 SELECT child.geoentity_id \
                 FROM geoentity AS child \
                 JOIN geoentity AS parent \
                   ON parent.geoentity_source_id = $2 \
                  AND ST_Intersects(parent.geom, child.geom) \
                  AND ST_Contains(parent.geom, ST_Centroid(child.geom)) \
                 WHERE child.geoentity_source_id = $1 \
                 GROUP BY child.geoentity_id \
                 HAVING COUNT(*) > 1 \
             ) AS ambiguous",
        )
        .bind(source_id)
        .bind(parent_source_id)
        .fetch_one(self.pool())
        .await
        .map_err(|e| GeoError::Database(format!("Ambiguity check failed: {}", e)))
    }

    /// Run the spatial join for one child layer.
    ///
    /// When `apply` is false the update is only logged (dry-run mode).
    pub async fn link_parents(
        &self,
        source_id: i64,
        parent_source_id: i64,
        apply: bool,
    ) -> GeoResult<LinkOutcome> {
        if self.already_linked(source_id).await? {
            info!(source_id, "Parent linkage already performed, skipping");
            return Ok(LinkOutcome::AlreadyLinked);
        }

        let ambiguous = self
            .ambiguous_parent_count(source_id, parent_source_id)
            .await?;
        if ambiguous > 0 {
            return Err(GeoError::AmbiguousParent {
                parent_source_id,
                child_count: ambiguous,
            });
        }

        if !apply {
            warn!(source_id, parent_source_id, sql = PARENT_LINK_SQL, "Spatial join dry run");
            return Ok(LinkOutcome::DryRun {
                sql: PARENT_LINK_SQL.to_string(),
            });
        }

        let result = sqlx::query(PARENT_LINK_SQL)
            .bind(source_id)
            .bind(parent_source_id)
            .execute(self.pool())
            .await
            .map_err(|e| GeoError::Database(format!("Spatial join failed: {}", e)))?;

        info!(source_id, parent_source_id, rows = result.rows_affected(), "Spatial join applied");
        Ok(LinkOutcome::Applied {
            rows: result.rows_affected(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_sql_rewrites_id_parent_first() {
        let sql = parent_link_sql();
        assert!(sql.contains("CONCAT(parent.geoentity_id, child.geoentity_id)"));
    }

    #[test]
    fn link_sql_uses_centroid_tiebreak() {
        let sql = parent_link_sql();
        assert!(sql.contains("ST_Intersects(parent.geom, child.geom)"));
        assert!(sql.contains("ST_Contains(parent.geom, ST_Centroid(child.geom))"));
    }

    #[test]
    fn link_sql_sets_all_parent_fields() {
        let sql = parent_link_sql();
        assert!(sql.contains("parent_id = parent.geoentity_id"));
        assert!(sql.contains("parent_name = parent.name"));
        assert!(sql.contains("parent_geoentity_source_id = parent.geoentity_source_id"));
    }
}
