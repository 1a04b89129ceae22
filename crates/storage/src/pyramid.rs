//! Pyramid level SQL: delete-then-rebuild insert-selects.
//!
//! Level 0 copies entity geometry verbatim. Every later level reads only
//! the surviving rows of the level below it, never the entity table, so
//! the id set can only shrink going up the ladder.

use sqlx::FromRow;

use geoentity_common::{GeoError, GeoResult};

use crate::Store;

/// One source with no pyramid rows at all.
#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct UnpyramidedSource {
    pub id: i64,
    pub name: String,
}

impl Store {
    /// Delete all pyramid rows for a source. Returns rows removed.
    pub async fn delete_pyramid_levels(&self, source_id: i64) -> GeoResult<u64> {
        let result = sqlx::query(
            "DELETE FROM geoentity_pyramid_levels WHERE geoentity_source_id = $1",
        )
        .bind(source_id)
        .execute(self.pool())
        .await
        .map_err(|e| GeoError::Database(format!("Pyramid delete failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    /// Populate level 0 from the entity table.
    ///
    /// Polygons must survive a zero-width-buffer repair to enter the
    /// pyramid at all; irreparably invalid polygons are dropped here and
    /// therefore absent from every level.
    pub async fn seed_pyramid_base(&self, source_id: i64, is_polygon: bool) -> GeoResult<u64> {
        let sql = if is_polygon {
            "INSERT INTO geoentity_pyramid_levels (geoentity_source_id, geoentity_id, level, geom) \
             SELECT geoentity_source_id, geoentity_id, 0, geom FROM geoentity \
             WHERE geoentity_source_id = $1 AND ST_IsValid(ST_Buffer(geom, 0))"
        } else {
            "INSERT INTO geoentity_pyramid_levels (geoentity_source_id, geoentity_id, level, geom) \
             SELECT geoentity_source_id, geoentity_id, 0, geom FROM geoentity \
             WHERE geoentity_source_id = $1"
        };

        let result = sqlx::query(sql)
            .bind(source_id)
            .execute(self.pool())
            .await
            .map_err(|e| GeoError::Database(format!("Pyramid base insert failed: {}", e)))?;

        Ok(result.rows_affected())
    }

    /// Derive level `level` (>= 1) from level `level - 1`.
    ///
    /// Polygon rows pass through simplify, snap-to-grid, zero-width-buffer
    /// repair and ST_MakeValid; results that come out null, empty, or still
    /// invalid are excluded from the level. Non-polygon rows carry their
    /// geometry forward unchanged.
    pub async fn derive_pyramid_level(
        &self,
        source_id: i64,
        level: i32,
        tolerance: f64,
        grid_size: f64,
        is_polygon: bool,
    ) -> GeoResult<u64> {
        let result = if is_polygon {
            sqlx::query(
                "INSERT INTO geoentity_pyramid_levels \
                     (geoentity_source_id, geoentity_id, level, geom) \
                 SELECT geoentity_source_id, geoentity_id, $2, simplified FROM ( \
                     SELECT geoentity_source_id, geoentity_id, \
                            ST_MakeValid(ST_Buffer(ST_SnapToGrid( \
                                ST_SimplifyPreserveTopology(geom, $3), 0, 0, $4, $4), 0)) AS simplified \
                     FROM geoentity_pyramid_levels \
                     WHERE geoentity_source_id = $1 AND level = $2 - 1 \
                       AND geom IS NOT NULL AND NOT ST_IsEmpty(geom) AND ST_IsValid(geom) \
                 ) AS candidate \
                 WHERE simplified IS NOT NULL \
                   AND NOT ST_IsEmpty(simplified) AND ST_IsValid(simplified)",
            )
            .bind(source_id)
            .bind(level)
            .bind(tolerance)
            .bind(grid_size)
            .execute(self.pool())
            .await
        } else {
            sqlx::query(
                "INSERT INTO geoentity_pyramid_levels \
                     (geoentity_source_id, geoentity_id, level, geom) \
                 SELECT geoentity_source_id, geoentity_id, $2, geom \
                 FROM geoentity_pyramid_levels \
                 WHERE geoentity_source_id = $1 AND level = $2 - 1 \
                   AND geom IS NOT NULL AND NOT ST_IsEmpty(geom) AND ST_IsValid(geom)",
            )
            .bind(source_id)
            .bind(level)
            .execute(self.pool())
            .await
        };

        result
            .map(|r| r.rows_affected())
            .map_err(|e| GeoError::Database(format!("Pyramid level insert failed: {}", e)))
    }

    /// Sources that have no pyramid rows at all.
    pub async fn sources_without_pyramid(&self) -> GeoResult<Vec<UnpyramidedSource>> {
        sqlx::query_as::<_, UnpyramidedSource>(
            "SELECT DISTINCT gs.id, gs.name \
             FROM geoentity_source AS gs \
             LEFT JOIN geoentity_pyramid_levels AS gpl \
               ON gs.id = gpl.geoentity_source_id \
             WHERE gpl.geoentity_source_id IS NULL \
             ORDER BY gs.id",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| GeoError::Database(format!("Pyramid report failed: {}", e)))
    }
}
