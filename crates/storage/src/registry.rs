//! Source registry: provenance rows for ingested dataset layers.
//!
//! A source is created once per distinct natural key
//! (name, publish_date, project, provider, category) and never mutated
//! afterwards. Re-registration of an existing key is resolved through the
//! caller's reprocess flag: reuse the existing id, or refuse.

use tracing::{info, warn};

use geoentity_common::{GeoError, GeoResult};

use crate::{is_unique_violation, Store};

/// Attribute set for one source row, natural key first.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub name: String,
    /// Epoch seconds, UTC midnight of the publication date.
    pub publish_date: i64,
    pub project: String,
    pub provider: String,
    pub category: String,
    /// Free-form auxiliary text; `None` when the input was empty or a
    /// spelling of "NULL".
    pub auxdata: Option<String>,
}

impl SourceRecord {
    /// Normalize raw auxiliary text the way the source table expects it:
    /// empty strings and the literal spellings of NULL become SQL NULL.
    pub fn normalize_auxdata(raw: &str) -> Option<String> {
        match raw {
            "" | "NULL" | "null" | "Null" => None,
            other => Some(other.to_string()),
        }
    }
}

impl Store {
    /// Register a source, returning its id.
    ///
    /// The id sequence is reconciled to the current table maximum first,
    /// guarding against manual edits to the table. On a natural-key
    /// conflict the existing id is returned when `reprocess` is set;
    /// otherwise the conflict is surfaced as [`GeoError::DuplicateSource`].
    pub async fn register_source(
        &self,
        record: &SourceRecord,
        parent_source_id: Option<i64>,
        reprocess: bool,
    ) -> GeoResult<i64> {
        self.reconcile_source_sequence().await?;

        let inserted = sqlx::query_scalar::<_, i64>(
            "INSERT INTO geoentity_source \
             (name, publish_date, project, provider, category, auxdata, parent_source_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id",
        )
        .bind(&record.name)
        .bind(record.publish_date)
        .bind(&record.project)
        .bind(&record.provider)
        .bind(&record.category)
        .bind(&record.auxdata)
        .bind(parent_source_id)
        .fetch_one(self.pool())
        .await;

        match inserted {
            Ok(id) => {
                info!(source = %record.name, id, "Source registered");
                Ok(id)
            }
            Err(e) if is_unique_violation(&e) => {
                if reprocess {
                    let existing = self.find_source_id(record).await?.ok_or_else(|| {
                        GeoError::Database(format!(
                            "Duplicate reported for '{}' but natural-key lookup found nothing",
                            record.name
                        ))
                    })?;
                    warn!(source = %record.name, id = existing, "Source already registered, reusing id");
                    Ok(existing)
                } else {
                    Err(GeoError::DuplicateSource {
                        name: record.name.clone(),
                        publish_date: record.publish_date,
                        project: record.project.clone(),
                        provider: record.provider.clone(),
                        category: record.category.clone(),
                    })
                }
            }
            Err(e) => Err(GeoError::Database(format!("Source insert failed: {}", e))),
        }
    }

    /// Look up a source id by natural key.
    pub async fn find_source_id(&self, record: &SourceRecord) -> GeoResult<Option<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM geoentity_source \
             WHERE name = $1 AND publish_date = $2 AND project = $3 \
               AND provider = $4 AND category = $5",
        )
        .bind(&record.name)
        .bind(record.publish_date)
        .bind(&record.project)
        .bind(&record.provider)
        .bind(&record.category)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| GeoError::Database(format!("Source lookup failed: {}", e)))
    }

    /// Re-point the source id sequence at MAX(id) so the next insert cannot
    /// collide with rows added outside this service.
    async fn reconcile_source_sequence(&self) -> GeoResult<()> {
        sqlx::query(
            "SELECT setval(pg_get_serial_sequence('geoentity_source', 'id'), \
             GREATEST(COALESCE((SELECT MAX(id) FROM geoentity_source), 1), 1))",
        )
        .execute(self.pool())
        .await
        .map_err(|e| GeoError::Database(format!("Sequence reconcile failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auxdata_null_spellings_normalize() {
        assert_eq!(SourceRecord::normalize_auxdata(""), None);
        assert_eq!(SourceRecord::normalize_auxdata("NULL"), None);
        assert_eq!(SourceRecord::normalize_auxdata("null"), None);
        assert_eq!(SourceRecord::normalize_auxdata("Null"), None);
        assert_eq!(
            SourceRecord::normalize_auxdata("survey of 2023"),
            Some("survey of 2023".to_string())
        );
    }
}
