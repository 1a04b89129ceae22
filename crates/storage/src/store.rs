//! Database connection pool and schema bootstrap.

use sqlx::{postgres::PgPoolOptions, PgPool};

use geoentity_common::{GeoError, GeoResult};

/// Database connection pool shared by all store operations.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Create a new store connection from a database URL.
    pub async fn connect(database_url: &str) -> GeoResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| GeoError::Connection(format!("Connection failed: {}", e)))?;

        Ok(Self { pool })
    }

    /// Wrap an existing pool (used by tests and by the pyramid builder).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> GeoResult<()> {
        // Split SQL statements and execute them individually
        for statement in SCHEMA_SQL.split(';') {
            let trimmed = statement.trim();
            if !trimmed.is_empty() {
                sqlx::query(trimmed)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| GeoError::Database(format!("Migration failed: {}", e)))?;
            }
        }

        Ok(())
    }
}

/// Database schema SQL.
const SCHEMA_SQL: &str = r#"
CREATE EXTENSION IF NOT EXISTS postgis;

CREATE TABLE IF NOT EXISTS geoentity_source (
    id BIGSERIAL PRIMARY KEY,
    name VARCHAR(200) NOT NULL,
    publish_date BIGINT NOT NULL,
    project VARCHAR(200) NOT NULL,
    provider VARCHAR(200) NOT NULL,
    category VARCHAR(200) NOT NULL,
    auxdata TEXT,
    parent_source_id BIGINT REFERENCES geoentity_source(id),

    UNIQUE(name, publish_date, project, provider, category)
);

CREATE TABLE IF NOT EXISTS geoentity (
    geoentity_source_id BIGINT NOT NULL REFERENCES geoentity_source(id),
    geoentity_id VARCHAR(100) NOT NULL,
    name VARCHAR(500) NOT NULL,
    geom GEOMETRY(Geometry, 4326) NOT NULL,
    parent_geoentity_source_id BIGINT,
    parent_id VARCHAR(100),
    parent_name VARCHAR(500),
    auxdata JSONB,

    UNIQUE(geoentity_source_id, geoentity_id)
);

CREATE INDEX IF NOT EXISTS idx_geoentity_source_id ON geoentity(geoentity_source_id);
CREATE INDEX IF NOT EXISTS idx_geoentity_geom ON geoentity USING GIST(geom);

CREATE TABLE IF NOT EXISTS geoentity_pyramid_levels (
    geoentity_source_id BIGINT NOT NULL,
    geoentity_id VARCHAR(100) NOT NULL,
    level INTEGER NOT NULL,
    geom GEOMETRY(Geometry, 4326)
);

CREATE INDEX IF NOT EXISTS idx_pyramid_source_level ON geoentity_pyramid_levels(geoentity_source_id, level);
CREATE INDEX IF NOT EXISTS idx_pyramid_geom ON geoentity_pyramid_levels USING GIST(geom);
"#;
