//! Ingester run configuration.
//!
//! One YAML file describes a whole run: the database location and the
//! ordered entity list. The entity list is the Config Provider contract;
//! its order is significant because of parent-source-id inheritance.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

use ingestion::{ConfigProvider, EntityDirective};

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Database connection URL; the DATABASE_URL environment variable
    /// takes precedence when set.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Ordered list of entities to process.
    pub entities: Vec<EntityDirective>,
}

impl RunConfig {
    /// Load a run configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Reading config file {}", path.as_ref().display()))?;
        let config: RunConfig =
            serde_yaml::from_str(&text).context("Parsing run configuration")?;
        Ok(config)
    }

    /// Resolve the database URL, preferring the environment.
    pub fn database_url(&self) -> Result<String> {
        if let Ok(url) = env::var("DATABASE_URL") {
            return Ok(url);
        }
        self.database_url
            .clone()
            .context("No database_url in config and DATABASE_URL unset")
    }
}

impl ConfigProvider for RunConfig {
    fn directives(&self) -> geoentity_common::GeoResult<Vec<EntityDirective>> {
        Ok(self.entities.clone())
    }
}
