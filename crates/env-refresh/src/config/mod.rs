//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// SHA-256 of the serialized configuration, stamped into every run result.
    pub fn hash(&self) -> String {
        let yaml = serde_yaml::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(yaml.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl PgEndpoint {
    /// Build a tokio-postgres config for one database on this server.
    pub fn pg_config(&self, database: &str) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&self.host);
        pg_config.port(self.port);
        pg_config.dbname(database);
        pg_config.user(&self.user);
        pg_config.password(&self.password);
        pg_config
    }

    /// `host:port` label used in logs and errors.
    pub fn label(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl SearchEndpoint {
    /// Identity of the endpoint for same-cluster checks.
    pub fn label(&self) -> String {
        self.url
            .clone()
            .or_else(|| self.cloud_id.clone())
            .unwrap_or_default()
    }
}
