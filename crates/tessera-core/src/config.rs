//! Configuration management for Tessera.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`TESSERA__` prefix, `__` separator)
//! 2. Config file (`tessera.toml` by default)
//! 3. Defaults

use serde::Deserialize;

use crate::error::TesseraError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TesseraConfig {
    /// Connection settings for Neo4j (`[neo4j]`).
    #[serde(default)]
    pub neo4j: GraphConfig,

    /// Write engine settings (`[write]`).
    #[serde(default)]
    pub write: WriteSettings,
}

impl TesseraConfig {
    /// Load configuration from `<file_prefix>.toml` (optional) and the environment.
    pub fn load(file_prefix: &str) -> Result<Self, TesseraError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("TESSERA")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        let loaded: Self = cfg
            .try_deserialize()
            .map_err(|e| TesseraError::Config(e.to_string()))?;

        tracing::debug!(
            uri = %loaded.neo4j.uri,
            entity_base_url = %loaded.write.entity_base_url,
            "Configuration loaded"
        );
        Ok(loaded)
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: default_password(),
            max_connections: default_max_connections(),
            fetch_size: default_fetch_size(),
        }
    }
}

/// Settings that shape the statements the write engine produces.
#[derive(Debug, Clone, Deserialize)]
pub struct WriteSettings {
    /// Base URL for canonical entity URIs: `<base><type>/<id>`.
    #[serde(default = "default_entity_base_url")]
    pub entity_base_url: String,

    /// Username recorded on audit records when the caller names nobody.
    #[serde(default = "default_username")]
    pub default_user: String,

    /// Whether the executor runs the deferred statement after the primary one.
    #[serde(default = "default_true")]
    pub run_deferred: bool,
}

impl WriteSettings {
    /// Canonical URI of a head entity.
    pub fn canonical_uri(&self, type_name: &str, id: &impl std::fmt::Display) -> String {
        let base = self.entity_base_url.trim_end_matches('/');
        format!("{base}/{type_name}/{id}")
    }
}

impl Default for WriteSettings {
    fn default() -> Self {
        Self {
            entity_base_url: default_entity_base_url(),
            default_user: default_username(),
            run_deferred: true,
        }
    }
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_password() -> String {
    "tessera-dev".to_string()
}

fn default_max_connections() -> u32 {
    16
}

fn default_fetch_size() -> usize {
    256
}

fn default_entity_base_url() -> String {
    "http://example.org/entities/".to_string()
}

fn default_username() -> String {
    "DefaultUser".to_string()
}

fn default_true() -> bool {
    true
}
