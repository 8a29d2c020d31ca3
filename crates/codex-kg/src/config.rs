//! Configuration for the Codex facade and CLI.

use serde::Deserialize;

use codex_core::Deadline;
use codex_graph::GraphConfig;

/// Top-level configuration.
///
/// Loaded from `codex.toml` (or another file prefix) and `CODEX__`-prefixed
/// environment variables, with `__` separating nested keys
/// (`CODEX__NEO4J__URI`, `CODEX__CACHE__DIR`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CodexConfig {
    #[serde(default)]
    pub neo4j: GraphConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-operation deadline in seconds. Unset means no deadline.
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
}

impl CodexConfig {
    pub fn load(file_prefix: &str) -> Result<Self, config::ConfigError> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name(file_prefix).required(false))
            .add_source(
                config::Environment::with_prefix("CODEX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        cfg.try_deserialize()
    }

    pub fn deadline(&self) -> Deadline {
        Deadline::from_secs(self.query_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,

    /// Directory for the file backend.
    #[serde(default = "default_cache_dir")]
    pub dir: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::default(),
            dir: default_cache_dir(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// Process-local; snapshots are lost on exit.
    Memory,
    #[default]
    File,
}

fn default_cache_dir() -> String {
    "./codex-cache".to_string()
}
