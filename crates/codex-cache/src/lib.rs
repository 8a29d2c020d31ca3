//! codex-cache: Key/value persistence for schema snapshots.
//!
//! The registry stores one serialized snapshot per keyspace under
//! `graph_keyspace_<name>`. Backends only move opaque bytes; the snapshot
//! format lives in `codex-core`.

pub mod file;
pub mod memory;

use async_trait::async_trait;

use codex_core::CodexError;

pub use file::FileCache;
pub use memory::MemoryCache;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<CacheError> for CodexError {
    fn from(e: CacheError) -> Self {
        match e {
            e @ CacheError::InvalidKey(_) => CodexError::Validation(e.to_string()),
            e => CodexError::Connection(e.to_string()),
        }
    }
}

/// Trait for metadata cache backends.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
