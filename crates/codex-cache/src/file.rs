//! File-system cache backend.
//!
//! Stores each key as a file in a flat directory:
//! ```text
//! {root}/
//!   graph_keyspace_tech_example.json
//!   graph_keyspace_other.json
//! ```
//! Keys that are not plain file names (spaces, non-ASCII, separators, very
//! long names) are stored under `~{blake3 of the key}.json` instead. `~` never
//! appears in a plain name, so the two forms cannot collide.
//!
//! Writes go to a temporary sibling first and are renamed into place, so a
//! reader never observes a half-written value.

use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;

use crate::{CacheError, MetadataCache};

/// Longest key stored under its own name; leaves room for the extensions
/// within a 255-byte file name.
const MAX_PLAIN_KEY: usize = 200;

pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    /// Create a cache rooted at the given directory, creating it if needed.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Build the file path for a key. The file always lands directly under
    /// the root.
    fn key_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        if key.is_empty() {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        let plain = key.len() <= MAX_PLAIN_KEY
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
        let stem = if plain {
            key.to_string()
        } else {
            format!("~{}", blake3::hash(key.as_bytes()).to_hex())
        };
        Ok(self.root.join(format!("{stem}.json")))
    }
}

#[async_trait]
impl MetadataCache for FileCache {
    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let path = self.key_path(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.key_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), CacheError> {
        let path = self.key_path(key)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).await?;
        fs::rename(&tmp, &path).await?;

        tracing::debug!(key, path = %path.display(), bytes = value.len(), "Cache entry written");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let path = self.key_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
