//! Snapshot persistence: moves registry snapshots between memory and the
//! metadata cache under `graph_keyspace_<namespace>`.

use std::sync::Arc;

use codex_cache::MetadataCache;
use codex_core::{Deadline, Result, Snapshot};

pub struct SnapshotCache {
    cache: Arc<dyn MetadataCache>,
}

impl SnapshotCache {
    pub fn new(cache: Arc<dyn MetadataCache>) -> Self {
        Self { cache }
    }

    /// Read and verify the cached snapshot for `namespace`, if one exists.
    pub async fn load(&self, namespace: &str, deadline: Deadline) -> Result<Option<Snapshot>> {
        let key = Snapshot::cache_key(namespace);
        if !deadline.run("cache exists", self.cache.exists(&key)).await? {
            return Ok(None);
        }
        match deadline.run("cache get", self.cache.get(&key)).await? {
            Some(bytes) => Ok(Some(Snapshot::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn store(&self, namespace: &str, snapshot: &Snapshot, deadline: Deadline) -> Result<()> {
        let key = Snapshot::cache_key(namespace);
        let bytes = snapshot.to_bytes()?;
        deadline.run("cache set", self.cache.set(&key, &bytes)).await?;
        tracing::debug!(keyspace = %namespace, version = snapshot.version, "Snapshot cached");
        Ok(())
    }

    pub async fn remove(&self, namespace: &str, deadline: Deadline) -> Result<()> {
        let key = Snapshot::cache_key(namespace);
        deadline.run("cache delete", self.cache.delete(&key)).await
    }
}
