//! Schema registry: the in-memory entity, relationship, and rule maps of each
//! open namespace, kept in step with the metadata cache.
//!
//! Every handle a registry gives out for one namespace shares a single
//! snapshot behind an async mutex. Mutations go through a [`SchemaWriter`],
//! which holds the lock for the whole load or rule definition, so writers in
//! one process queue behind each other. Writers in other processes are
//! detected on commit by comparing the cached snapshot's `version` with the
//! one this process last wrote.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Mutex, MutexGuard};

use codex_cache::MetadataCache;
use codex_core::{
    CodexError, Deadline, EntityRelation, EntityTypeDescriptor, RelationshipTypeDescriptor,
    Result, RuleResult, Snapshot,
};
use codex_graph::{ident, GraphStore};

use crate::snapshot::SnapshotCache;

/// Handle to an open namespace. Clones, and other handles opened through the
/// same registry, share one in-memory snapshot.
#[derive(Clone)]
pub struct Namespace {
    name: String,
    state: Arc<Mutex<Snapshot>>,
}

impl Namespace {
    fn shared(name: &str, state: Arc<Mutex<Snapshot>>) -> Self {
        Self {
            name: name.to_string(),
            state,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cache_key(&self) -> String {
        Snapshot::cache_key(&self.name)
    }

    /// A copy of the current snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        self.state.lock().await.clone()
    }

    pub async fn lookup_entity(&self, name: &str) -> Option<EntityTypeDescriptor> {
        self.state.lock().await.entity(name).cloned()
    }

    pub async fn lookup_relationship(&self, name: &str) -> Option<RelationshipTypeDescriptor> {
        self.state.lock().await.relationship(name).cloned()
    }

    pub async fn lookup_rule(&self, name: &str) -> Option<RuleResult> {
        self.state.lock().await.rules_map.get(name).cloned()
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace").field("name", &self.name).finish()
    }
}

/// Opens namespaces and persists their snapshots.
pub struct SchemaRegistry {
    cache: SnapshotCache,
    open: Mutex<HashMap<String, Arc<Mutex<Snapshot>>>>,
}

impl SchemaRegistry {
    pub fn new(cache: Arc<dyn MetadataCache>) -> Self {
        Self {
            cache: SnapshotCache::new(cache),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Load the cached snapshot for `name`, or create the keyspace and cache
    /// an empty snapshot if there is none. A namespace this registry already
    /// opened is refreshed from the cache when another process has moved it
    /// ahead, and the returned handle shares the existing snapshot.
    pub async fn open_namespace(
        &self,
        graph: &dyn GraphStore,
        name: &str,
        deadline: Deadline,
    ) -> Result<Namespace> {
        ident(name)?;

        if let Some(snapshot) = self.cache.load(name, deadline).await? {
            tracing::info!(
                keyspace = %name,
                version = snapshot.version,
                entities = snapshot.entity_map.len(),
                relationships = snapshot.rel_map.len(),
                "Namespace loaded from cache"
            );
            return Ok(self.share(name, snapshot, false).await);
        }

        deadline
            .run("create keyspace", graph.create_keyspace(name))
            .await?;
        let mut snapshot = Snapshot::default();
        snapshot.updated_at = Some(Utc::now());
        snapshot.seal()?;
        self.cache.store(name, &snapshot, deadline).await?;

        tracing::info!(keyspace = %name, "Namespace created");
        Ok(self.share(name, snapshot, true).await)
    }

    /// Hand out the shared state for `name`. `snapshot` replaces what this
    /// registry holds when it is newer, or always when `reset` is set.
    async fn share(&self, name: &str, snapshot: Snapshot, reset: bool) -> Namespace {
        let mut open = self.open.lock().await;
        let Some(state) = open.get(name).cloned() else {
            let state = Arc::new(Mutex::new(snapshot));
            open.insert(name.to_string(), state.clone());
            return Namespace::shared(name, state);
        };
        drop(open);

        let mut current = state.lock().await;
        if reset || snapshot.version > current.version {
            *current = snapshot;
        }
        drop(current);
        Namespace::shared(name, state)
    }

    /// Drop the cached snapshot of a namespace. Handles still held keep their
    /// last snapshot; the next open starts afresh.
    pub async fn forget_namespace(&self, name: &str, deadline: Deadline) -> Result<()> {
        self.open.lock().await.remove(name);
        self.cache.remove(name, deadline).await
    }

    /// Lock the namespace for a mutating operation.
    pub async fn writer<'a>(&'a self, namespace: &'a Namespace) -> SchemaWriter<'a> {
        SchemaWriter {
            cache: &self.cache,
            namespace: &namespace.name,
            snapshot: namespace.state.lock().await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Section {
    Entities,
    Relationships,
    Rules,
}

/// Exclusive access to one namespace's snapshot for the duration of a
/// mutating operation. Every `add_*` call is committed to the cache before it
/// returns.
pub struct SchemaWriter<'a> {
    cache: &'a SnapshotCache,
    namespace: &'a str,
    snapshot: MutexGuard<'a, Snapshot>,
}

impl SchemaWriter<'_> {
    pub fn current(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Register an entity type. An identical re-registration is a no-op; a
    /// different definition under the same name is a schema error.
    pub async fn add_entity_type(
        &mut self,
        descriptor: EntityTypeDescriptor,
        deadline: Deadline,
    ) -> Result<()> {
        if let Some(existing) = self.snapshot.entity(&descriptor.name) {
            return existing.ensure_same_definition(&descriptor);
        }

        let mut next = self.snapshot.clone();
        next.entity_map.insert(descriptor.name.clone(), descriptor);
        self.commit(next, &[Section::Entities], deadline).await
    }

    /// Register a relationship type and record it on both participating
    /// entity types. When one type plays both roles, role 1 is recorded.
    pub async fn add_relationship_type(
        &mut self,
        descriptor: RelationshipTypeDescriptor,
        deadline: Deadline,
    ) -> Result<()> {
        if let Some(existing) = self.snapshot.relationship(&descriptor.name) {
            existing.ensure_same_definition(&descriptor)?;
        }

        let mut next = self.snapshot.clone();
        let sides = [
            (&descriptor.role2, &descriptor.role1),
            (&descriptor.role1, &descriptor.role2),
        ];
        for (player, counterpart) in sides {
            let entity = next.entity_map.get_mut(&player.entity).ok_or_else(|| {
                CodexError::Schema(format!("missing entity type: {}", player.entity))
            })?;
            entity.relationships.insert(
                descriptor.name.clone(),
                EntityRelation {
                    plays: player.role.clone(),
                    with_ent: counterpart.entity.clone(),
                },
            );
        }
        next.rel_map.insert(descriptor.name.clone(), descriptor);
        self.commit(next, &[Section::Entities, Section::Relationships], deadline)
            .await
    }

    /// Record a rule, replacing any rule of the same name.
    pub async fn add_rule(&mut self, rule: RuleResult, deadline: Deadline) -> Result<()> {
        let mut next = self.snapshot.clone();
        next.rules_map.insert(rule.name.clone(), rule);
        self.commit(next, &[Section::Rules], deadline).await
    }

    /// Read the cached snapshot, check nobody else wrote since this handle
    /// last did, merge the touched sections, and write it back.
    async fn commit(&mut self, next: Snapshot, sections: &[Section], deadline: Deadline) -> Result<()> {
        let cached = self.cache.load(self.namespace, deadline).await?;
        let found = cached.as_ref().map_or(0, |s| s.version);
        if found != self.snapshot.version {
            return Err(CodexError::Conflict {
                keyspace: self.namespace.to_string(),
                expected: self.snapshot.version,
                found,
            });
        }

        let mut merged = cached.unwrap_or_default();
        for section in sections {
            match section {
                Section::Entities => merged.entity_map = next.entity_map.clone(),
                Section::Relationships => merged.rel_map = next.rel_map.clone(),
                Section::Rules => merged.rules_map = next.rules_map.clone(),
            }
        }
        merged.version = found + 1;
        merged.updated_at = Some(Utc::now());
        merged.seal()?;

        self.cache.store(self.namespace, &merged, deadline).await?;
        tracing::debug!(keyspace = %self.namespace, version = merged.version, "Schema committed");
        *self.snapshot = merged;
        Ok(())
    }
}
