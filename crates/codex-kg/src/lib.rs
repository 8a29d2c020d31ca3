//! codex-kg: Map tables of entities and relationships onto a typed graph
//! schema, and answer structured queries against it.
//!
//! The [`CodexKg`] facade ties together the schema registry (cached per
//! namespace), the entity and relationship loaders, and the query translator.
//! Every public operation opens one graph session, does its work, and drops
//! the session before returning, on success and on error alike.

pub mod config;
pub mod entity;
pub mod registry;
pub mod relationship;
pub mod report;
pub mod snapshot;
pub mod translate;

pub use config::{CacheBackend, CacheConfig, CodexConfig};
pub use entity::EntityLoader;
pub use registry::{Namespace, SchemaRegistry, SchemaWriter};
pub use relationship::RelationshipLoader;
pub use report::{LoadReport, RowError};
pub use translate::{ClusterPlan, FindPlan, QueryTranslator};

use std::sync::Arc;

use chrono::Utc;

use codex_cache::{FileCache, MemoryCache, MetadataCache};
use codex_core::{
    Deadline, EntityTypeDescriptor, QueryDescriptor, QueryResult, RelationshipTypeDescriptor,
    Result, RuleResult, Table,
};
use codex_graph::{
    ident, CompiledQuery, GraphSession, GraphStore, Neo4jStore, QueryMode, Record,
};

/// Entry point for loading and querying.
pub struct CodexKg {
    graph: Arc<dyn GraphStore>,
    registry: SchemaRegistry,
}

impl CodexKg {
    pub fn new(graph: Arc<dyn GraphStore>, cache: Arc<dyn MetadataCache>) -> Self {
        Self {
            graph,
            registry: SchemaRegistry::new(cache),
        }
    }

    /// Build a Neo4j-backed instance with the configured cache backend.
    pub fn from_config(config: &CodexConfig) -> Result<Self> {
        let graph = Arc::new(Neo4jStore::new(config.neo4j.clone()));
        let cache: Arc<dyn MetadataCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryCache::new()),
            CacheBackend::File => Arc::new(FileCache::new(&config.cache.dir)?),
        };
        Ok(Self::new(graph, cache))
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    // ── Namespaces ───────────────────────────────────────────────

    pub async fn list_keyspaces(&self, deadline: Deadline) -> Result<Vec<String>> {
        logged(
            "list_keyspaces",
            deadline.run("list keyspaces", self.graph.list_keyspaces()).await,
        )
    }

    pub async fn open_namespace(&self, name: &str, deadline: Deadline) -> Result<Namespace> {
        logged(
            "open_namespace",
            self.registry
                .open_namespace(self.graph.as_ref(), name, deadline)
                .await,
        )
    }

    /// Release a handle. The cached snapshot already reflects every committed
    /// mutation, so nothing is written.
    pub fn close_namespace(&self, namespace: Namespace) {
        tracing::debug!(keyspace = %namespace.name(), "Namespace closed");
    }

    /// Remove the keyspace from the graph and its snapshot from the cache.
    pub async fn delete_namespace(&self, name: &str, deadline: Deadline) -> Result<()> {
        logged("delete_namespace", self.try_delete_namespace(name, deadline).await)
    }

    // ── Loading ──────────────────────────────────────────────────

    /// Register an entity type derived from `table` and insert every row.
    pub async fn load_entity(
        &self,
        namespace: &Namespace,
        table: &Table,
        name: &str,
        key: Option<&str>,
        deadline: Deadline,
    ) -> Result<LoadReport<EntityTypeDescriptor>> {
        logged(
            "load_entity",
            self.try_load_entity(namespace, table, name, key, deadline)
                .await,
        )
    }

    /// Register a relationship type between two loaded entity types and insert
    /// one relationship per row.
    pub async fn load_relationship(
        &self,
        namespace: &Namespace,
        table: &Table,
        name: &str,
        entity1: &str,
        entity2: &str,
        deadline: Deadline,
    ) -> Result<LoadReport<RelationshipTypeDescriptor>> {
        logged(
            "load_relationship",
            self.try_load_relationship(namespace, table, name, entity1, entity2, deadline)
                .await,
        )
    }

    // ── Queries ──────────────────────────────────────────────────

    /// Send a statement to the graph store as-is. Write mode runs it in a
    /// transaction.
    pub async fn run_raw(
        &self,
        namespace: &Namespace,
        statement: &str,
        mode: QueryMode,
        deadline: Deadline,
    ) -> Result<Vec<Record>> {
        logged(
            "run_raw",
            self.try_run_raw(namespace, statement, mode, deadline).await,
        )
    }

    /// Translate and run a structured query. Descriptors are checked before
    /// any store call; a failed query returns no partial result.
    pub async fn run_query(
        &self,
        namespace: &Namespace,
        descriptor: &QueryDescriptor,
        deadline: Deadline,
    ) -> Result<QueryResult> {
        logged(
            descriptor.action(),
            self.try_run_query(namespace, descriptor, deadline).await,
        )
    }

    // ── Operation bodies ─────────────────────────────────────────

    async fn try_delete_namespace(&self, name: &str, deadline: Deadline) -> Result<()> {
        ident(name)?;
        deadline
            .run("delete keyspace", self.graph.delete_keyspace(name))
            .await?;
        self.registry.forget_namespace(name, deadline).await?;
        tracing::info!(keyspace = %name, "Namespace deleted");
        Ok(())
    }

    async fn try_load_entity(
        &self,
        namespace: &Namespace,
        table: &Table,
        name: &str,
        key: Option<&str>,
        deadline: Deadline,
    ) -> Result<LoadReport<EntityTypeDescriptor>> {
        let mut writer = self.registry.writer(namespace).await;
        let described = EntityLoader::describe(table, name, key)?;
        if let Some(existing) = writer.current().entity(name) {
            existing.ensure_same_definition(&described)?;
        }

        let session = self.session(namespace, deadline).await?;
        let loader = EntityLoader::new(session.as_ref(), deadline);
        loader.define(&described).await?;
        let outcome = loader.insert_rows(&described, table).await?;

        writer.add_entity_type(described.clone(), deadline).await?;
        let descriptor = writer
            .current()
            .entity(name)
            .cloned()
            .unwrap_or(described);
        tracing::info!(
            keyspace = %namespace.name(),
            entity = %name,
            inserted = outcome.inserted,
            "Entity loaded"
        );
        Ok(outcome.into_report(descriptor))
    }

    async fn try_load_relationship(
        &self,
        namespace: &Namespace,
        table: &Table,
        name: &str,
        entity1: &str,
        entity2: &str,
        deadline: Deadline,
    ) -> Result<LoadReport<RelationshipTypeDescriptor>> {
        let mut writer = self.registry.writer(namespace).await;
        let descriptor = {
            let snapshot = writer.current();
            let first = snapshot.require_entity(entity1)?;
            let second = snapshot.require_entity(entity2)?;
            let described = RelationshipLoader::describe(table, name, first, second)?;
            if let Some(existing) = snapshot.relationship(name) {
                existing.ensure_same_definition(&described)?;
            }
            described
        };

        let session = self.session(namespace, deadline).await?;
        let loader = RelationshipLoader::new(session.as_ref(), deadline);
        loader.define(&descriptor).await?;
        let outcome = loader.insert_rows(&descriptor, table).await?;

        writer
            .add_relationship_type(descriptor.clone(), deadline)
            .await?;
        tracing::info!(
            keyspace = %namespace.name(),
            relationship = %name,
            inserted = outcome.inserted,
            "Relationship loaded"
        );
        Ok(outcome.into_report(descriptor))
    }

    async fn try_run_raw(
        &self,
        namespace: &Namespace,
        statement: &str,
        mode: QueryMode,
        deadline: Deadline,
    ) -> Result<Vec<Record>> {
        let session = self.session(namespace, deadline).await?;
        let query = CompiledQuery::new(statement);
        match mode {
            QueryMode::Read => deadline.run("raw read", session.query(&query)).await,
            QueryMode::Write => deadline.run("raw write", session.execute(&query)).await,
        }
    }

    async fn try_run_query(
        &self,
        namespace: &Namespace,
        descriptor: &QueryDescriptor,
        deadline: Deadline,
    ) -> Result<QueryResult> {
        descriptor.validate()?;
        match descriptor {
            QueryDescriptor::Find(query) => {
                let plan = QueryTranslator::new(&namespace.snapshot().await).find(query)?;
                let session = self.session(namespace, deadline).await?;
                let records = deadline.run("find", session.query(&plan.query)).await?;
                Ok(QueryResult::Find(plan.reshape(&records)?))
            }
            QueryDescriptor::Compute(query) => {
                let compiled = QueryTranslator::new(&namespace.snapshot().await).compute(query)?;
                let session = self.session(namespace, deadline).await?;
                let records = deadline.run("compute", session.query(&compiled)).await?;
                Ok(QueryResult::Compute(translate::compute_value(&records)))
            }
            QueryDescriptor::Cluster(query) => {
                let plan = QueryTranslator::new(&namespace.snapshot().await).cluster(query)?;
                let session = self.session(namespace, deadline).await?;
                let nodes = deadline
                    .run("cluster nodes", session.query(&plan.nodes))
                    .await?;
                let edges = match &plan.edges {
                    Some(q) => deadline.run("cluster edges", session.query(q)).await?,
                    None => Vec::new(),
                };
                Ok(QueryResult::Cluster(translate::connected_components(
                    &nodes, &edges,
                )?))
            }
            QueryDescriptor::Rule(query) => {
                let rule = &query.rule;
                ident(&rule.name)?;
                let mut writer = self.registry.writer(namespace).await;
                let session = self.session(namespace, deadline).await?;
                let compiled = deadline
                    .run(
                        "define rule",
                        session.define_rule(&rule.name, &rule.when, &rule.then),
                    )
                    .await?;
                let result = RuleResult {
                    name: rule.name.clone(),
                    when: rule.when.clone(),
                    then: rule.then.clone(),
                    compiled,
                    defined_at: Utc::now(),
                };
                writer.add_rule(result.clone(), deadline).await?;
                Ok(QueryResult::Rule(result))
            }
        }
    }

    async fn session(
        &self,
        namespace: &Namespace,
        deadline: Deadline,
    ) -> Result<Box<dyn GraphSession>> {
        deadline
            .run("open session", self.graph.open(namespace.name()))
            .await
    }
}

/// Log a failed public operation before handing the error to the caller.
fn logged<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        tracing::error!(operation, kind = ?e.kind(), error = %e, "Operation failed");
    }
    result
}
