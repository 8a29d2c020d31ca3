//! Neo4j connection management and the `GraphStore` implementation.

use async_trait::async_trait;
use neo4rs::{query, ConfigBuilder, Graph, Query};
use serde::Deserialize;

use codex_core::{AttributeType, CodexError, Value};

use crate::store::{CompiledQuery, GraphSession, GraphStore, InstanceId, Record, KEYSPACE_PARAM};

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Attribute {attribute} is already defined as {existing}, not {requested}")]
    SchemaConflict {
        attribute: String,
        existing: String,
        requested: String,
    },

    #[error("Instance not found: {0}")]
    MissingInstance(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<GraphError> for CodexError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Connection(msg) => CodexError::Connection(msg),
            GraphError::Query(e) => CodexError::Execution(e.to_string()),
            e @ GraphError::SchemaConflict { .. } => CodexError::Schema(e.to_string()),
            e @ GraphError::MissingInstance(_) => CodexError::Execution(e.to_string()),
            e @ GraphError::InvalidIdentifier(_) => CodexError::Validation(e.to_string()),
            GraphError::Serialization(msg) => CodexError::Serialization(msg),
        }
    }
}

/// Configuration for connecting to Neo4j.
#[derive(Debug, Clone, Deserialize)]
pub struct GraphConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_fetch_size")]
    pub fetch_size: usize,
}

fn default_uri() -> String {
    "bolt://localhost:7687".to_string()
}

fn default_user() -> String {
    "neo4j".to_string()
}

fn default_fetch_size() -> usize {
    256
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            user: default_user(),
            password: "codex-dev".to_string(),
            fetch_size: default_fetch_size(),
        }
    }
}

/// Neo4j-backed graph store.
///
/// Holds only configuration: every [`GraphStore::open`] establishes a fresh
/// single-connection pool that is closed when the session is dropped.
#[derive(Debug, Clone)]
pub struct Neo4jStore {
    config: GraphConfig,
}

impl Neo4jStore {
    pub fn new(config: GraphConfig) -> Self {
        Self { config }
    }

    async fn connect(&self) -> Result<Graph, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&self.config.uri)
            .user(&self.config.user)
            .password(&self.config.password)
            .max_connections(1)
            .fetch_size(self.config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::debug!(uri = %self.config.uri, "Connected to Neo4j");
        Ok(graph)
    }

    async fn session(&self, keyspace: &str) -> Result<Neo4jSession, GraphError> {
        Ok(Neo4jSession {
            graph: self.connect().await?,
            keyspace: keyspace.to_string(),
        })
    }
}

/// A connection scoped to one keyspace.
pub struct Neo4jSession {
    pub(crate) graph: Graph,
    pub(crate) keyspace: String,
}

impl Neo4jSession {
    /// Start a statement with `$keyspace` bound.
    pub(crate) fn statement(&self, text: &str) -> Query {
        query(text).param(KEYSPACE_PARAM, self.keyspace.clone())
    }

    /// Bind a compiled query's text and parameters.
    pub(crate) fn bind(&self, compiled: &CompiledQuery) -> Query {
        compiled
            .params
            .iter()
            .fold(self.statement(&compiled.text), |q, (name, value)| {
                bind_value(q, name, value)
            })
    }

    /// Execute a statement without collecting rows.
    pub(crate) async fn run(&self, q: Query) -> Result<(), GraphError> {
        self.graph.run(q).await?;
        Ok(())
    }

    /// Execute a statement and collect all rows.
    pub(crate) async fn rows(&self, q: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a statement and return the first row, if any.
    pub(crate) async fn one(&self, q: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        Ok(stream.next().await?)
    }

    /// Run statements in order inside one explicit transaction. Nothing is
    /// committed unless every statement succeeds.
    pub(crate) async fn run_in_txn(
        &self,
        queries: impl IntoIterator<Item = Query>,
    ) -> Result<(), GraphError> {
        let mut txn = self.graph.start_txn().await?;
        for q in queries {
            txn.run(q).await?;
        }
        txn.commit().await?;
        Ok(())
    }
}

/// Bind one parameter, mapping the cell value onto its Bolt type.
pub(crate) fn bind_value(q: Query, name: &str, value: &Value) -> Query {
    match value {
        Value::Null => q.param(name, neo4rs::BoltType::Null(neo4rs::BoltNull)),
        Value::Boolean(b) => q.param(name, *b),
        Value::Long(v) => q.param(name, *v),
        Value::Double(v) => q.param(name, *v),
        Value::String(s) => q.param(name, s.clone()),
    }
}

#[async_trait]
impl GraphSession for Neo4jSession {
    fn keyspace(&self) -> &str {
        &self.keyspace
    }

    async fn define_entity_type(&self, name: &str, key: Option<&str>) -> Result<(), GraphError> {
        self.merge_entity_type(name, key).await
    }

    async fn define_attribute_type(
        &self,
        name: &str,
        value_type: AttributeType,
    ) -> Result<(), GraphError> {
        self.merge_attribute_type(name, value_type).await
    }

    async fn define_relationship_type(
        &self,
        name: &str,
        role1: &str,
        role2: &str,
    ) -> Result<(), GraphError> {
        self.merge_relationship_type(name, role1, role2).await
    }

    async fn define_rule(&self, name: &str, when: &str, then: &str) -> Result<String, GraphError> {
        self.merge_rule(name, when, then).await
    }

    async fn insert_entity(
        &self,
        entity_type: &str,
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError> {
        self.create_entity(entity_type, attributes).await
    }

    async fn find_instance(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<Option<InstanceId>, GraphError> {
        self.find_by_attribute(entity_type, attribute, value).await
    }

    async fn insert_relationship(
        &self,
        rel_type: &str,
        players: [(&str, InstanceId); 2],
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError> {
        self.create_relationship(rel_type, players, attributes).await
    }

    async fn query(&self, query: &CompiledQuery) -> Result<Vec<Record>, GraphError> {
        self.read_records(query).await
    }

    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Record>, GraphError> {
        self.write_records(query).await
    }
}

#[async_trait]
impl GraphStore for Neo4jStore {
    async fn open(&self, keyspace: &str) -> Result<Box<dyn GraphSession>, GraphError> {
        Ok(Box::new(self.session(keyspace).await?))
    }

    async fn create_keyspace(&self, name: &str) -> Result<(), GraphError> {
        self.session(name).await?.merge_keyspace().await
    }

    async fn list_keyspaces(&self) -> Result<Vec<String>, GraphError> {
        self.session("").await?.keyspace_names().await
    }

    async fn delete_keyspace(&self, name: &str) -> Result<(), GraphError> {
        self.session(name).await?.detach_keyspace().await
    }
}
