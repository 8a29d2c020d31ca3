//! The graph store capability.
//!
//! [`GraphStore`] is a connection factory; each public Codex operation opens
//! one [`GraphSession`] scoped to a keyspace and drops it before returning.
//! Every statement a session runs has `$keyspace` bound to its keyspace name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use codex_core::{AttributeType, CodexError, Value};

use crate::client::GraphError;

/// Name of the parameter every session binds to its keyspace.
pub const KEYSPACE_PARAM: &str = "keyspace";
/// Property tagging each node and edge with its keyspace.
pub const KEYSPACE_PROP: &str = "_keyspace";
/// Property holding each instance's identifier.
pub const ID_PROP: &str = "_codex_id";

/// Identifier of an entity or relationship instance in the graph.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceId(pub Uuid);

impl InstanceId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InstanceId {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self, GraphError> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| GraphError::Serialization(format!("invalid instance id {s}: {e}")))
    }
}

/// One returned row, keyed by column alias.
pub type Record = BTreeMap<String, serde_json::Value>;

/// A backend statement plus its named parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub text: String,
    pub params: Vec<(String, Value)>,
}

impl CompiledQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.params.push((name.to_string(), value.into()));
        self
    }

    pub fn param_value(&self, name: &str) -> Option<&Value> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// Read or write execution of a raw statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryMode {
    #[default]
    Read,
    Write,
}

impl FromStr for QueryMode {
    type Err = CodexError;

    fn from_str(s: &str) -> Result<Self, CodexError> {
        match s.to_lowercase().as_str() {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            _ => Err(CodexError::Validation(format!(
                "unknown query mode: {s} (expected read or write)"
            ))),
        }
    }
}

/// Schema definition, insertion, and query primitives within one keyspace.
#[async_trait]
pub trait GraphSession: Send + Sync {
    fn keyspace(&self) -> &str;

    /// Register an entity type. Idempotent.
    async fn define_entity_type(&self, name: &str, key: Option<&str>) -> Result<(), GraphError>;

    /// Register an attribute type. Idempotent for the same value type; a
    /// different value type for an existing attribute is a schema conflict.
    async fn define_attribute_type(
        &self,
        name: &str,
        value_type: AttributeType,
    ) -> Result<(), GraphError>;

    async fn define_relationship_type(
        &self,
        name: &str,
        role1: &str,
        role2: &str,
    ) -> Result<(), GraphError>;

    /// Register a when/then rule. Returns the statement it compiled to.
    async fn define_rule(&self, name: &str, when: &str, then: &str) -> Result<String, GraphError>;

    /// Create one entity instance. Null attributes are left unset.
    async fn insert_entity(
        &self,
        entity_type: &str,
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError>;

    /// Find an instance of `entity_type` whose `attribute` equals `value`.
    async fn find_instance(
        &self,
        entity_type: &str,
        attribute: &str,
        value: &Value,
    ) -> Result<Option<InstanceId>, GraphError>;

    /// Create one relationship instance between two existing instances,
    /// given as `[(role1, player1), (role2, player2)]`.
    async fn insert_relationship(
        &self,
        rel_type: &str,
        players: [(&str, InstanceId); 2],
        attributes: &[(String, Value)],
    ) -> Result<InstanceId, GraphError>;

    /// Run a read statement and collect its rows.
    async fn query(&self, query: &CompiledQuery) -> Result<Vec<Record>, GraphError>;

    /// Run a write statement in its own transaction.
    async fn execute(&self, query: &CompiledQuery) -> Result<Vec<Record>, GraphError>;
}

/// Connection factory and keyspace administration.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Connect and open a session on `keyspace`.
    async fn open(&self, keyspace: &str) -> Result<Box<dyn GraphSession>, GraphError>;

    async fn create_keyspace(&self, name: &str) -> Result<(), GraphError>;

    async fn list_keyspaces(&self) -> Result<Vec<String>, GraphError>;

    /// Remove every node and edge of the keyspace.
    async fn delete_keyspace(&self, name: &str) -> Result<(), GraphError>;
}

/// Validate a label, relationship type, or property name and back-quote it for
/// interpolation into Cypher. Names starting with `_` are reserved.
pub fn ident(name: &str) -> Result<String, GraphError> {
    let valid = !name.is_empty()
        && !name.starts_with('_')
        && !name.chars().any(|c| c == '`' || c.is_control());
    if !valid {
        return Err(GraphError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("`{name}`"))
}
