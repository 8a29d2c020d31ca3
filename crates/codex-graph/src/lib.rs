//! codex-graph: The graph store capability and its Neo4j backend.
//!
//! All schema definitions, instance writes, and query execution against the
//! graph database flow through the traits in [`store`], keeping keyspace
//! isolation and identifier quoting in one place.

pub mod client;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphConfig, GraphError, Neo4jSession, Neo4jStore};
pub use store::{
    ident, CompiledQuery, GraphSession, GraphStore, InstanceId, QueryMode, Record, ID_PROP,
    KEYSPACE_PARAM, KEYSPACE_PROP,
};
