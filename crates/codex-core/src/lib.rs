//! codex-core: Shared types, schema descriptors, and error handling for Codex.
//!
//! This crate provides the foundational types used across all Codex components:
//! - Tabular values (`Value`, `Table`) and inferred attribute types
//! - Schema descriptors for entity, relationship, and rule types
//! - The cached schema snapshot and its integrity checksum
//! - Structured query descriptors (find / compute / rule / cluster)
//! - Deadlines and the common error type

pub mod deadline;
pub mod error;
pub mod query;
pub mod schema;
pub mod types;

pub use deadline::Deadline;
pub use error::{CodexError, ErrorKind, Result};
pub use query::{
    ClusterQuery, Comparator, ComputeOp, ComputeQuery, FindQuery, Predicate, QueryDescriptor,
    QueryResult, RuleQuery,
};
pub use schema::{
    AttributeDef, EntityRelation, EntityTypeDescriptor, RelationshipTypeDescriptor, RoleBinding,
    Rule, RuleResult, Side, Snapshot,
};
pub use types::{AttributeType, Table, Value};
