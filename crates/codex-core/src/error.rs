use serde::Serialize;
use thiserror::Error;

/// Closed set of failure categories callers can branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    Schema,
    Lookup,
    Validation,
    Execution,
    Serialization,
    Conflict,
    Timeout,
}

/// Top-level error type for Codex operations.
#[derive(Error, Debug)]
pub enum CodexError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Lookup error: no {entity} with {attribute} = {value}")]
    Lookup {
        entity: String,
        attribute: String,
        value: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot conflict on keyspace {keyspace}: expected version {expected}, found {found}")]
    Conflict {
        keyspace: String,
        expected: u64,
        found: u64,
    },

    #[error("Deadline exceeded during {operation}")]
    Timeout { operation: String },
}

impl CodexError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Schema(_) => ErrorKind::Schema,
            Self::Lookup { .. } => ErrorKind::Lookup,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Execution(_) => ErrorKind::Execution,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Whether a bulk load must stop instead of recording the failure against a row.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Connection | ErrorKind::Timeout)
    }
}

impl From<serde_json::Error> for CodexError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CodexError>;
