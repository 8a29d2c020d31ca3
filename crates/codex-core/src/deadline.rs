//! Caller-supplied deadlines for graph store and cache calls.
//!
//! A deadline is threaded through every blocking point of a public operation
//! (connect, schema definition, insertion, query, cache get/set). Expiry
//! surfaces as [`CodexError::Timeout`], never as an empty result.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{CodexError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline {
    at: Option<Instant>,
}

impl Deadline {
    /// No deadline: calls may block indefinitely.
    pub fn none() -> Self {
        Self { at: None }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
        }
    }

    pub fn at(instant: Instant) -> Self {
        Self { at: Some(instant) }
    }

    /// Build from an optional timeout in seconds, as found in configuration.
    pub fn from_secs(secs: Option<u64>) -> Self {
        secs.map(|s| Self::after(Duration::from_secs(s)))
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.at
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.at.is_some_and(|at| Instant::now() >= at)
    }

    /// Await `fut`, failing with a timeout naming `operation` if the deadline
    /// passes first.
    pub async fn run<T, E, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Into<CodexError>,
    {
        let Some(at) = self.at else {
            return fut.await.map_err(Into::into);
        };
        match tokio::time::timeout_at(at, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                tracing::warn!(operation, "Deadline exceeded");
                Err(CodexError::Timeout {
                    operation: operation.to_string(),
                })
            }
        }
    }
}
