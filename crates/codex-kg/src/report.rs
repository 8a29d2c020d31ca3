//! Outcome of a bulk load.

use serde::Serialize;

use codex_core::{CodexError, ErrorKind};

/// A row that could not be inserted. `row` is the zero-based row index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub kind: ErrorKind,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, error: &CodexError) -> Self {
        Self {
            row,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

/// The registered type plus per-row insertion results.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport<D> {
    pub descriptor: D,
    pub inserted: usize,
    pub row_errors: Vec<RowError>,
}

impl<D> LoadReport<D> {
    pub fn is_complete(&self) -> bool {
        self.row_errors.is_empty()
    }
}

/// Row counts gathered by a loader before the descriptor is final.
#[derive(Debug, Default)]
pub(crate) struct RowOutcome {
    pub inserted: usize,
    pub row_errors: Vec<RowError>,
}

impl RowOutcome {
    /// Count a row result. Fatal errors stop the load; anything else is
    /// recorded against the row.
    pub fn record<T>(&mut self, row: usize, result: Result<T, CodexError>) -> Result<(), CodexError> {
        match result {
            Ok(_) => self.inserted += 1,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::warn!(row, error = %e, "Row skipped");
                self.row_errors.push(RowError::new(row, &e));
            }
        }
        Ok(())
    }

    pub fn into_report<D>(self, descriptor: D) -> LoadReport<D> {
        LoadReport {
            descriptor,
            inserted: self.inserted,
            row_errors: self.row_errors,
        }
    }
}
