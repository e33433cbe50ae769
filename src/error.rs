//! Table-level error type
//!
//! Absence is never an error: lookups return `Option`, deletes return
//! `bool`. Malformed log lines are skipped and counted, never raised.

use thiserror::Error;

use crate::index::IndexError;
use crate::query::QueryError;
use crate::storage::StorageError;
use crate::table::TableState;

/// Result type for table operations
pub type TableResult<T> = Result<T, TableError>;

/// Errors surfaced by table operations
#[derive(Debug, Error)]
pub enum TableError {
    /// Durable read or write failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Index definition rejected
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Query could not be parsed
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Inserted value is not a JSON object, or has an unusable `_id`
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Table name cannot be used as a file name
    #[error("Invalid table name: '{0}'")]
    InvalidName(String),

    /// Operation requires a loaded table
    #[error("Table '{table}' is not ready (state: {state})")]
    NotReady { table: String, state: TableState },
}

impl TableError {
    /// Returns the error code
    pub fn code(&self) -> &'static str {
        match self {
            TableError::Storage(e) => e.code().code(),
            TableError::Index(e) => e.code(),
            TableError::Query(e) => e.code(),
            TableError::InvalidDocument(_) => "LOGDOC_INVALID_DOCUMENT",
            TableError::InvalidName(_) => "LOGDOC_INVALID_TABLE_NAME",
            TableError::NotReady { .. } => "LOGDOC_TABLE_NOT_READY",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_ready_display() {
        let err = TableError::NotReady {
            table: "users".to_string(),
            state: TableState::Closed,
        };
        assert_eq!(err.to_string(), "Table 'users' is not ready (state: closed)");
        assert_eq!(err.code(), "LOGDOC_TABLE_NOT_READY");
    }

    #[test]
    fn test_wrapped_codes() {
        let err: TableError = IndexError::InvalidField(String::new()).into();
        assert_eq!(err.code(), "LOGDOC_INDEX_INVALID_FIELD");

        let err: TableError = StorageError::metadata_invalid("bad").into();
        assert_eq!(err.code(), "LOGDOC_METADATA_INVALID");
    }
}
