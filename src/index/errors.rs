//! Index error types

use thiserror::Error;

/// Result type for index operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Index errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IndexError {
    /// Field path is empty or has an empty segment
    #[error("Invalid index field: '{0}'")]
    InvalidField(String),
}

impl IndexError {
    /// Returns the error code
    pub fn code(&self) -> &'static str {
        match self {
            IndexError::InvalidField(_) => "LOGDOC_INDEX_INVALID_FIELD",
        }
    }
}
