//! Storage error types
//!
//! Error codes:
//! - LOGDOC_STORAGE_IO_ERROR
//! - LOGDOC_STORAGE_WRITE_FAILED
//! - LOGDOC_STORAGE_READ_FAILED
//! - LOGDOC_COMPACTION_FAILED
//! - LOGDOC_METADATA_INVALID
//!
//! None of these poison the table: the in-memory state stays
//! authoritative and the operation can be retried. Malformed log lines are
//! not errors; they are skipped and counted.

use std::fmt;
use std::io;

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Generic disk I/O failure
    IoError,
    /// Append or rewrite failed
    WriteFailed,
    /// Log read failed
    ReadFailed,
    /// Compaction could not produce or install the rewritten log
    CompactionFailed,
    /// Metadata file exists but cannot be parsed
    MetadataInvalid,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::IoError => "LOGDOC_STORAGE_IO_ERROR",
            StorageErrorCode::WriteFailed => "LOGDOC_STORAGE_WRITE_FAILED",
            StorageErrorCode::ReadFailed => "LOGDOC_STORAGE_READ_FAILED",
            StorageErrorCode::CompactionFailed => "LOGDOC_COMPACTION_FAILED",
            StorageErrorCode::MetadataInvalid => "LOGDOC_METADATA_INVALID",
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code, context and optional I/O source
#[derive(Debug)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StorageError {
    fn with_code(code: StorageErrorCode, message: impl Into<String>, source: Option<io::Error>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source,
        }
    }

    /// Create a new storage I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_code(StorageErrorCode::IoError, message, Some(source))
    }

    /// Create a new write failed error
    pub fn write_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_code(StorageErrorCode::WriteFailed, message, Some(source))
    }

    /// Create a write failed error without IO source
    pub fn write_failed_no_source(message: impl Into<String>) -> Self {
        Self::with_code(StorageErrorCode::WriteFailed, message, None)
    }

    /// Create a new read failed error
    pub fn read_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_code(StorageErrorCode::ReadFailed, message, Some(source))
    }

    /// Create a compaction failure
    pub fn compaction_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self::with_code(StorageErrorCode::CompactionFailed, message, Some(source))
    }

    /// Create a metadata parse failure
    pub fn metadata_invalid(message: impl Into<String>) -> Self {
        Self::with_code(StorageErrorCode::MetadataInvalid, message, None)
    }

    /// Attach context such as a path or document id
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StorageErrorCode::IoError.code(), "LOGDOC_STORAGE_IO_ERROR");
        assert_eq!(StorageErrorCode::WriteFailed.code(), "LOGDOC_STORAGE_WRITE_FAILED");
        assert_eq!(StorageErrorCode::ReadFailed.code(), "LOGDOC_STORAGE_READ_FAILED");
        assert_eq!(StorageErrorCode::CompactionFailed.code(), "LOGDOC_COMPACTION_FAILED");
        assert_eq!(StorageErrorCode::MetadataInvalid.code(), "LOGDOC_METADATA_INVALID");
    }

    #[test]
    fn test_write_failed_keeps_source() {
        let err = StorageError::write_failed(
            "disk full",
            io::Error::new(io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(err.code(), StorageErrorCode::WriteFailed);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_display_contains_context() {
        let err = StorageError::metadata_invalid("expected object").with_details("users.meta.json");
        let display = format!("{}", err);
        assert!(display.contains("LOGDOC_METADATA_INVALID"));
        assert!(display.contains("expected object"));
        assert!(display.contains("users.meta.json"));
    }
}
