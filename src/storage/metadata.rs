//! Table metadata side-file
//!
//! `<table>.meta.json` holds the durable facts that are not records:
//! record count, indexed fields, the auto-increment counter, the last
//! modification time and any tombstones not yet purged from the log.
//!
//! Writes are atomic:
//! 1. Write to temp file
//! 2. fsync temp file
//! 3. Rename temp to final
//! 4. fsync the directory

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::{StorageError, StorageResult};

/// Durable per-table metadata
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableMetadata {
    /// Last id handed out by the auto-increment strategy
    pub auto_increment: u64,
    /// Indexed field paths
    pub indices: Vec<String>,
    /// Record count as of the last save
    pub record_count: usize,
    /// RFC 3339 timestamp of the last save
    pub modified: Option<String>,
    /// Deleted ids whose lines may still be in the log
    pub tombstones: Vec<String>,
}

/// Reads and atomically writes `<dir>/<table>.meta.json`
#[derive(Debug, Clone)]
pub struct MetadataStore {
    path: PathBuf,
    temp_path: PathBuf,
}

impl MetadataStore {
    pub fn new(dir: &Path, table: &str) -> Self {
        Self {
            path: dir.join(format!("{}.meta.json", table)),
            temp_path: dir.join(format!("{}.meta.json.tmp", table)),
        }
    }

    /// Returns the path to the metadata file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads metadata if present.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn read(&self) -> StorageResult<Option<TableMetadata>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(StorageError::read_failed(
                    format!("Failed to read metadata: {}", self.path.display()),
                    e,
                ))
            }
        };

        serde_json::from_str(&content).map(Some).map_err(|e| {
            StorageError::metadata_invalid(format!("Failed to parse metadata: {}", e))
                .with_details(self.path.display().to_string())
        })
    }

    /// Writes metadata atomically
    pub fn write(&self, metadata: &TableMetadata) -> StorageResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::write_failed(
                    format!("Failed to create data directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let content = serde_json::to_string_pretty(metadata).map_err(|e| {
            StorageError::write_failed_no_source(format!("Failed to serialize metadata: {}", e))
        })?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.temp_path)
            .map_err(|e| StorageError::write_failed("Failed to create temp metadata file", e))?;

        file.write_all(content.as_bytes())
            .map_err(|e| StorageError::write_failed("Failed to write metadata", e))?;

        file.sync_all()
            .map_err(|e| StorageError::write_failed("Failed to fsync metadata", e))?;

        fs::rename(&self.temp_path, &self.path).map_err(|e| {
            let _ = fs::remove_file(&self.temp_path);
            StorageError::write_failed("Failed to commit metadata", e)
        })?;

        sync_parent_dir(&self.path);
        Ok(())
    }

    /// Deletes the metadata file. A missing file is not an error.
    pub fn remove(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io_error(
                format!("Failed to remove metadata: {}", self.path.display()),
                e,
            )),
        }
    }
}

/// Best-effort fsync of the directory holding `path` so a rename is durable
pub(crate) fn sync_parent_dir(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_metadata_reads_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path(), "users");
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn test_write_and_read_back() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path(), "users");
        let metadata = TableMetadata {
            auto_increment: 7,
            indices: vec!["age".to_string(), "address.city".to_string()],
            record_count: 42,
            modified: Some("2024-01-01T00:00:00.000000Z".to_string()),
            tombstones: vec!["x".to_string()],
        };

        store.write(&metadata).unwrap();
        assert_eq!(store.read().unwrap(), Some(metadata));
        assert!(!temp_dir.path().join("users.meta.json.tmp").exists());
    }

    #[test]
    fn test_camel_case_keys_on_disk() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path(), "t");
        store.write(&TableMetadata::default()).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("\"autoIncrement\""));
        assert!(raw.contains("\"recordCount\""));
    }

    #[test]
    fn test_older_metadata_without_tombstones() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path(), "t");
        fs::write(
            store.path(),
            r#"{"autoIncrement":3,"indices":["age"],"recordCount":2,"modified":null}"#,
        )
        .unwrap();

        let metadata = store.read().unwrap().unwrap();
        assert_eq!(metadata.auto_increment, 3);
        assert!(metadata.tombstones.is_empty());
    }

    #[test]
    fn test_invalid_metadata_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path(), "t");
        fs::write(store.path(), "not json").unwrap();

        let err = store.read().unwrap_err();
        assert_eq!(err.code().code(), "LOGDOC_METADATA_INVALID");
    }

    #[test]
    fn test_remove_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = MetadataStore::new(temp_dir.path(), "t");
        store.write(&TableMetadata::default()).unwrap();
        store.remove().unwrap();
        store.remove().unwrap();
        assert!(store.read().unwrap().is_none());
    }
}
