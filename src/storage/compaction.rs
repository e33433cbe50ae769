//! Compaction: save policy and atomic log rewrite
//!
//! A save either skips, appends buffered inserts, or rewrites the whole log.
//! The rewrite goes to `<table>.log.tmp` and is renamed over the log only
//! after every line is written and fsynced, so a failed or interrupted
//! compaction leaves the previous log intact.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, ErrorKind, Write};
use std::path::PathBuf;

use super::errors::{StorageError, StorageResult};
use super::log::LogFile;
use super::metadata::sync_parent_dir;
use crate::document::Document;

/// Why a save rewrites the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactReason {
    /// Updates or deletes are buffered in memory
    PendingChanges,
    /// Carried tombstones exceed the garbage threshold
    GarbageRatio,
    /// Garbage backlog is large and the last compaction is old enough
    Backlog,
    /// An earlier append failed; the buffer must go through a full rewrite
    FailedFlush,
    /// Explicit request
    Requested,
}

impl CompactReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompactReason::PendingChanges => "pending_changes",
            CompactReason::GarbageRatio => "garbage_ratio",
            CompactReason::Backlog => "backlog",
            CompactReason::FailedFlush => "failed_flush",
            CompactReason::Requested => "requested",
        }
    }
}

/// Outcome of the save policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveAction {
    /// Nothing to persist
    Skip,
    /// Append buffered inserts and rewrite metadata only
    Append,
    /// Rewrite the log
    Compact(CompactReason),
}

/// Buffered state the policy looks at
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveBacklog {
    pub pending_writes: usize,
    pub pending_updates: usize,
    pub pending_deletes: usize,
    /// Deleted ids carried from a previous session
    pub tombstones: usize,
    /// Record count as of the last save
    pub record_count: usize,
    /// Metadata changed (index set, counters) without record changes
    pub metadata_dirty: bool,
    /// A previous append failed
    pub needs_full_save: bool,
}

impl SaveBacklog {
    /// Updates, deletes and tombstones still in the log
    pub fn garbage(&self) -> usize {
        self.pending_updates + self.pending_deletes + self.tombstones
    }

    /// Garbage relative to the last known record count
    pub fn garbage_ratio(&self) -> f64 {
        self.garbage() as f64 / self.record_count.max(1) as f64
    }
}

/// Thresholds for choosing a save action
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionPolicy {
    /// Garbage ratio above which the log is rewritten
    pub garbage_threshold: f64,
    /// Garbage count that, with `force_interval_ms`, forces a rewrite
    pub force_backlog: usize,
    /// Minimum time since the last compaction for the forced path
    pub force_interval_ms: i64,
}

impl CompactionPolicy {
    /// Picks the save action for `backlog`, given the time since the last
    /// compaction.
    pub fn decide(&self, backlog: &SaveBacklog, since_last_compaction_ms: i64) -> SaveAction {
        if backlog.needs_full_save {
            return SaveAction::Compact(CompactReason::FailedFlush);
        }
        if backlog.pending_updates > 0 || backlog.pending_deletes > 0 {
            return SaveAction::Compact(CompactReason::PendingChanges);
        }
        if backlog.tombstones > 0 {
            if backlog.garbage_ratio() > self.garbage_threshold {
                return SaveAction::Compact(CompactReason::GarbageRatio);
            }
            if backlog.garbage() >= self.force_backlog
                && since_last_compaction_ms >= self.force_interval_ms
            {
                return SaveAction::Compact(CompactReason::Backlog);
            }
        }
        if backlog.pending_writes > 0 || backlog.metadata_dirty {
            return SaveAction::Append;
        }
        SaveAction::Skip
    }
}

/// Rewrite of a log into its temp file.
///
/// Dropping an uncommitted rewrite deletes the temp file.
pub struct LogRewrite {
    target: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    written: usize,
}

impl LogRewrite {
    /// Starts a rewrite of `log`
    pub fn begin(log: &LogFile) -> StorageResult<Self> {
        let target = log.path().to_path_buf();
        let mut temp_path = target.clone().into_os_string();
        temp_path.push(".tmp");
        let temp_path = PathBuf::from(temp_path);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                StorageError::compaction_failed(
                    format!("Failed to create data directory: {}", parent.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .map_err(|e| {
                StorageError::compaction_failed("Failed to create compaction file", e)
                    .with_details(temp_path.display().to_string())
            })?;

        Ok(Self {
            target,
            temp_path,
            writer: Some(BufWriter::new(file)),
            written: 0,
        })
    }

    #[cfg(test)]
    fn temp_path(&self) -> &std::path::Path {
        &self.temp_path
    }

    /// Writes one record line
    pub fn write(&mut self, doc: &Document) -> StorageResult<()> {
        let line = doc.to_line().map_err(|e| {
            StorageError::compaction_failed(
                "Failed to serialize record",
                io::Error::new(ErrorKind::InvalidData, e),
            )
        })?;
        let writer = self.writer.as_mut().ok_or_else(|| {
            StorageError::compaction_failed(
                "Compaction file already closed",
                io::Error::new(ErrorKind::Other, "writer closed"),
            )
        })?;
        writer
            .write_all(line.as_bytes())
            .and_then(|_| writer.write_all(b"\n"))
            .map_err(|e| StorageError::compaction_failed("Failed to write compaction file", e))?;
        self.written += 1;
        Ok(())
    }

    /// Flushes, fsyncs and renames the temp file over the log.
    ///
    /// Returns the number of records in the new log.
    pub fn commit(mut self) -> StorageResult<usize> {
        let writer = self.writer.take().ok_or_else(|| {
            StorageError::compaction_failed(
                "Compaction file already closed",
                io::Error::new(ErrorKind::Other, "writer closed"),
            )
        })?;
        let file = writer.into_inner().map_err(|e| {
            StorageError::compaction_failed("Failed to flush compaction file", e.into_error())
        })?;

        // fsync before rename; the rename must never expose a partial file
        file.sync_all()
            .map_err(|e| StorageError::compaction_failed("Failed to fsync compaction file", e))?;
        drop(file);

        fs::rename(&self.temp_path, &self.target).map_err(|e| {
            StorageError::compaction_failed("Failed to swap compacted log", e)
                .with_details(self.target.display().to_string())
        })?;
        sync_parent_dir(&self.target);

        // Renamed; nothing left to clean up
        self.temp_path = PathBuf::new();
        Ok(self.written)
    }
}

impl Drop for LogRewrite {
    fn drop(&mut self) {
        self.writer.take();
        if !self.temp_path.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::ops::ControlFlow;
    use tempfile::TempDir;

    fn policy() -> CompactionPolicy {
        CompactionPolicy {
            garbage_threshold: 0.3,
            force_backlog: 5,
            force_interval_ms: 5000,
        }
    }

    fn doc(id: &str) -> Document {
        Document::from_value(json!({"_id": id})).unwrap()
    }

    #[test]
    fn test_nothing_pending_skips() {
        let backlog = SaveBacklog {
            record_count: 10,
            ..Default::default()
        };
        assert_eq!(policy().decide(&backlog, 0), SaveAction::Skip);
    }

    #[test]
    fn test_writes_only_append() {
        let backlog = SaveBacklog {
            pending_writes: 3,
            record_count: 10,
            ..Default::default()
        };
        assert_eq!(policy().decide(&backlog, 0), SaveAction::Append);

        let metadata_only = SaveBacklog {
            metadata_dirty: true,
            ..Default::default()
        };
        assert_eq!(policy().decide(&metadata_only, 0), SaveAction::Append);
    }

    #[test]
    fn test_pending_changes_compact() {
        let backlog = SaveBacklog {
            pending_updates: 1,
            record_count: 1000,
            ..Default::default()
        };
        assert_eq!(
            policy().decide(&backlog, 0),
            SaveAction::Compact(CompactReason::PendingChanges)
        );
    }

    #[test]
    fn test_tombstones_respect_threshold() {
        let low = SaveBacklog {
            tombstones: 3,
            record_count: 100,
            ..Default::default()
        };
        assert_eq!(policy().decide(&low, 0), SaveAction::Skip);

        let high = SaveBacklog {
            tombstones: 40,
            record_count: 100,
            ..Default::default()
        };
        assert_eq!(
            policy().decide(&high, 0),
            SaveAction::Compact(CompactReason::GarbageRatio)
        );
    }

    #[test]
    fn test_backlog_forces_after_interval() {
        let backlog = SaveBacklog {
            tombstones: 6,
            record_count: 100,
            ..Default::default()
        };
        assert_eq!(policy().decide(&backlog, 1000), SaveAction::Skip);
        assert_eq!(
            policy().decide(&backlog, 6000),
            SaveAction::Compact(CompactReason::Backlog)
        );
    }

    #[test]
    fn test_failed_flush_compacts() {
        let backlog = SaveBacklog {
            pending_writes: 1,
            needs_full_save: true,
            ..Default::default()
        };
        assert_eq!(
            policy().decide(&backlog, 0),
            SaveAction::Compact(CompactReason::FailedFlush)
        );
    }

    #[test]
    fn test_rewrite_replaces_log() {
        let temp_dir = TempDir::new().unwrap();
        let log = LogFile::new(temp_dir.path(), "t");
        log.append(&[doc("a"), doc("b"), doc("c")]).unwrap();

        let mut rewrite = LogRewrite::begin(&log).unwrap();
        let temp_path = rewrite.temp_path().to_path_buf();
        rewrite.write(&doc("c")).unwrap();
        rewrite.write(&doc("a")).unwrap();
        assert_eq!(rewrite.commit().unwrap(), 2);
        assert!(!temp_path.exists());

        let mut ids = Vec::new();
        log.scan(|d| {
            ids.push(d.id().unwrap().to_string());
            ControlFlow::Continue(())
        })
        .unwrap();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn test_abandoned_rewrite_keeps_log() {
        let temp_dir = TempDir::new().unwrap();
        let log = LogFile::new(temp_dir.path(), "t");
        log.append(&[doc("a")]).unwrap();
        let before = fs::read(log.path()).unwrap();

        {
            let mut rewrite = LogRewrite::begin(&log).unwrap();
            rewrite.write(&doc("z")).unwrap();
            assert!(rewrite.temp_path().exists());
        }

        assert_eq!(fs::read(log.path()).unwrap(), before);
        assert!(!temp_dir.path().join("t.log.tmp").exists());
    }
}
