//! Append-only record log
//!
//! One JSON object per line. Appends are fsynced before returning. Reads
//! tolerate corruption: blank lines are ignored and lines that do not parse
//! as an object with a string `_id` are skipped and counted.
//!
//! The log never interprets duplicates; callers decide which occurrence of
//! an id is authoritative.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};

use super::errors::{StorageError, StorageResult};
use crate::document::Document;

/// Summary of one sequential pass over the log
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    /// Records handed to the visitor
    pub records: usize,
    /// Non-blank lines that failed to parse
    pub malformed: usize,
    /// Whether the visitor stopped the pass early
    pub stopped: bool,
}

/// Handle on `<dir>/<table>.log`
#[derive(Debug, Clone)]
pub struct LogFile {
    path: PathBuf,
}

impl LogFile {
    /// Log for `table` inside `dir`. Nothing is touched on disk.
    pub fn new(dir: &Path, table: &str) -> Self {
        Self {
            path: dir.join(format!("{}.log", table)),
        }
    }

    /// Returns the path to the log file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the log file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Appends one line per document and fsyncs.
    ///
    /// If the existing file does not end in a newline (a torn final line),
    /// a newline is written first so the new entries start on their own line.
    /// Returns the number of entries written.
    pub fn append(&self, documents: &[Document]) -> StorageResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let mut buffer = String::new();
        if self.needs_newline()? {
            buffer.push('\n');
        }
        for doc in documents {
            let line = doc.to_line().map_err(|e| {
                StorageError::write_failed_no_source(format!("Failed to serialize record: {}", e))
                    .with_details(format!("document_id: {}", doc.id().unwrap_or("?")))
            })?;
            buffer.push_str(&line);
            buffer.push('\n');
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    StorageError::write_failed(
                        format!("Failed to create data directory: {}", parent.display()),
                        e,
                    )
                })?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                StorageError::write_failed(
                    format!("Failed to open log file: {}", self.path.display()),
                    e,
                )
            })?;

        file.write_all(buffer.as_bytes()).map_err(|e| {
            StorageError::write_failed(format!("Failed to append to {}", self.path.display()), e)
        })?;

        // fsync - an append is not acknowledged before it is durable
        file.sync_all().map_err(|e| {
            StorageError::write_failed(format!("fsync failed on {}", self.path.display()), e)
        })?;

        Ok(documents.len())
    }

    /// True if the file is non-empty and its last byte is not `\n`
    fn needs_newline(&self) -> StorageResult<bool> {
        let mut file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(StorageError::read_failed(
                    format!("Failed to open log file: {}", self.path.display()),
                    e,
                ))
            }
        };

        let len = file
            .metadata()
            .map_err(|e| StorageError::read_failed("Failed to read file metadata", e))?
            .len();
        if len == 0 {
            return Ok(false);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))
            .and_then(|_| file.read_exact(&mut last))
            .map_err(|e| StorageError::read_failed("Failed to read log tail", e))?;
        Ok(last[0] != b'\n')
    }

    /// Streams every parseable record to `visit` in file order.
    ///
    /// A missing file is an empty log. The visitor may stop the pass early by
    /// returning `ControlFlow::Break`.
    pub fn scan<F>(&self, mut visit: F) -> StorageResult<ScanSummary>
    where
        F: FnMut(Document) -> ControlFlow<()>,
    {
        let mut summary = ScanSummary::default();
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(summary),
            Err(e) => {
                return Err(StorageError::read_failed(
                    format!("Failed to open log file: {}", self.path.display()),
                    e,
                ))
            }
        };

        let mut reader = BufReader::new(file);
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = reader.read_until(b'\n', &mut line).map_err(|e| {
                StorageError::read_failed(format!("Failed to read {}", self.path.display()), e)
            })?;
            if read == 0 {
                break;
            }
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            match Document::parse_line(&line) {
                Some(doc) => {
                    summary.records += 1;
                    if visit(doc).is_break() {
                        summary.stopped = true;
                        break;
                    }
                }
                None => summary.malformed += 1,
            }
        }
        Ok(summary)
    }

    /// First record in the log carrying `id`
    pub fn find(&self, id: &str) -> StorageResult<Option<Document>> {
        let mut found = None;
        self.scan(|doc| {
            if doc.id() == Some(id) {
                found = Some(doc);
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })?;
        Ok(found)
    }

    /// Deletes the log file. A missing file is not an error.
    pub fn remove(&self) -> StorageResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io_error(
                format!("Failed to remove log file: {}", self.path.display()),
                e,
            )),
        }
    }
}
