//! Observability events for logdoc
//!
//! Every table lifecycle event has a fixed name and severity. Load and
//! compaction are bracketed by `ObservationScope` instead, which emits
//! `TABLE_LOAD_*` and `COMPACTION_*` begin/complete/error lines.

use std::fmt;

use super::logger::Severity;

/// Observable table events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Writes
    /// Pending inserts appended to the log
    WritesFlushed,
    /// Appending pending inserts failed; a full save is scheduled
    WriteFlushFailed,

    // Compaction
    /// Log rewrite aborted; previous log kept
    CompactionFailed,
    /// Save found nothing to rewrite
    CompactionSkipped,

    // Indices
    /// Index built for a field
    IndexCreated,
    /// Index removed
    IndexDropped,

    // Corruption tolerance
    /// Unparseable log lines were skipped
    MalformedLineSkipped,

    // Lifecycle
    /// Table files deleted
    TableDropped,
    /// Table emptied
    TableTruncated,
    /// Table closed
    TableClosed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::WritesFlushed => "WRITES_FLUSHED",
            Event::WriteFlushFailed => "WRITE_FLUSH_FAILED",
            Event::CompactionFailed => "COMPACTION_FAILED",
            Event::CompactionSkipped => "COMPACTION_SKIPPED",
            Event::IndexCreated => "INDEX_CREATED",
            Event::IndexDropped => "INDEX_DROPPED",
            Event::MalformedLineSkipped => "MALFORMED_LINE_SKIPPED",
            Event::TableDropped => "TABLE_DROPPED",
            Event::TableTruncated => "TABLE_TRUNCATED",
            Event::TableClosed => "TABLE_CLOSED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::WritesFlushed | Event::CompactionSkipped => Severity::Trace,
            Event::MalformedLineSkipped => Severity::Warn,
            Event::WriteFlushFailed | Event::CompactionFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
