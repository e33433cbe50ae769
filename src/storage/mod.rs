//! Storage subsystem for logdoc
//!
//! Per table, two files live in the data directory:
//! - `<table>.log` - append-only JSON lines, one record per line
//! - `<table>.meta.json` - metadata side-file, written atomically
//!
//! Compaction rewrites the log through `<table>.log.tmp` and an atomic
//! rename. Blank and malformed lines are skipped on read.

mod compaction;
mod errors;
mod log;
mod metadata;

pub use compaction::{CompactReason, CompactionPolicy, LogRewrite, SaveAction, SaveBacklog};
pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use log::{LogFile, ScanSummary};
pub use metadata::{MetadataStore, TableMetadata};
