//! logdoc - An embedded, single-process document store
//!
//! Schema-less records live in named tables. Each table is persisted as an
//! append-only log of JSON lines, queried with a MongoDB-like predicate
//! language, and accelerated by secondary indices and an LRU read cache.
//!
//! # Layout
//!
//! - `cache`: bounded LRU map in front of disk reads
//! - `index`: hash and sorted secondary indices
//! - `storage`: log file, metadata side-file, compaction
//! - `table`: the log manager that keeps every view of a table consistent
//! - `query`: clause parsing, planning, execution, aggregation
//! - `observability`: structured logging and counters

pub mod cache;
pub mod config;
pub mod document;
pub mod error;
pub mod index;
pub mod observability;
pub mod query;
pub mod storage;
pub mod table;

pub use config::{IdStrategy, TableOptions};
pub use document::Document;
pub use error::{TableError, TableResult};
pub use query::{Query, SortDirection};
pub use table::{Clock, ManualClock, SystemClock, Table, TableEvent, TableState};
