//! Index Manager subsystem for logdoc
//!
//! Indices are derived, in-memory-only state. Which fields are indexed is
//! durable (table metadata); the contents are rebuilt on load.
//!
//! # Design Principles
//!
//! - Synchronous: every mutation updates the indices before returning
//! - Kind chosen once: hash or sorted, sampled from existing values
//! - Deterministic: id sets are ordered
//!
//! # Invariants
//!
//! - An index holds exactly the ids whose current value is present
//! - Absent fields are never indexed

mod errors;
mod hash;
mod key;
mod manager;
mod sorted;

pub use errors::{IndexError, IndexResult};
pub use hash::HashIndex;
pub use key::{IndexKey, SortKey, SortKind};
pub use manager::{FieldIndex, IndexKind, IndexManager, SAMPLE_SIZE};
pub use sorted::{RangeBound, SortedIndex};
