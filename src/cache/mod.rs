//! Read cache for logdoc
//!
//! A bounded id → document map with least-recently-used eviction that sits
//! in front of disk reads. The cache never touches durable storage; it only
//! keeps its own bookkeeping and hit/miss counters.

mod lru;

pub use lru::{CacheStats, LruCache};

use crate::document::Document;

/// The per-table document cache
pub type RecordCache = LruCache<String, Document>;
