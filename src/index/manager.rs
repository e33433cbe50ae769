//! Index Manager for logdoc
//!
//! Maintains one index per indexed field. The index kind is picked once at
//! creation from a sample of existing values and never changes afterwards;
//! switching kind requires drop + create.
//!
//! # API
//!
//! - `create_index(field, entries)` - Build an index from (id, value) pairs
//! - `update_indices(id, old, new)` - Keep every index in step with a mutation
//! - `find_exact(field, value)` - Exact match lookup
//! - `find_range(field, min, max, include_min, include_max)` - Range lookup

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde_json::Value;

use super::errors::{IndexError, IndexResult};
use super::hash::HashIndex;
use super::key::SortKey;
use super::sorted::{RangeBound, SortedIndex};
use crate::document::Document;

/// Number of present values inspected to choose the index kind
pub const SAMPLE_SIZE: usize = 10;

/// Index kind, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Equality and inclusion lookups
    Hash,
    /// Equality and range lookups over numbers or dates
    Sorted,
}

impl IndexKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexKind::Hash => "hash",
            IndexKind::Sorted => "sorted",
        }
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field's index
#[derive(Debug, Clone)]
pub enum FieldIndex {
    Hash(HashIndex),
    Sorted(SortedIndex),
}

impl FieldIndex {
    fn kind(&self) -> IndexKind {
        match self {
            FieldIndex::Hash(_) => IndexKind::Hash,
            FieldIndex::Sorted(_) => IndexKind::Sorted,
        }
    }

    fn insert(&mut self, id: &str, value: &Value) {
        match self {
            FieldIndex::Hash(index) => index.insert(id, value),
            FieldIndex::Sorted(index) => index.insert(id, value),
        }
    }

    fn remove(&mut self, id: &str) {
        match self {
            FieldIndex::Hash(index) => index.remove(id),
            FieldIndex::Sorted(index) => index.remove(id),
        }
    }

    fn tracks(&self, id: &str) -> bool {
        match self {
            FieldIndex::Hash(index) => index.tracks(id),
            FieldIndex::Sorted(index) => index.tracks(id),
        }
    }

    fn len(&self) -> usize {
        match self {
            FieldIndex::Hash(index) => index.len(),
            FieldIndex::Sorted(index) => index.len(),
        }
    }
}

/// Index Manager that maintains in-memory secondary indices
#[derive(Debug, Default)]
pub struct IndexManager {
    /// field → index, ordered for deterministic iteration
    indices: BTreeMap<String, FieldIndex>,
}

impl IndexManager {
    /// Creates a manager with no indices
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates a dot-separated field path
    pub fn validate_field(field: &str) -> IndexResult<()> {
        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(IndexError::InvalidField(field.to_string()));
        }
        Ok(())
    }

    /// Builds (or rebuilds) the index for `field` from (id, value) pairs.
    ///
    /// Only present values should be supplied; absent fields are never
    /// indexed. If the first `SAMPLE_SIZE` values are all numeric or
    /// date-like a sorted index is built, otherwise a hash index.
    pub fn create_index<I>(&mut self, field: &str, entries: I) -> IndexResult<IndexKind>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Self::validate_field(field)?;
        let entries: Vec<(String, Value)> = entries.into_iter().collect();

        let sample = &entries[..entries.len().min(SAMPLE_SIZE)];
        let sortable = !sample.is_empty() && sample.iter().all(|(_, v)| SortKey::is_sortable(v));

        let index = if sortable {
            FieldIndex::Sorted(SortedIndex::build(entries))
        } else {
            let mut hash = HashIndex::new();
            for (id, value) in &entries {
                hash.insert(id, value);
            }
            FieldIndex::Hash(hash)
        };

        let kind = index.kind();
        self.indices.insert(field.to_string(), index);
        Ok(kind)
    }

    #[cfg(test)]
    fn create_index_from_documents<'a, I>(
        &mut self,
        field: &str,
        documents: I,
    ) -> IndexResult<IndexKind>
    where
        I: IntoIterator<Item = &'a Document>,
    {
        let entries = documents
            .into_iter()
            .filter_map(|doc| {
                let id = doc.id()?;
                let value = doc.get_path(field)?;
                Some((id.to_string(), value.clone()))
            })
            .collect::<Vec<_>>();
        self.create_index(field, entries)
    }

    /// Brings every index in line with a mutation of `id`.
    ///
    /// - insert: `old = None`, `new = Some`
    /// - update: both present
    /// - delete: `new = None`
    pub fn update_indices(&mut self, id: &str, old: Option<&Document>, new: Option<&Document>) {
        for (field, index) in self.indices.iter_mut() {
            if old.is_some() || index.tracks(id) {
                index.remove(id);
            }
            if let Some(value) = new.and_then(|doc| doc.get_path(field)) {
                index.insert(id, value);
            }
        }
    }

    /// Drops the index on `field`. Returns whether one existed.
    pub fn drop_index(&mut self, field: &str) -> bool {
        self.indices.remove(field).is_some()
    }

    /// Drops every index
    pub fn clear(&mut self) {
        self.indices.clear();
    }

    /// True if `field` is indexed
    pub fn has_index(&self, field: &str) -> bool {
        self.indices.contains_key(field)
    }

    /// Indexed fields in sorted order
    pub fn indexed_fields(&self) -> Vec<String> {
        self.indices.keys().cloned().collect()
    }

    /// Kind of the index on `field`
    pub fn index_kind(&self, field: &str) -> Option<IndexKind> {
        self.indices.get(field).map(FieldIndex::kind)
    }

    /// Number of ids indexed under `field`
    pub fn entry_count(&self, field: &str) -> usize {
        self.indices.get(field).map_or(0, FieldIndex::len)
    }

    /// Whether `find_exact(field, value)` is answerable from the index
    pub fn supports_exact(&self, field: &str, value: &Value) -> bool {
        match self.indices.get(field) {
            Some(FieldIndex::Hash(_)) => true,
            Some(FieldIndex::Sorted(_)) => SortKey::is_sortable(value),
            None => false,
        }
    }

    /// Whether a range over `field` with these bounds is answerable
    pub fn supports_range(&self, field: &str, min: Option<&Value>, max: Option<&Value>) -> bool {
        match self.indices.get(field) {
            Some(FieldIndex::Sorted(_)) => {
                min.map_or(true, SortKey::is_sortable) && max.map_or(true, SortKey::is_sortable)
            }
            _ => false,
        }
    }

    /// Ids whose current value of `field` strictly equals `value`.
    ///
    /// Empty when the field is not indexed.
    pub fn find_exact(&self, field: &str, value: &Value) -> BTreeSet<String> {
        match self.indices.get(field) {
            Some(FieldIndex::Hash(index)) => index.find(value),
            Some(FieldIndex::Sorted(index)) => index.find_exact(value),
            None => BTreeSet::new(),
        }
    }

    /// Ids whose value of `field` lies between `min` and `max`.
    ///
    /// Only sorted indices answer range lookups; returns `None` otherwise.
    pub fn find_range(
        &self,
        field: &str,
        min: Option<&Value>,
        max: Option<&Value>,
        include_min: bool,
        include_max: bool,
    ) -> Option<BTreeSet<String>> {
        let Some(FieldIndex::Sorted(index)) = self.indices.get(field) else {
            return None;
        };
        index.find_range(
            min.map(|value| RangeBound {
                value,
                inclusive: include_min,
            }),
            max.map(|value| RangeBound {
                value,
                inclusive: include_max,
            }),
        )
    }
}
