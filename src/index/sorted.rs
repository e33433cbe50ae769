//! Sorted index: ordered (key, id) pairs for range scans
//!
//! Entries are kept sorted by key, then by id as tie-break. Exact and range
//! lookups binary-search the first boundary and walk forward until the key
//! leaves the requested interval.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use super::key::{SortKey, SortKind};

/// One end of a range lookup
#[derive(Debug, Clone, Copy)]
pub struct RangeBound<'a> {
    /// Bound value
    pub value: &'a Value,
    /// Whether the bound itself matches
    pub inclusive: bool,
}

/// Range-capable index for one numeric or date-valued field
#[derive(Debug, Default, Clone)]
pub struct SortedIndex {
    /// Sorted by (key, id)
    entries: Vec<(SortKey, String)>,
    /// id → (key, original value)
    values: HashMap<String, (SortKey, Value)>,
}

impl SortedIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from (id, value) pairs in one sort.
    ///
    /// Values that are neither numeric nor date-like are skipped.
    pub fn build(pairs: Vec<(String, Value)>) -> Self {
        let mut entries = Vec::with_capacity(pairs.len());
        let mut values = HashMap::with_capacity(pairs.len());
        for (id, value) in pairs {
            if let Some(key) = SortKey::from_json(&value) {
                if values.insert(id.clone(), (key, value)).is_none() {
                    entries.push((key, id));
                }
            }
        }
        entries.sort();
        Self { entries, values }
    }

    /// Indexes `id` under `value`, replacing any previous entry for `id`.
    ///
    /// Values that cannot be ordered are not indexed.
    pub fn insert(&mut self, id: &str, value: &Value) {
        self.remove(id);
        let Some(key) = SortKey::from_json(value) else {
            return;
        };
        let pos = self
            .entries
            .partition_point(|(k, i)| (*k, i.as_str()) < (key, id));
        self.entries.insert(pos, (key, id.to_string()));
        self.values.insert(id.to_string(), (key, value.clone()));
    }

    /// Removes the entry for `id`, if any
    pub fn remove(&mut self, id: &str) {
        let Some((key, _)) = self.values.remove(id) else {
            return;
        };
        if let Ok(pos) = self
            .entries
            .binary_search_by(|(k, i)| (*k, i.as_str()).cmp(&(key, id)))
        {
            self.entries.remove(pos);
        }
    }

    /// True when `id` has an entry
    pub fn tracks(&self, id: &str) -> bool {
        self.values.contains_key(id)
    }

    /// Ids whose value strictly equals `value`.
    ///
    /// Walks the run of equal keys and keeps ids whose stored value is
    /// identical, so `20` does not match `20.0`.
    pub fn find_exact(&self, value: &Value) -> BTreeSet<String> {
        let mut ids = BTreeSet::new();
        let Some(key) = SortKey::from_json(value) else {
            return ids;
        };
        let start = self.entries.partition_point(|(k, _)| *k < key);
        for (k, id) in &self.entries[start..] {
            if *k != key {
                break;
            }
            if self.values.get(id).map_or(false, |(_, v)| v == value) {
                ids.insert(id.clone());
            }
        }
        ids
    }

    /// Ids whose value lies between the bounds.
    ///
    /// Returns `None` when a bound cannot be ordered. Bounds from different
    /// key spaces (a number and a date) match nothing.
    pub fn find_range(
        &self,
        min: Option<RangeBound<'_>>,
        max: Option<RangeBound<'_>>,
    ) -> Option<BTreeSet<String>> {
        let min_key = match min {
            Some(b) => Some((SortKey::from_json(b.value)?, b.inclusive)),
            None => None,
        };
        let max_key = match max {
            Some(b) => Some((SortKey::from_json(b.value)?, b.inclusive)),
            None => None,
        };

        let kind: SortKind = match (min_key, max_key) {
            (Some((lo, _)), Some((hi, _))) if lo.kind != hi.kind => {
                return Some(BTreeSet::new());
            }
            (Some((lo, _)), _) => lo.kind,
            (None, Some((hi, _))) => hi.kind,
            (None, None) => return Some(self.values.keys().cloned().collect()),
        };

        let start = match min_key {
            Some((lo, true)) => self.entries.partition_point(|(k, _)| *k < lo),
            Some((lo, false)) => self.entries.partition_point(|(k, _)| *k <= lo),
            None => self.entries.partition_point(|(k, _)| k.kind < kind),
        };

        let mut ids = BTreeSet::new();
        for (k, id) in &self.entries[start..] {
            if k.kind != kind {
                break;
            }
            if let Some((hi, inclusive)) = max_key {
                if *k > hi || (!inclusive && *k == hi) {
                    break;
                }
            }
            ids.insert(id.clone());
        }
        Some(ids)
    }

    /// Number of indexed ids
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
