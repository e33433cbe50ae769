//! Hash index: exact value → ids
//!
//! Id sets are `BTreeSet`s so lookups return ids in a deterministic order.

use std::collections::{BTreeSet, HashMap};

use serde_json::Value;

use super::key::IndexKey;

/// Equality/inclusion index for one field
#[derive(Debug, Default, Clone)]
pub struct HashIndex {
    /// Maps key values to the ids holding them
    buckets: HashMap<IndexKey, BTreeSet<String>>,
    /// Reverse map used to unindex an id without its old value
    by_id: HashMap<String, IndexKey>,
}

impl HashIndex {
    /// Creates an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes `id` under `value`, replacing any previous entry for `id`
    pub fn insert(&mut self, id: &str, value: &Value) {
        self.remove(id);
        let key = IndexKey::from_json(value);
        self.buckets
            .entry(key.clone())
            .or_default()
            .insert(id.to_string());
        self.by_id.insert(id.to_string(), key);
    }

    /// Removes the entry for `id`, if any
    pub fn remove(&mut self, id: &str) {
        let Some(key) = self.by_id.remove(id) else {
            return;
        };
        if let Some(ids) = self.buckets.get_mut(&key) {
            ids.remove(id);
            if ids.is_empty() {
                self.buckets.remove(&key);
            }
        }
    }

    /// True when `id` has an entry
    pub fn tracks(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Ids whose value strictly equals `value`
    pub fn find(&self, value: &Value) -> BTreeSet<String> {
        self.buckets
            .get(&IndexKey::from_json(value))
            .cloned()
            .unwrap_or_default()
    }

    /// Number of indexed ids
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// True when nothing is indexed
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[cfg(test)]
    fn key_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_insert_and_find() {
        let mut index = HashIndex::new();
        index.insert("1", &json!("alice"));
        index.insert("2", &json!("alice"));
        index.insert("3", &json!("bob"));

        let alice: Vec<_> = index.find(&json!("alice")).into_iter().collect();
        assert_eq!(alice, vec!["1", "2"]);
        assert_eq!(index.find(&json!("carol")).len(), 0);
        assert_eq!(index.key_count(), 2);
    }

    #[test]
    fn test_reinsert_moves_id() {
        let mut index = HashIndex::new();
        index.insert("1", &json!(10));
        index.insert("1", &json!(20));

        assert!(index.find(&json!(10)).is_empty());
        assert!(index.find(&json!(20)).contains("1"));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_remove_drops_empty_bucket() {
        let mut index = HashIndex::new();
        index.insert("1", &json!(true));
        index.remove("1");
        index.remove("1");

        assert!(index.is_empty());
        assert_eq!(index.key_count(), 0);
        assert!(!index.tracks("1"));
    }
}
