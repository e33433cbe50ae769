//! Per-table options
//!
//! Supplied by whoever owns the table (a registry, an embedding program).
//! Deserializable so hosts can keep them in their own config files; every
//! field has a default.

use serde::{Deserialize, Serialize};

use crate::storage::CompactionPolicy;

/// How `_id` is assigned when an inserted record has none
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdStrategy {
    /// Random v4 UUID
    #[default]
    Uuid,
    /// Decimal string from the table's auto-increment counter
    AutoIncrement,
}

/// Configuration for one table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableOptions {
    /// LRU capacity; also the record count up to which a table is loaded
    /// fully into memory.
    pub cache_capacity: usize,
    /// Enables debounced saves and batch auto-flush.
    pub autosave: bool,
    /// Pending insert count that triggers an append flush.
    pub batch_size: usize,
    /// Save debounce window in milliseconds.
    pub debounce_ms: u64,
    /// Garbage ratio above which a save rewrites the log.
    pub garbage_threshold: f64,
    /// Garbage count that forces a rewrite once `force_interval_ms` elapsed.
    pub force_backlog: usize,
    /// Minimum time since the last rewrite for the forced path.
    pub force_interval_ms: u64,
    /// Id assignment for records inserted without `_id`.
    pub id_strategy: IdStrategy,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            cache_capacity: 1000,
            autosave: true,
            batch_size: 100,
            debounce_ms: 100,
            garbage_threshold: 0.3,
            force_backlog: 1000,
            force_interval_ms: 5000,
            id_strategy: IdStrategy::Uuid,
        }
    }
}

impl TableOptions {
    /// Options with autosave disabled; persistence only on explicit
    /// flush/save/close.
    pub fn manual() -> Self {
        Self {
            autosave: false,
            ..Self::default()
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_autosave(mut self, autosave: bool) -> Self {
        self.autosave = autosave;
        self
    }

    /// A batch size of 0 is treated as 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_garbage_threshold(mut self, threshold: f64) -> Self {
        self.garbage_threshold = threshold;
        self
    }

    pub fn with_force(mut self, backlog: usize, interval_ms: u64) -> Self {
        self.force_backlog = backlog;
        self.force_interval_ms = interval_ms;
        self
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Batch size used for auto-flush (never 0)
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }

    /// Save policy thresholds derived from these options
    pub fn compaction_policy(&self) -> CompactionPolicy {
        CompactionPolicy {
            garbage_threshold: self.garbage_threshold,
            force_backlog: self.force_backlog,
            force_interval_ms: i64::try_from(self.force_interval_ms).unwrap_or(i64::MAX),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TableOptions::default();
        assert_eq!(options.cache_capacity, 1000);
        assert!(options.autosave);
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.debounce_ms, 100);
        assert!((options.garbage_threshold - 0.3).abs() < f64::EPSILON);
        assert_eq!(options.id_strategy, IdStrategy::Uuid);
    }

    #[test]
    fn test_manual_disables_autosave() {
        let options = TableOptions::manual();
        assert!(!options.autosave);
        assert_eq!(options.batch_size, 100);
    }

    #[test]
    fn test_builders() {
        let options = TableOptions::default()
            .with_cache_capacity(10)
            .with_batch_size(0)
            .with_id_strategy(IdStrategy::AutoIncrement)
            .with_force(50, 10);

        assert_eq!(options.cache_capacity, 10);
        assert_eq!(options.batch_size, 1);
        assert_eq!(options.id_strategy, IdStrategy::AutoIncrement);
        assert_eq!(options.compaction_policy().force_backlog, 50);
        assert_eq!(options.compaction_policy().force_interval_ms, 10);
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let options: TableOptions =
            serde_json::from_str(r#"{"cache_capacity": 5, "id_strategy": "auto_increment"}"#)
                .unwrap();
        assert_eq!(options.cache_capacity, 5);
        assert_eq!(options.id_strategy, IdStrategy::AutoIncrement);
        assert_eq!(options.batch_size, 100);
        assert!(options.autosave);
    }
}
