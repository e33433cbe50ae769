//! Per-table counters
//!
//! - Counters only, monotonic
//! - Reset only when the table instance is created
//! - Relaxed atomics; exact values, no cross-counter consistency

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for one table
#[derive(Debug, Default)]
pub struct TableMetrics {
    inserts: AtomicU64,
    updates: AtomicU64,
    deletes: AtomicU64,
    /// Queries executed (including count/distinct/aggregate)
    queries: AtomicU64,
    /// Queries answered from index candidates
    indexed_queries: AtomicU64,
    /// Queries that scanned the table
    scanned_queries: AtomicU64,
    /// Successful appends of pending inserts
    flushes: AtomicU64,
    compactions: AtomicU64,
    compaction_failures: AtomicU64,
    malformed_lines: AtomicU64,
}

impl TableMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_inserts(&self) {
        self.inserts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_updates(&self) {
        self.updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deletes(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one query and whether it used the indices
    pub fn record_query(&self, indexed: bool) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        if indexed {
            self.indexed_queries.fetch_add(1, Ordering::Relaxed);
        } else {
            self.scanned_queries.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn increment_flushes(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_compactions(&self) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_compaction_failures(&self) {
        self.compaction_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_malformed_lines(&self, count: u64) {
        self.malformed_lines.fetch_add(count, Ordering::Relaxed);
    }

    /// Get all counters as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            inserts: self.inserts.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            queries: self.queries.load(Ordering::Relaxed),
            indexed_queries: self.indexed_queries.load(Ordering::Relaxed),
            scanned_queries: self.scanned_queries.load(Ordering::Relaxed),
            flushes: self.flushes.load(Ordering::Relaxed),
            compactions: self.compactions.load(Ordering::Relaxed),
            compaction_failures: self.compaction_failures.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of `TableMetrics`
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub inserts: u64,
    pub updates: u64,
    pub deletes: u64,
    pub queries: u64,
    pub indexed_queries: u64,
    pub scanned_queries: u64,
    pub flushes: u64,
    pub compactions: u64,
    pub compaction_failures: u64,
    pub malformed_lines: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        assert_eq!(TableMetrics::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_query_counters_split_by_plan() {
        let metrics = TableMetrics::new();
        metrics.record_query(true);
        metrics.record_query(false);
        metrics.record_query(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.queries, 3);
        assert_eq!(snapshot.indexed_queries, 1);
        assert_eq!(snapshot.scanned_queries, 2);
    }

    #[test]
    fn test_snapshot_serializes() {
        let metrics = TableMetrics::new();
        metrics.increment_inserts();
        metrics.add_malformed_lines(4);

        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["inserts"], 1);
        assert_eq!(json["malformed_lines"], 4);
    }

    #[test]
    fn test_thread_safety() {
        use std::sync::Arc;
        use std::thread;

        let metrics = Arc::new(TableMetrics::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        m.increment_updates();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().updates, 400);
    }
}
