//! Result sorting
//!
//! Sorts by one field using the natural value order, stable with respect
//! to candidate order. When only a small head of the result is wanted a
//! bounded heap selects it without sorting everything.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{compare_values, Document};

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        }
    }
}

/// A heap of `limit` entries is used when `limit * TOP_K_FACTOR` is below
/// the candidate count
const TOP_K_FACTOR: usize = 4;

/// Heap entry ordered by (sort key, input position)
struct Ranked {
    key: Option<Value>,
    seq: usize,
    direction: SortDirection,
    doc: Document,
}

impl Ranked {
    fn compare(&self, other: &Self) -> Ordering {
        self.direction
            .apply(compare_values(self.key.as_ref(), other.key.as_ref()))
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.compare(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

/// Sorts `docs` by `field`.
///
/// When `keep` is set only the first `keep` records of the sorted order are
/// returned.
pub fn sort_documents(
    docs: Vec<Document>,
    field: &str,
    direction: SortDirection,
    keep: Option<usize>,
) -> Vec<Document> {
    match keep {
        Some(k) if k.saturating_mul(TOP_K_FACTOR) < docs.len() => top_k(docs, field, direction, k),
        _ => {
            let mut docs = docs;
            docs.sort_by(|a, b| direction.apply(compare_values(a.get_path(field), b.get_path(field))));
            if let Some(k) = keep {
                docs.truncate(k);
            }
            docs
        }
    }
}

/// Keeps the `k` best entries in a max-heap; the root is the worst kept
fn top_k(docs: Vec<Document>, field: &str, direction: SortDirection, k: usize) -> Vec<Document> {
    if k == 0 {
        return Vec::new();
    }

    let mut heap = BinaryHeap::with_capacity(k + 1);
    for (seq, doc) in docs.into_iter().enumerate() {
        let entry = Ranked {
            key: doc.get_path(field).cloned(),
            seq,
            direction,
            doc,
        };
        if heap.len() < k {
            heap.push(entry);
        } else if heap.peek().map_or(false, |worst| entry < *worst) {
            heap.pop();
            heap.push(entry);
        }
    }

    heap.into_sorted_vec().into_iter().map(|r| r.doc).collect()
}
