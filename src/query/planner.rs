//! Query planning
//!
//! Splits the AND-level clauses into index lookups and residual filters.
//!
//! A clause is index-eligible when it is a field clause on an indexed path
//! and its condition is:
//!
//! - `Equals` whose value the index can answer exactly
//! - `In` whose every value the index can answer exactly
//! - `Range` on a sorted index with orderable bounds
//!
//! Everything else is residual, including every `Or` and `Predicate`.
//! With no eligible clause the query scans: memory when the table is fully
//! resident, otherwise the log.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use super::clause::{Clause, Condition};
use crate::index::IndexManager;

/// How records reach the residual filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanKind {
    /// Intersected index candidates resolved by id
    IndexCandidates,
    /// Every record in memory
    ResidentScan,
    /// Streamed pass over the log overlaid with buffered state
    LogScan,
}

impl ScanKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanKind::IndexCandidates => "index_candidates",
            ScanKind::ResidentScan => "resident_scan",
            ScanKind::LogScan => "log_scan",
        }
    }
}

/// One index lookup in a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexLookup {
    pub field: String,
    /// `hash` or `sorted`
    pub index: String,
    /// `eq`, `in` or `range`
    pub operator: String,
}

/// Result of planning a query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub scan: ScanKind,
    pub lookups: Vec<IndexLookup>,
    /// Clauses evaluated against each record
    pub residual_clauses: usize,
    /// Positions of the eligible clauses
    #[serde(skip)]
    pub(crate) indexed: Vec<usize>,
    /// Positions of the residual clauses
    #[serde(skip)]
    pub(crate) residual: Vec<usize>,
}

impl QueryPlan {
    /// True if the candidate set comes from indices
    pub fn uses_index(&self) -> bool {
        self.scan == ScanKind::IndexCandidates
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan: {}", self.scan.as_str())?;
        for lookup in &self.lookups {
            writeln!(
                f,
                "  - {} via {} index ({})",
                lookup.field, lookup.index, lookup.operator
            )?;
        }
        writeln!(f, "Residual clauses: {}", self.residual_clauses)
    }
}

/// Plans `clauses` against the current indices
pub fn plan(clauses: &[Clause], indices: &IndexManager, fully_resident: bool) -> QueryPlan {
    let mut lookups = Vec::new();
    let mut indexed = Vec::new();
    let mut residual = Vec::new();

    for (position, clause) in clauses.iter().enumerate() {
        match eligible_lookup(clause, indices) {
            Some(lookup) => {
                lookups.push(lookup);
                indexed.push(position);
            }
            None => residual.push(position),
        }
    }

    let scan = if !indexed.is_empty() {
        ScanKind::IndexCandidates
    } else if fully_resident {
        ScanKind::ResidentScan
    } else {
        ScanKind::LogScan
    };

    QueryPlan {
        scan,
        lookups,
        residual_clauses: residual.len(),
        indexed,
        residual,
    }
}

fn eligible_lookup(clause: &Clause, indices: &IndexManager) -> Option<IndexLookup> {
    let Clause::Field { path, condition } = clause else {
        return None;
    };
    let kind = indices.index_kind(path)?;

    let eligible = match condition {
        Condition::Equals(value) => indices.supports_exact(path, value),
        Condition::In(values) => values.iter().all(|v| indices.supports_exact(path, v)),
        Condition::Range { min, max } => indices.supports_range(
            path,
            min.as_ref().map(|b| &b.value),
            max.as_ref().map(|b| &b.value),
        ),
        _ => false,
    };

    eligible.then(|| IndexLookup {
        field: path.clone(),
        index: kind.as_str().to_string(),
        operator: condition.op_name().to_string(),
    })
}

/// Intersects the candidate sets of every eligible clause.
///
/// Stops early once the intersection is empty.
pub fn candidates(plan: &QueryPlan, clauses: &[Clause], indices: &IndexManager) -> BTreeSet<String> {
    let mut result: Option<BTreeSet<String>> = None;

    for &position in &plan.indexed {
        let Some(Clause::Field { path, condition }) = clauses.get(position) else {
            continue;
        };
        let ids = lookup(path, condition, indices);

        let next = match result {
            None => ids,
            Some(current) => current.intersection(&ids).cloned().collect(),
        };
        if next.is_empty() {
            return next;
        }
        result = Some(next);
    }

    result.unwrap_or_default()
}

fn lookup(path: &str, condition: &Condition, indices: &IndexManager) -> BTreeSet<String> {
    match condition {
        Condition::Equals(value) => indices.find_exact(path, value),
        Condition::In(values) => values
            .iter()
            .flat_map(|v| indices.find_exact(path, v))
            .collect(),
        Condition::Range { min, max } => indices
            .find_range(
                path,
                min.as_ref().map(|b| &b.value),
                max.as_ref().map(|b| &b.value),
                min.as_ref().map_or(false, |b| b.inclusive),
                max.as_ref().map_or(false, |b| b.inclusive),
            )
            .unwrap_or_default(),
        _ => BTreeSet::new(),
    }
}
