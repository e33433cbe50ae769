//! Query execution
//!
//! Pipeline: candidates (index or scan) → residual filter → sort → skip →
//! limit → projection. Candidates are resolved by id through the table so
//! buffered updates and deletes are always honored.

use serde::Serialize;

use super::clause::Clause;
use super::planner::{self, QueryPlan};
use super::sorter::{sort_documents, SortDirection};
use crate::document::Document;
use crate::error::TableResult;
use crate::table::Table;

/// Everything a query carries besides the table
#[derive(Debug, Clone, Default)]
pub struct QuerySpec {
    pub clauses: Vec<Clause>,
    pub sort: Option<SortSpec>,
    pub skip: usize,
    pub limit: Option<usize>,
    /// Top-level fields to keep; `None` keeps the whole record
    pub projection: Option<Vec<String>>,
}

/// Sort field and direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

/// Plans the spec's clauses against the table's current indices
pub(crate) fn plan(table: &Table, spec: &QuerySpec) -> QueryPlan {
    planner::plan(
        &spec.clauses,
        table.index_manager(),
        table.is_fully_resident(),
    )
}

/// Records matching every clause, in candidate or scan order
pub(crate) fn matching(
    table: &mut Table,
    clauses: &[Clause],
    plan: &QueryPlan,
) -> TableResult<Vec<Document>> {
    table.record_query(plan.uses_index());
    let residual: Vec<&Clause> = plan
        .residual
        .iter()
        .filter_map(|&position| clauses.get(position))
        .collect();
    let keep = |doc: &Document| residual.iter().all(|clause| clause.matches(doc));

    let mut matched = Vec::new();
    if plan.uses_index() {
        let ids = planner::candidates(plan, clauses, table.index_manager());
        for id in ids {
            if let Some(doc) = table.lookup(&id)? {
                if keep(&doc) {
                    matched.push(doc);
                }
            }
        }
    } else {
        table.scan_visible(|doc| {
            if keep(&doc) {
                matched.push(doc);
            }
        })?;
    }
    Ok(matched)
}

/// Number of matching records, from the candidate set alone when no
/// residual clause remains
pub(crate) fn count(table: &mut Table, clauses: &[Clause], plan: &QueryPlan) -> TableResult<usize> {
    if plan.uses_index() && plan.residual.is_empty() {
        table.record_query(true);
        return Ok(planner::candidates(plan, clauses, table.index_manager()).len());
    }
    Ok(matching(table, clauses, plan)?.len())
}

/// Runs the full pipeline
pub(crate) fn execute(table: &mut Table, spec: &QuerySpec) -> TableResult<Vec<Document>> {
    let plan = plan(table, spec);
    let matched = matching(table, &spec.clauses, &plan)?;

    let mut docs = match &spec.sort {
        Some(sort) => {
            let keep = spec.limit.filter(|_| spec.skip == 0);
            sort_documents(matched, &sort.field, sort.direction, keep)
        }
        None => matched,
    };

    if spec.skip > 0 {
        docs.drain(..spec.skip.min(docs.len()));
    }
    if let Some(limit) = spec.limit {
        docs.truncate(limit);
    }
    if let Some(fields) = &spec.projection {
        docs = docs.iter().map(|doc| doc.project(fields)).collect();
    }
    Ok(docs)
}
