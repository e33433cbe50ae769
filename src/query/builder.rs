//! Chainable query
//!
//! ```ignore
//! let top = table
//!     .find(json!({"age": {"$gte": 25}}))?
//!     .sort("age", SortDirection::Desc)
//!     .limit(1)
//!     .execute()?;
//! ```

use std::sync::Arc;

use serde_json::Value;

use super::aggregate::{distinct, AggregateSpec};
use super::clause::Clause;
use super::executor::{self, QuerySpec, SortSpec};
use super::filter::parse_filter;
use super::planner::QueryPlan;
use super::sorter::SortDirection;
use crate::document::Document;
use crate::error::TableResult;
use crate::table::Table;

/// A query under construction against one table
pub struct Query<'t> {
    table: &'t mut Table,
    spec: QuerySpec,
}

impl<'t> Query<'t> {
    pub(crate) fn new(table: &'t mut Table) -> Self {
        Self {
            table,
            spec: QuerySpec::default(),
        }
    }

    /// ANDs the clauses of `filter` onto the query
    pub fn filter(mut self, filter: Value) -> TableResult<Self> {
        let clauses = parse_filter(&filter)?;
        self.spec.clauses.extend(clauses);
        Ok(self)
    }

    /// ORs `filter` with the most recently added clause only.
    ///
    /// `filter(a).filter(b).or(c)` means `a AND (b OR c)`. With no earlier
    /// clause the filter is simply added.
    pub fn or(mut self, filter: Value) -> TableResult<Self> {
        let clauses = parse_filter(&filter)?;
        if clauses.is_empty() {
            return Ok(self);
        }
        let right = Clause::all(clauses);
        let combined = match self.spec.clauses.pop() {
            Some(left) => Clause::or(left, right),
            None => right,
        };
        self.spec.clauses.push(combined);
        Ok(self)
    }

    /// ANDs an arbitrary predicate onto the query. Never index-eligible.
    pub fn matching<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.spec.clauses.push(Clause::Predicate(Arc::new(predicate)));
        self
    }

    /// Sorts by a field; a later call replaces an earlier one
    pub fn sort(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.spec.sort = Some(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn skip(mut self, n: usize) -> Self {
        self.spec.skip = n;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.spec.limit = Some(n);
        self
    }

    /// Keeps only the listed top-level fields that are present
    pub fn project<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.spec.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// The accumulated clauses and options
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Plan the query would run with, without running it
    pub fn explain(&self) -> QueryPlan {
        executor::plan(&*self.table, &self.spec)
    }

    /// Runs the query
    pub fn execute(self) -> TableResult<Vec<Document>> {
        self.table.ensure_ready()?;
        executor::execute(self.table, &self.spec)
    }

    /// First result, or `None`
    pub fn first(self) -> TableResult<Option<Document>> {
        Ok(self.limit(1).execute()?.into_iter().next())
    }

    /// Number of matching records. Ignores sort, skip, limit and projection.
    pub fn count(self) -> TableResult<usize> {
        self.table.ensure_ready()?;
        let plan = executor::plan(&*self.table, &self.spec);
        executor::count(self.table, &self.spec.clauses, &plan)
    }

    /// Unique values of `field` across matching records, in order of first
    /// appearance. Ignores sort, skip, limit and projection.
    pub fn distinct(self, field: &str) -> TableResult<Vec<Value>> {
        let docs = self.matching_documents()?;
        Ok(distinct(field, &docs))
    }

    /// Evaluates an aggregation spec such as
    /// `{"total": {"$sum": "age"}, "avg": {"$avg": "age"}}` over matching
    /// records. Ignores sort, skip, limit and projection.
    pub fn aggregate(self, spec: Value) -> TableResult<Value> {
        let spec = AggregateSpec::parse(&spec)?;
        let docs = self.matching_documents()?;
        Ok(spec.evaluate(&docs))
    }

    /// Ids of matching records; used by the bulk mutations
    pub(crate) fn ids(self) -> TableResult<Vec<String>> {
        Ok(self
            .matching_documents()?
            .iter()
            .filter_map(|doc| doc.id().map(str::to_string))
            .collect())
    }

    fn matching_documents(self) -> TableResult<Vec<Document>> {
        self.table.ensure_ready()?;
        let plan = executor::plan(&*self.table, &self.spec);
        executor::matching(self.table, &self.spec.clauses, &plan)
    }
}
