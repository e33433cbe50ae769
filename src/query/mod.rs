//! Query engine for logdoc
//!
//! # Pipeline
//!
//! 1. Parse filters into clauses (implicit AND)
//! 2. Plan: index-eligible clauses become lookups, the rest residual
//! 3. Candidates: intersected lookups, or a resident/log scan
//! 4. Resolve each candidate through the table's buffered state
//! 5. Residual filter, sort (top-k heap for small limits), skip, limit,
//!    projection
//!
//! `count`, `distinct` and `aggregate` stop after step 5's filter.
//!
//! # Operators
//!
//! `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$regex`
//! (with `$options`), `$exists`, plus top-level `$or` and `$and`.

mod aggregate;
mod builder;
mod clause;
mod errors;
mod executor;
mod filter;
mod planner;
mod sorter;

pub use aggregate::{distinct, Accumulator, AggregateSpec};
pub use builder::Query;
pub use clause::{Bound, Clause, Condition, Predicate};
pub use errors::{QueryError, QueryResult};
pub use executor::{QuerySpec, SortSpec};
pub use filter::parse_filter;
pub use planner::{IndexLookup, QueryPlan, ScanKind};
pub use sorter::{sort_documents, SortDirection};
