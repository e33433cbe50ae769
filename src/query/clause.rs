//! Predicate clauses
//!
//! A parsed filter is a list of clauses combined with AND. Each field
//! clause carries one `Condition`; `Or` nests two clauses and is always
//! evaluated directly against a record.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;

use crate::document::{compare_ordered, Document};

/// Opaque record predicate supplied by the caller
pub type Predicate = Arc<dyn Fn(&Document) -> bool + Send + Sync>;

/// One end of a range condition
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub value: Value,
    pub inclusive: bool,
}

impl Bound {
    pub fn inclusive(value: Value) -> Self {
        Self {
            value,
            inclusive: true,
        }
    }

    pub fn exclusive(value: Value) -> Self {
        Self {
            value,
            inclusive: false,
        }
    }
}

/// Test applied to one field value
#[derive(Debug, Clone)]
pub enum Condition {
    /// `$eq` or a literal: present and strictly equal
    Equals(Value),
    /// `$ne`: missing or not strictly equal
    NotEquals(Value),
    /// `$gt`/`$gte`/`$lt`/`$lte` merged into one interval
    Range {
        min: Option<Bound>,
        max: Option<Bound>,
    },
    /// `$in`: present and equal to one of the values
    In(Vec<Value>),
    /// `$nin`: missing or equal to none of the values
    NotIn(Vec<Value>),
    /// `$regex`: a string matching the pattern
    Regex(Regex),
    /// `$exists`: presence equals the flag
    Exists(bool),
}

impl Condition {
    /// Operator name used in plans and logs
    pub fn op_name(&self) -> &'static str {
        match self {
            Condition::Equals(_) => "eq",
            Condition::NotEquals(_) => "ne",
            Condition::Range { .. } => "range",
            Condition::In(_) => "in",
            Condition::NotIn(_) => "nin",
            Condition::Regex(_) => "regex",
            Condition::Exists(_) => "exists",
        }
    }

    /// Evaluates the condition against a resolved field value
    pub fn matches(&self, value: Option<&Value>) -> bool {
        match self {
            Condition::Equals(expected) => value == Some(expected),
            Condition::NotEquals(expected) => value != Some(expected),
            Condition::Range { min, max } => {
                let Some(actual) = value else {
                    return false;
                };
                within(actual, min.as_ref(), max.as_ref())
            }
            Condition::In(values) => value.map_or(false, |v| values.contains(v)),
            Condition::NotIn(values) => value.map_or(true, |v| !values.contains(v)),
            Condition::Regex(re) => value
                .and_then(Value::as_str)
                .map_or(false, |s| re.is_match(s)),
            Condition::Exists(expected) => value.is_some() == *expected,
        }
    }
}

fn within(actual: &Value, min: Option<&Bound>, max: Option<&Bound>) -> bool {
    if let Some(bound) = min {
        match compare_ordered(actual, &bound.value) {
            Some(ord) if ord.is_gt() || (bound.inclusive && ord.is_eq()) => {}
            _ => return false,
        }
    }
    if let Some(bound) = max {
        match compare_ordered(actual, &bound.value) {
            Some(ord) if ord.is_lt() || (bound.inclusive && ord.is_eq()) => {}
            _ => return false,
        }
    }
    true
}

/// A filter term
#[derive(Clone)]
pub enum Clause {
    /// Condition on a dot-separated field path
    Field { path: String, condition: Condition },
    /// Caller-supplied predicate
    Predicate(Predicate),
    /// Either side matches
    Or(Box<Clause>, Box<Clause>),
    /// Every clause matches
    And(Vec<Clause>),
}

impl Clause {
    pub fn field(path: impl Into<String>, condition: Condition) -> Self {
        Clause::Field {
            path: path.into(),
            condition,
        }
    }

    pub fn or(left: Clause, right: Clause) -> Self {
        Clause::Or(Box::new(left), Box::new(right))
    }

    /// Collapses a list into a single clause
    pub fn all(mut clauses: Vec<Clause>) -> Self {
        if clauses.len() == 1 {
            if let Some(clause) = clauses.pop() {
                return clause;
            }
        }
        Clause::And(clauses)
    }

    /// True if the record satisfies this clause
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Clause::Field { path, condition } => condition.matches(doc.get_path(path)),
            Clause::Predicate(predicate) => predicate(doc),
            Clause::Or(left, right) => left.matches(doc) || right.matches(doc),
            Clause::And(clauses) => clauses.iter().all(|c| c.matches(doc)),
        }
    }
}

impl fmt::Debug for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Clause::Field { path, condition } => f
                .debug_struct("Field")
                .field("path", path)
                .field("condition", condition)
                .finish(),
            Clause::Predicate(_) => f.write_str("Predicate(<fn>)"),
            Clause::Or(left, right) => f.debug_tuple("Or").field(left).field(right).finish(),
            Clause::And(clauses) => f.debug_tuple("And").field(clauses).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        Document::from_value(value).unwrap()
    }

    #[test]
    fn test_missing_field_semantics() {
        let d = doc(json!({"_id": "1", "a": null}));

        assert!(Condition::Equals(Value::Null).matches(d.get_path("a")));
        assert!(!Condition::Equals(Value::Null).matches(d.get_path("b")));
        assert!(Condition::NotEquals(json!(1)).matches(d.get_path("b")));
        assert!(Condition::NotIn(vec![json!(1)]).matches(d.get_path("b")));
        assert!(!Condition::In(vec![Value::Null]).matches(d.get_path("b")));
        assert!(Condition::Exists(true).matches(d.get_path("a")));
        assert!(Condition::Exists(false).matches(d.get_path("b")));
    }

    #[test]
    fn test_range_bounds() {
        let range = Condition::Range {
            min: Some(Bound::inclusive(json!(10))),
            max: Some(Bound::exclusive(json!(20))),
        };
        assert!(range.matches(Some(&json!(10))));
        assert!(range.matches(Some(&json!(19.5))));
        assert!(!range.matches(Some(&json!(20))));
        assert!(!range.matches(Some(&json!("15"))));
        assert!(!range.matches(None));
    }

    #[test]
    fn test_range_over_dates() {
        let range = Condition::Range {
            min: Some(Bound::inclusive(json!("2024-01-01"))),
            max: None,
        };
        assert!(range.matches(Some(&json!("2024-03-01T00:00:00Z"))));
        assert!(!range.matches(Some(&json!("2023-12-31 23:59:59"))));
    }

    #[test]
    fn test_regex_only_matches_strings() {
        let re = Condition::Regex(Regex::new("^4").unwrap());
        assert!(re.matches(Some(&json!("42"))));
        assert!(!re.matches(Some(&json!(42))));
    }

    #[test]
    fn test_nested_clauses() {
        let d = doc(json!({"_id": "1", "profile": {"age": 30}, "role": "admin"}));
        let clause = Clause::or(
            Clause::field("role", Condition::Equals(json!("user"))),
            Clause::all(vec![Clause::field(
                "profile.age",
                Condition::Range {
                    min: Some(Bound::exclusive(json!(18))),
                    max: None,
                },
            )]),
        );
        assert!(clause.matches(&d));

        let predicate: Predicate = Arc::new(|d: &Document| d.get("role") == Some(&json!("x")));
        assert!(!Clause::Predicate(predicate).matches(&d));
    }
}
