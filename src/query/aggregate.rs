//! Derived results: distinct values and aggregation
//!
//! An aggregation spec maps output keys to one accumulator each:
//!
//! ```text
//! {"total": {"$sum": "age"}, "avg": {"$avg": "age"}, "n": {"$count": true}}
//! ```
//!
//! Field operands may be written with or without a leading `$`.

use std::collections::HashSet;

use serde_json::{Map, Value};

use super::errors::{QueryError, QueryResult};
use crate::document::{compare_values, number_value, Document};
use crate::index::IndexKey;

/// One accumulator of an aggregation spec
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    /// Sum of numeric values; missing and non-numeric count as 0
    Sum(String),
    /// Sum divided by the record count; `null` over no records
    Avg(String),
    /// Smallest present value in natural order; `null` when none
    Min(String),
    /// Largest present value in natural order; `null` when none
    Max(String),
    /// Number of records
    Count,
}

/// A parsed aggregation spec, in output key order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSpec {
    pub outputs: Vec<(String, Accumulator)>,
}

impl AggregateSpec {
    /// Parses a spec object. `{"$count": false}` entries are omitted.
    pub fn parse(spec: &Value) -> QueryResult<Self> {
        let Value::Object(entries) = spec else {
            return Err(QueryError::InvalidAggregation {
                key: String::new(),
                reason: "spec must be an object".to_string(),
            });
        };

        let mut outputs = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            if let Some(accumulator) = parse_entry(key, entry)? {
                outputs.push((key.clone(), accumulator));
            }
        }
        Ok(Self { outputs })
    }

    /// Computes every output over `docs`
    pub fn evaluate(&self, docs: &[Document]) -> Value {
        let mut result = Map::new();
        for (key, accumulator) in &self.outputs {
            result.insert(key.clone(), accumulate(accumulator, docs));
        }
        Value::Object(result)
    }
}

fn parse_entry(key: &str, entry: &Value) -> QueryResult<Option<Accumulator>> {
    let invalid = |reason: &str| QueryError::InvalidAggregation {
        key: key.to_string(),
        reason: reason.to_string(),
    };

    let Value::Object(op) = entry else {
        return Err(invalid("expected an object with one operator"));
    };
    let mut ops = op.iter();
    let (Some((name, operand)), None) = (ops.next(), ops.next()) else {
        return Err(invalid("expected exactly one operator"));
    };

    if name == "$count" {
        return match operand {
            Value::Bool(true) => Ok(Some(Accumulator::Count)),
            Value::Bool(false) => Ok(None),
            _ => Err(invalid("$count expects a boolean")),
        };
    }

    let field = match operand.as_str() {
        Some(field) => field.strip_prefix('$').unwrap_or(field),
        None => return Err(invalid("expected a field name")),
    };
    if field.is_empty() {
        return Err(invalid("expected a field name"));
    }
    let field = field.to_string();

    match name.as_str() {
        "$sum" => Ok(Some(Accumulator::Sum(field))),
        "$avg" => Ok(Some(Accumulator::Avg(field))),
        "$min" => Ok(Some(Accumulator::Min(field))),
        "$max" => Ok(Some(Accumulator::Max(field))),
        other => Err(QueryError::UnknownOperator(other.to_string())),
    }
}

fn accumulate(accumulator: &Accumulator, docs: &[Document]) -> Value {
    match accumulator {
        Accumulator::Sum(field) => number_value(sum(field, docs)),
        Accumulator::Avg(field) => {
            if docs.is_empty() {
                Value::Null
            } else {
                number_value(sum(field, docs) / docs.len() as f64)
            }
        }
        Accumulator::Min(field) => present(field, docs)
            .min_by(|a, b| compare_values(Some(*a), Some(*b)))
            .cloned()
            .unwrap_or(Value::Null),
        Accumulator::Max(field) => present(field, docs)
            .max_by(|a, b| compare_values(Some(*a), Some(*b)))
            .cloned()
            .unwrap_or(Value::Null),
        Accumulator::Count => Value::from(docs.len()),
    }
}

fn sum(field: &str, docs: &[Document]) -> f64 {
    docs.iter()
        .filter_map(|d| d.get_path(field).and_then(Value::as_f64))
        .sum()
}

fn present<'a>(field: &'a str, docs: &'a [Document]) -> impl Iterator<Item = &'a Value> + 'a {
    docs.iter()
        .filter_map(move |d| d.get_path(field))
        .filter(|v| !v.is_null())
}

/// Unique present values of `field` in order of first appearance
pub fn distinct(field: &str, docs: &[Document]) -> Vec<Value> {
    let mut seen = HashSet::new();
    docs.iter()
        .filter_map(|d| d.get_path(field))
        .filter(|v| seen.insert(IndexKey::from_json(v)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn docs() -> Vec<Document> {
        vec![
            json!({"_id": "1", "name": "a", "age": 20, "city": "x"}),
            json!({"_id": "2", "name": "b", "age": 30, "city": "y"}),
            json!({"_id": "3", "name": "c", "age": 40, "city": "x"}),
        ]
        .into_iter()
        .map(|v| Document::from_value(v).unwrap())
        .collect()
    }

    #[test]
    fn test_sum_and_avg() {
        let spec = AggregateSpec::parse(&json!({"total": {"$sum": "age"}, "avg": {"$avg": "$age"}}))
            .unwrap();
        assert_eq!(spec.evaluate(&docs()), json!({"total": 90, "avg": 30}));
    }

    #[test]
    fn test_min_max_count() {
        let spec = AggregateSpec::parse(&json!({
            "youngest": {"$min": "age"},
            "last": {"$max": "name"},
            "n": {"$count": true},
            "skip": {"$count": false}
        }))
        .unwrap();
        assert_eq!(
            spec.evaluate(&docs()),
            json!({"youngest": 20, "last": "c", "n": 3})
        );
    }

    #[test]
    fn test_missing_values() {
        let mut records = docs();
        records.push(Document::from_value(json!({"_id": "4"})).unwrap());

        let spec = AggregateSpec::parse(&json!({
            "avg": {"$avg": "age"},
            "min": {"$min": "missing"}
        }))
        .unwrap();
        assert_eq!(spec.evaluate(&records), json!({"avg": 22.5, "min": null}));

        let empty = AggregateSpec::parse(&json!({"avg": {"$avg": "age"}})).unwrap();
        assert_eq!(empty.evaluate(&[]), json!({"avg": null}));
    }

    #[test]
    fn test_invalid_specs() {
        assert!(AggregateSpec::parse(&json!({"x": {"$median": "age"}})).is_err());
        assert!(AggregateSpec::parse(&json!({"x": {"$sum": "a", "$avg": "a"}})).is_err());
        assert!(AggregateSpec::parse(&json!({"x": "age"})).is_err());
        assert!(AggregateSpec::parse(&json!({"x": {"$count": 1}})).is_err());
        assert!(AggregateSpec::parse(&json!([])).is_err());
    }

    #[test]
    fn test_distinct_first_appearance() {
        assert_eq!(distinct("city", &docs()), vec![json!("x"), json!("y")]);
        assert!(distinct("missing", &docs()).is_empty());
    }
}
