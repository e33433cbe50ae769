//! Filter parsing
//!
//! Turns a MongoDB-style filter object into clauses:
//!
//! ```text
//! {"age": {"$gte": 25, "$lt": 65}, "name": "a", "$or": [{...}, {...}]}
//! ```
//!
//! A field value that is an object whose keys start with `$` is an operator
//! object; any other value is implicit equality.

use regex::RegexBuilder;
use serde_json::{Map, Value};

use super::clause::{Bound, Clause, Condition};
use super::errors::{QueryError, QueryResult};

/// Parses a filter object into AND-combined clauses.
///
/// `{}` and `null` parse to no clauses.
pub fn parse_filter(filter: &Value) -> QueryResult<Vec<Clause>> {
    match filter {
        Value::Null => Ok(Vec::new()),
        Value::Object(map) => parse_object(map),
        other => Err(QueryError::InvalidFilter(format!(
            "expected an object, got {}",
            kind_of(other)
        ))),
    }
}

fn parse_object(map: &Map<String, Value>) -> QueryResult<Vec<Clause>> {
    let mut clauses = Vec::new();
    for (key, value) in map {
        match key.as_str() {
            "$and" => {
                for branch in branches("$and", value)? {
                    clauses.extend(parse_filter(branch)?);
                }
            }
            "$or" => {
                let mut combined: Option<Clause> = None;
                for branch in branches("$or", value)? {
                    let clause = Clause::all(parse_filter(branch)?);
                    combined = Some(match combined {
                        Some(left) => Clause::or(left, clause),
                        None => clause,
                    });
                }
                clauses.extend(combined);
            }
            op if op.starts_with('$') => {
                return Err(QueryError::UnknownOperator(op.to_string()));
            }
            field => clauses.extend(parse_field(field, value)?),
        }
    }
    Ok(clauses)
}

fn branches<'a>(op: &str, value: &'a Value) -> QueryResult<&'a Vec<Value>> {
    match value {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(QueryError::operand(op, "expected a non-empty array of filters")),
    }
}

fn is_operator_object(map: &Map<String, Value>) -> bool {
    map.keys().next().map_or(false, |k| k.starts_with('$'))
}

/// Parses one `field: value` entry
fn parse_field(field: &str, value: &Value) -> QueryResult<Vec<Clause>> {
    let ops = match value {
        Value::Object(map) if is_operator_object(map) => map,
        literal => {
            return Ok(vec![Clause::field(field, Condition::Equals(literal.clone()))]);
        }
    };

    let mut conditions = Vec::new();
    let mut min: Option<Bound> = None;
    let mut max: Option<Bound> = None;

    for (op, operand) in ops {
        match op.as_str() {
            "$eq" => conditions.push(Condition::Equals(operand.clone())),
            "$ne" => conditions.push(Condition::NotEquals(operand.clone())),
            "$gt" => min = Some(Bound::exclusive(operand.clone())),
            "$gte" => min = Some(Bound::inclusive(operand.clone())),
            "$lt" => max = Some(Bound::exclusive(operand.clone())),
            "$lte" => max = Some(Bound::inclusive(operand.clone())),
            "$in" => conditions.push(Condition::In(list(op, operand)?)),
            "$nin" => conditions.push(Condition::NotIn(list(op, operand)?)),
            "$regex" => conditions.push(regex(operand, ops.get("$options"))?),
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(QueryError::operand(op, "requires $regex"));
                }
            }
            "$exists" => match operand {
                Value::Bool(flag) => conditions.push(Condition::Exists(*flag)),
                _ => return Err(QueryError::operand(op, "expected a boolean")),
            },
            other if other.starts_with('$') => {
                return Err(QueryError::UnknownOperator(other.to_string()));
            }
            other => {
                return Err(QueryError::operand(
                    other,
                    "field names cannot be mixed with operators",
                ));
            }
        }
    }

    if min.is_some() || max.is_some() {
        conditions.insert(0, Condition::Range { min, max });
    }

    Ok(conditions
        .into_iter()
        .map(|condition| Clause::field(field, condition))
        .collect())
}

fn list(op: &str, operand: &Value) -> QueryResult<Vec<Value>> {
    match operand {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(QueryError::operand(op, "expected an array")),
    }
}

fn regex(pattern: &Value, options: Option<&Value>) -> QueryResult<Condition> {
    let Value::String(pattern) = pattern else {
        return Err(QueryError::operand("$regex", "expected a string pattern"));
    };

    let mut builder = RegexBuilder::new(pattern);
    match options {
        None => {}
        Some(Value::String(flags)) => {
            for flag in flags.chars() {
                match flag {
                    'i' => builder.case_insensitive(true),
                    'm' => builder.multi_line(true),
                    's' => builder.dot_matches_new_line(true),
                    'x' => builder.ignore_whitespace(true),
                    other => {
                        return Err(QueryError::operand(
                            "$options",
                            format!("unsupported flag '{}'", other),
                        ));
                    }
                };
            }
        }
        Some(_) => return Err(QueryError::operand("$options", "expected a string")),
    }

    builder
        .build()
        .map(Condition::Regex)
        .map_err(|e| QueryError::InvalidRegex {
            pattern: pattern.clone(),
            reason: e.to_string(),
        })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
