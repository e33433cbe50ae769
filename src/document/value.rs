//! Value semantics shared by filtering, sorting and indexing
//!
//! Two orderings exist:
//!
//! - `compare_values`: total "natural" order used for sorting
//!   (missing < null < bool < number < string < array < object)
//! - `compare_ordered`: partial order used by `$gt`/`$gte`/`$lt`/`$lte`,
//!   where mismatched kinds are incomparable and never match

use std::cmp::Ordering;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Number, Value};

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

/// Largest integer an f64 represents exactly
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// Parses a date-like string.
///
/// Accepts RFC 3339, `YYYY-MM-DD`, and naive `YYYY-MM-DD[T ]HH:MM:SS[.fff]`
/// (interpreted as UTC).
pub fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Formats a timestamp the way documents store `_created`/`_modified`.
///
/// Fixed-width microsecond RFC 3339 in UTC, so string order is time order.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Converts an aggregate result back to a JSON number, keeping integral
/// results integral.
pub fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Value::from(n as i64);
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

/// Ordering comparison for range predicates.
///
/// Returns `None` when the two values are not comparable.
pub fn compare_ordered(actual: &Value, bound: &Value) -> Option<Ordering> {
    match (actual, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => match (parse_date(a), parse_date(b)) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            (None, None) => Some(a.cmp(b)),
            _ => None,
        },
        _ => None,
    }
}

/// Compares two optional values for sorting.
///
/// Ordering rules:
/// - missing < null < bool < number < string < array < object
/// - For same types, natural ordering
pub fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a_val), Some(b_val)) => {
            let type_order = |v: &Value| -> u8 {
                match v {
                    Value::Null => 0,
                    Value::Bool(_) => 1,
                    Value::Number(_) => 2,
                    Value::String(_) => 3,
                    Value::Array(_) => 4,
                    Value::Object(_) => 5,
                }
            };

            let a_type = type_order(a_val);
            let b_type = type_order(b_val);
            if a_type != b_type {
                return a_type.cmp(&b_type);
            }

            match (a_val, b_val) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::Number(x), Value::Number(y)) => {
                    let x = x.as_f64().unwrap_or(0.0);
                    let y = y.as_f64().unwrap_or(0.0);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
                (Value::String(x), Value::String(y)) => x.cmp(y),
                (Value::Array(x), Value::Array(y)) => {
                    for (l, r) in x.iter().zip(y.iter()) {
                        let ord = compare_values(Some(l), Some(r));
                        if ord != Ordering::Equal {
                            return ord;
                        }
                    }
                    x.len().cmp(&y.len())
                }
                _ => Ordering::Equal,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_date_formats() {
        assert!(parse_date("2024-03-01").is_some());
        assert!(parse_date("2024-03-01T10:20:30Z").is_some());
        assert!(parse_date("2024-03-01T10:20:30.123+02:00").is_some());
        assert!(parse_date("2024-03-01 10:20:30").is_some());
        assert!(parse_date("2024-03-01T10:20:30").is_some());
        assert!(parse_date("yesterday").is_none());
        assert!(parse_date("42").is_none());
    }

    #[test]
    fn test_timestamp_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = a + chrono::Duration::microseconds(1);
        let (sa, sb) = (format_timestamp(a), format_timestamp(b));
        assert_eq!(sa.len(), sb.len());
        assert!(sa < sb);
        assert_eq!(parse_date(&sa), Some(a));
    }

    #[test]
    fn test_ordered_comparison() {
        assert_eq!(compare_ordered(&json!(3), &json!(2.5)), Some(Ordering::Greater));
        assert_eq!(compare_ordered(&json!("b"), &json!("a")), Some(Ordering::Greater));
        assert_eq!(
            compare_ordered(&json!("2024-01-02"), &json!("2024-01-01T23:00:00Z")),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_ordered(&json!("hello"), &json!("2024-01-01")), None);
        assert_eq!(compare_ordered(&json!("5"), &json!(5)), None);
        assert_eq!(compare_ordered(&json!(true), &json!(false)), None);
    }

    #[test]
    fn test_sort_type_order() {
        let ordered = [
            None,
            Some(json!(null)),
            Some(json!(false)),
            Some(json!(-1)),
            Some(json!(10)),
            Some(json!("a")),
            Some(json!([1])),
            Some(json!({"a": 1})),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(
                compare_values(pair[0].as_ref(), pair[1].as_ref()),
                Ordering::Less
            );
        }
    }

    #[test]
    fn test_number_value_keeps_integers() {
        assert_eq!(number_value(90.0), json!(90));
        assert_eq!(number_value(2.5), json!(2.5));
        assert_eq!(number_value(f64::NAN), Value::Null);
    }
}
