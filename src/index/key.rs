//! Index key types
//!
//! `IndexKey` is the hashable image of a JSON value used by hash indices.
//! Two values map to the same key exactly when they are strictly equal.
//!
//! `SortKey` is the ordered image of a numeric or date-like value used by
//! sorted indices. Numbers and dates live in separate key spaces so a range
//! over one never yields the other.

use std::cmp::Ordering;

use serde_json::Value;

use crate::document::parse_date;

/// Hashable representation of a field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    /// JSON null
    Null,
    /// Boolean value (false < true)
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Unsigned integer above `i64::MAX`
    UInt(u64),
    /// Float value (stored as order-preserving bits)
    Float(u64),
    /// String value
    String(String),
    /// Arrays and objects, keyed by their canonical JSON text
    Composite(String),
}

impl IndexKey {
    /// Create a key from a float
    ///
    /// Uses bit representation for total ordering.
    pub fn from_float(v: f64) -> Self {
        // -0.0 and 0.0 compare equal as JSON values
        let v = if v == 0.0 { 0.0 } else { v };
        let bits = v.to_bits();
        let ordered = if (bits >> 63) == 1 {
            !bits
        } else {
            bits ^ (1 << 63)
        };
        IndexKey::Float(ordered)
    }

    /// Create a key from a JSON value
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => IndexKey::Null,
            Value::Bool(b) => IndexKey::Bool(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    IndexKey::Int(i)
                } else if let Some(u) = n.as_u64() {
                    IndexKey::UInt(u)
                } else {
                    IndexKey::from_float(n.as_f64().unwrap_or(0.0))
                }
            }
            Value::String(s) => IndexKey::String(s.clone()),
            Value::Array(_) | Value::Object(_) => {
                IndexKey::Composite(serde_json::to_string(value).unwrap_or_default())
            }
        }
    }
}

/// Which key space a sortable value belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SortKind {
    /// JSON number
    Number,
    /// Date-like string, keyed by microseconds since the epoch
    Date,
}

/// Ordered key for sorted indices
#[derive(Debug, Clone, Copy)]
pub struct SortKey {
    /// Key space
    pub kind: SortKind,
    /// Numeric position within the key space
    pub value: f64,
}

impl SortKey {
    /// Builds a sort key from a numeric or date-like value.
    ///
    /// Returns `None` for any other value.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self {
                kind: SortKind::Number,
                value: n.as_f64()?,
            }),
            Value::String(s) => parse_date(s).map(|dt| Self {
                kind: SortKind::Date,
                value: dt.timestamp_micros() as f64,
            }),
            _ => None,
        }
    }

    /// True when the value could be placed in a sorted index
    pub fn is_sortable(value: &Value) -> bool {
        Self::from_json(value).is_some()
    }
}

impl PartialEq for SortKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortKey {}

impl PartialOrd for SortKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.kind
            .cmp(&other.kind)
            .then_with(|| self.value.total_cmp(&other.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ordering() {
        let keys = vec![
            IndexKey::Null,
            IndexKey::Bool(false),
            IndexKey::Bool(true),
            IndexKey::Int(-100),
            IndexKey::Int(0),
            IndexKey::Int(100),
            IndexKey::String("aaa".to_string()),
            IndexKey::String("zzz".to_string()),
        ];

        for i in 1..keys.len() {
            assert!(keys[i - 1] < keys[i], "Keys should be ordered");
        }
    }

    #[test]
    fn test_strict_equality_mapping() {
        assert_eq!(IndexKey::from_json(&json!(42)), IndexKey::Int(42));
        assert_ne!(IndexKey::from_json(&json!(42)), IndexKey::from_json(&json!(42.0)));
        assert_ne!(IndexKey::from_json(&json!("42")), IndexKey::from_json(&json!(42)));
        assert_eq!(
            IndexKey::from_json(&json!([1, 2])),
            IndexKey::from_json(&json!([1, 2]))
        );
        assert_eq!(IndexKey::from_json(&json!(-0.0)), IndexKey::from_json(&json!(0.0)));
    }

    #[test]
    fn test_float_bits_preserve_order() {
        assert!(IndexKey::from_float(-2.5) < IndexKey::from_float(-1.0));
        assert!(IndexKey::from_float(-1.0) < IndexKey::from_float(0.5));
        assert!(IndexKey::from_float(0.5) < IndexKey::from_float(3.0));
    }

    #[test]
    fn test_sort_key_spaces() {
        let n = SortKey::from_json(&json!(5)).unwrap();
        let d = SortKey::from_json(&json!("2024-01-01")).unwrap();
        assert_eq!(n.kind, SortKind::Number);
        assert_eq!(d.kind, SortKind::Date);
        assert!(n < d);
        assert!(SortKey::from_json(&json!("not a date")).is_none());
        assert!(SortKey::from_json(&json!(true)).is_none());
    }

    #[test]
    fn test_sort_key_numeric_equality() {
        assert_eq!(
            SortKey::from_json(&json!(20)).unwrap(),
            SortKey::from_json(&json!(20.0)).unwrap()
        );
    }
}
