//! Query error types

use thiserror::Error;

/// Result type for query parsing
pub type QueryResult<T> = Result<T, QueryError>;

/// Query errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    // ==================
    // Filter Errors
    // ==================
    /// Filter is not a JSON object
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// `$`-key not in the operator set
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    /// Operator given an operand of the wrong shape
    #[error("Invalid operand for {op}: {reason}")]
    InvalidOperand { op: String, reason: String },

    /// `$regex` pattern does not compile
    #[error("Invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },

    // ==================
    // Aggregation Errors
    // ==================
    /// Aggregation spec entry is not `{ "$op": "field" }`
    #[error("Invalid aggregation for '{key}': {reason}")]
    InvalidAggregation { key: String, reason: String },
}

impl QueryError {
    /// Returns the error code
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::InvalidFilter(_) => "LOGDOC_QUERY_INVALID_FILTER",
            QueryError::UnknownOperator(_) => "LOGDOC_QUERY_UNKNOWN_OPERATOR",
            QueryError::InvalidOperand { .. } => "LOGDOC_QUERY_INVALID_OPERAND",
            QueryError::InvalidRegex { .. } => "LOGDOC_QUERY_INVALID_REGEX",
            QueryError::InvalidAggregation { .. } => "LOGDOC_QUERY_INVALID_AGGREGATION",
        }
    }

    pub(crate) fn operand(op: &str, reason: impl Into<String>) -> Self {
        QueryError::InvalidOperand {
            op: op.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QueryError::UnknownOperator("$near".into()).code(),
            "LOGDOC_QUERY_UNKNOWN_OPERATOR"
        );
        let err = QueryError::operand("$in", "expected an array");
        assert_eq!(err.to_string(), "Invalid operand for $in: expected an array");
    }
}
