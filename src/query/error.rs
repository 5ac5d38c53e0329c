//! Query error types
//!
//! Defines all error conditions that can occur during query compilation and execution.

use crate::pattern::PatternError;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Query text does not follow the grammar
    #[error("Parse error: {0}")]
    Parse(String),

    /// A phrase pattern failed to compile
    #[error("Invalid pattern: {0}")]
    InvalidPattern(#[from] PatternError),

    /// Aggregate function name is not known
    #[error("Unknown aggregate: {0}")]
    UnknownAggregate(String),

    /// Field parser name is not known
    #[error("Unknown parser: {0}")]
    UnknownParser(String),

    /// Field type annotation is not a known type
    #[error("Invalid type annotation: {0}")]
    InvalidType(String),

    /// Plan could not be executed
    #[error("Execution error: {0}")]
    Execution(String),

    /// The caller cancelled the query
    #[error("Query cancelled")]
    Cancelled,
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QueryError::UnknownAggregate("avgg".to_string());
        assert_eq!(err.to_string(), "Unknown aggregate: avgg");

        let err: QueryError = PatternError::DuplicateCapture("id".to_string()).into();
        assert_eq!(err.to_string(), "Invalid pattern: Duplicate capture name: id");
    }
}
