//! Error types for query compilation and execution.

use std::error::Error as StdError;
use tessera_core::{Error as StorageError, ObjectType};
use thiserror::Error;

/// Boxed error raised by a method body.
pub type MethodError = Box<dyn StdError + Send + Sync>;

/// Query error type.
#[derive(Debug, Error)]
pub enum QueryError {
    /// An identifier, method or path cannot be bound.
    #[error("cannot resolve {0}")]
    NameResolution(String),

    /// A value had the wrong type for where it was used.
    #[error("type mismatch: expected {expected}, got {got}")]
    TypeMismatch { expected: String, got: ObjectType },

    /// Two equally specific method candidates.
    #[error("ambiguous method {class}.{method}: {}", .candidates.join(", "))]
    Ambiguity {
        class: String,
        method: String,
        candidates: Vec<String>,
    },

    /// The query text or its shape is invalid.
    #[error("invalid query at offset {offset}: {message}")]
    InvalidQuery { message: String, offset: usize },

    /// A resolved method body failed.
    #[error("method {method} failed")]
    InvocationTarget {
        method: String,
        #[source]
        source: MethodError,
    },

    /// The query was cancelled or ran past its deadline.
    #[error("query cancelled: {0}")]
    Cancelled(String),

    /// A region was destroyed or closed while the query was using it.
    #[error("region unavailable: {0}")]
    RegionUnavailable(String),

    /// The authorizer denied a method invocation.
    #[error("not authorized to invoke {0}")]
    NotAuthorized(String),

    /// The query is valid but cannot run in this configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Error raised by the storage layer.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueryError {
    /// Creates a name resolution error.
    pub fn unresolved(name: impl Into<String>) -> Self {
        QueryError::NameResolution(name.into())
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, got: ObjectType) -> Self {
        QueryError::TypeMismatch {
            expected: expected.into(),
            got,
        }
    }

    /// Creates an invalid query error without a source position.
    pub fn invalid_query(message: impl Into<String>) -> Self {
        QueryError::InvalidQuery {
            message: message.into(),
            offset: 0,
        }
    }

    /// Creates an invalid query error at a byte offset of the query text.
    pub fn syntax(message: impl Into<String>, offset: usize) -> Self {
        QueryError::InvalidQuery {
            message: message.into(),
            offset,
        }
    }

    /// Creates an unsupported-operation error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        QueryError::Unsupported(message.into())
    }

    /// Converts a storage error, reporting destroyed regions as unavailable.
    pub fn from_storage(err: StorageError) -> Self {
        if err.is_region_destroyed() {
            QueryError::RegionUnavailable(err.to_string())
        } else {
            QueryError::Storage(err)
        }
    }

    /// Converts an index lookup error. An index that cannot order its keys
    /// against a bound reports the mismatch the way a scan comparison does.
    pub fn from_index(err: StorageError) -> Self {
        match err {
            StorageError::TypeMismatch { expected, got } => {
                QueryError::type_mismatch(format!("a value comparable with {expected}"), got)
            }
            other => QueryError::from_storage(other),
        }
    }

    /// Returns true for conditions a caller may retry, namely a region that
    /// disappeared mid-scan.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::RegionUnavailable(_) => true,
            QueryError::Storage(e) => e.is_region_destroyed(),
            _ => false,
        }
    }

    /// Returns true if the query was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueryError::Cancelled(_))
    }
}

/// Result type for query operations.
pub type Result<T> = core::result::Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = QueryError::syntax("unexpected token QUERY", 8);
        assert_eq!(err.to_string(), "invalid query at offset 8: unexpected token QUERY");

        let err = QueryError::type_mismatch("Boolean", ObjectType::String);
        assert!(err.to_string().contains("expected Boolean"));
    }

    #[test]
    fn test_invocation_target_keeps_cause() {
        let cause: MethodError = "boom".into();
        let err = QueryError::InvocationTarget {
            method: "Portfolio.risk".into(),
            source: cause,
        };
        assert_eq!(err.source().map(|s| s.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn test_retryable() {
        assert!(QueryError::RegionUnavailable("r".into()).is_retryable());
        assert!(QueryError::from(StorageError::region_destroyed("r")).is_retryable());
        assert!(!QueryError::Cancelled("deadline".into()).is_retryable());
        assert!(QueryError::Cancelled("x".into()).is_cancelled());
    }
}
