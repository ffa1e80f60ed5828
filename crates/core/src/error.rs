//! Error types for Tessera storage and index operations.

use crate::types::ObjectType;
use thiserror::Error;

/// Result type alias for Tessera storage operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for storage, region and index operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Type mismatch error.
    #[error("Type mismatch: expected {expected:?}, got {got:?}")]
    TypeMismatch { expected: ObjectType, got: ObjectType },
    /// Region not found.
    #[error("Region not found: {name}")]
    RegionNotFound { name: String },
    /// Region already exists.
    #[error("Region already exists: {name}")]
    RegionExists { name: String },
    /// Region was destroyed or closed.
    #[error("Region destroyed: {name}")]
    RegionDestroyed { name: String },
    /// Index already exists on the region.
    #[error("Index {index} already exists on region {region}")]
    IndexExists { region: String, index: String },
    /// Index not found.
    #[error("Index {index} not found on region {region}")]
    IndexNotFound { region: String, index: String },
    /// Invalid operation.
    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
    /// An index could not derive the key of an entry.
    #[error("Key evaluation failed for index {index}: {message}")]
    KeyEvaluation { index: String, message: String },
}

impl Error {
    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: ObjectType, got: ObjectType) -> Self {
        Error::TypeMismatch { expected, got }
    }

    /// Creates a region not found error.
    pub fn region_not_found(name: impl Into<String>) -> Self {
        Error::RegionNotFound { name: name.into() }
    }

    /// Creates a region already exists error.
    pub fn region_exists(name: impl Into<String>) -> Self {
        Error::RegionExists { name: name.into() }
    }

    /// Creates a region destroyed error.
    pub fn region_destroyed(name: impl Into<String>) -> Self {
        Error::RegionDestroyed { name: name.into() }
    }

    /// Creates an index already exists error.
    pub fn index_exists(region: impl Into<String>, index: impl Into<String>) -> Self {
        Error::IndexExists {
            region: region.into(),
            index: index.into(),
        }
    }

    /// Creates an index not found error.
    pub fn index_not_found(region: impl Into<String>, index: impl Into<String>) -> Self {
        Error::IndexNotFound {
            region: region.into(),
            index: index.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Creates a key evaluation error.
    pub fn key_evaluation(index: impl Into<String>, message: impl Into<String>) -> Self {
        Error::KeyEvaluation {
            index: index.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error reports a region that disappeared underneath a reader.
    pub fn is_region_destroyed(&self) -> bool {
        matches!(self, Error::RegionDestroyed { .. })
    }
}
