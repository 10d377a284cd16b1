//! Error types and result aliases for Skein.
//!
//! This module defines the shared error types used by the store contract and
//! its implementations. Errors are structured for programmatic handling; the
//! catalog maps them onto its own outward-facing error kinds.

use std::fmt;

/// The result type used throughout Skein core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Skein core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An invalid identifier was provided.
    #[error("invalid identifier: {message}")]
    InvalidId {
        /// Description of what made the ID invalid.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The requested document was not found.
    #[error("not found: {collection} with id {id}")]
    NotFound {
        /// The collection that was searched.
        collection: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// A unique key constraint was violated.
    #[error("duplicate {collection} key: {key}")]
    Duplicate {
        /// The collection that owns the unique key.
        collection: &'static str,
        /// The offending key value.
        key: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred that should not happen in normal operation.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl Error {
    /// Creates a new storage error with the given message.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source cause.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new not found error.
    #[must_use]
    pub fn not_found(collection: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            collection,
            id: id.to_string(),
        }
    }

    /// Returns true if this error means the persistence layer itself failed.
    #[must_use]
    pub const fn is_storage_failure(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Internal { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_formats_collection_and_id() {
        let err = Error::not_found("reviews", "01J0000000000000000000000");
        assert_eq!(
            err.to_string(),
            "not found: reviews with id 01J0000000000000000000000"
        );
    }

    #[test]
    fn storage_failures_are_classified() {
        assert!(Error::storage("disk on fire").is_storage_failure());
        assert!(!Error::InvalidInput("bad".into()).is_storage_failure());
        assert!(
            !Error::Duplicate {
                collection: "authors",
                key: "bob".into()
            }
            .is_storage_failure()
        );
    }
}
