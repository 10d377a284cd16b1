//! Error types for skein-catalog operations.
//!
//! Every failure of a catalog operation is one of a small, fixed set of kinds.
//! The kind is what callers branch on; the message is safe to show to clients
//! and never contains raw store error text.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Stable classification of a [`CatalogError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Missing or out-of-range input, or a malformed identifier.
    ValidationFailed,
    /// A referenced listing, author, or review does not exist.
    NotFound,
    /// Authenticated, but not the owner of the resource.
    Unauthorized,
    /// No credential, or an invalid one.
    Unauthenticated,
    /// Unique key collision (author handle).
    Conflict,
    /// The persistence layer failed or is contended past the retry budget.
    StoreUnavailable,
}

impl ErrorKind {
    /// Returns the stable machine-readable code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::NotFound => "NOT_FOUND",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Conflict => "CONFLICT",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Input validation failed; nothing was written.
    #[error("validation failed: {message}")]
    ValidationFailed {
        /// Description of the invalid input.
        message: String,
    },

    /// Resource not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The identifier that did not resolve.
        id: String,
    },

    /// The acting identity does not own the resource.
    #[error("unauthorized: {message}")]
    Unauthorized {
        /// Description of the denied action.
        message: String,
    },

    /// The caller presented no credential or an invalid one.
    #[error("unauthenticated: {message}")]
    Unauthenticated {
        /// Description of the authentication failure.
        message: String,
    },

    /// A unique key is already taken.
    #[error("conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// Storage failed. Any partially applied write sequence is left for the
    /// reconciler to repair.
    #[error("store unavailable: {message}")]
    StoreUnavailable {
        /// Safe description of the failed step.
        message: String,
    },
}

impl CatalogError {
    /// Returns the stable kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationFailed { .. } => ErrorKind::ValidationFailed,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Unauthorized { .. } => ErrorKind::Unauthorized,
            Self::Unauthenticated { .. } => ErrorKind::Unauthenticated,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    /// Creates an unauthenticated error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a store unavailable error.
    #[must_use]
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }
}

impl From<skein_core::Error> for CatalogError {
    fn from(value: skein_core::Error) -> Self {
        match value {
            skein_core::Error::InvalidId { message } | skein_core::Error::InvalidInput(message) => {
                Self::ValidationFailed { message }
            }
            skein_core::Error::NotFound { collection, id } => Self::NotFound {
                entity: collection,
                id,
            },
            skein_core::Error::Duplicate { collection, key } => Self::Conflict {
                message: format!("{collection} key already taken: {key}"),
            },
            err @ (skein_core::Error::Storage { .. }
            | skein_core::Error::Serialization { .. }
            | skein_core::Error::Internal { .. }) => {
                tracing::error!(error = %err, "store operation failed");
                Self::StoreUnavailable {
                    message: "storage operation failed".to_string(),
                }
            }
        }
    }
}
