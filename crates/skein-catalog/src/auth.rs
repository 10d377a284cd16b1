//! Authentication contract.
//!
//! The catalog never inspects tokens itself. It consumes an [`Authenticator`]
//! that turns a bearer token into a verified [`Principal`] and issues tokens
//! for a principal. The concrete implementation lives in the API crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skein_core::AuthorId;

use crate::error::Result;

/// A verified identity.
///
/// Holding a `Principal` means the token signature and expiry were checked.
/// It says nothing about ownership of any resource; that is the access
/// guard's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// The author this identity belongs to.
    pub author_id: AuthorId,
}

impl Principal {
    /// Creates a principal for an author.
    #[must_use]
    pub const fn new(author_id: AuthorId) -> Self {
        Self { author_id }
    }
}

/// A freshly issued bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    /// The encoded token.
    pub token: String,
    /// When the token stops verifying.
    pub expires_at: DateTime<Utc>,
}

/// Verifies and issues bearer tokens.
pub trait Authenticator: Send + Sync + 'static {
    /// Verifies a token and returns its principal.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Unauthenticated` if the token is malformed,
    /// badly signed, or expired.
    fn verify(&self, token: &str) -> Result<Principal>;

    /// Issues a token for a principal with a fixed expiry.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::StoreUnavailable` if encoding fails.
    fn issue(&self, principal: &Principal) -> Result<IssuedToken>;
}
