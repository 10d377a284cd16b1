//! Access guard.
//!
//! Compares a verified principal with the recorded owner of a resource. Token
//! verification happens upstream in the [`Authenticator`](crate::auth::Authenticator).

use skein_core::AuthorId;

use crate::auth::Principal;
use crate::error::{CatalogError, Result};

/// Outcome of an ownership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// The principal owns the resource.
    Allowed,
    /// The principal is someone else.
    Denied,
}

/// Checks whether `acting` owns a resource recorded as owned by `owner`.
#[must_use]
pub fn authorize(acting: &Principal, owner: AuthorId) -> Access {
    if acting.author_id == owner {
        Access::Allowed
    } else {
        Access::Denied
    }
}

/// Requires ownership, logging the denial.
///
/// # Errors
///
/// Returns [`CatalogError::Unauthorized`] if `acting` is not `owner`.
pub fn require_owner(acting: &Principal, owner: AuthorId, action: &str) -> Result<()> {
    match authorize(acting, owner) {
        Access::Allowed => Ok(()),
        Access::Denied => {
            tracing::warn!(
                acting = %acting.author_id,
                owner = %owner,
                action,
                "access denied"
            );
            Err(CatalogError::unauthorized(format!(
                "only the owner may {action}"
            )))
        }
    }
}
