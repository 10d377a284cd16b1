//! HTTP route handlers.

pub mod authors;
pub mod listings;
pub mod maintenance;
pub mod reviews;
pub mod sessions;

use std::sync::Arc;

use axum::Router;

use crate::error::ApiError;
use crate::server::AppState;

/// `/api/v1` routes.
///
/// Reads are anonymous; writes require a bearer token (enforced per handler
/// through [`crate::context::RequestContext::principal`]).
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(authors::routes())
        .merge(sessions::routes())
        .merge(listings::routes())
        .merge(reviews::routes())
        .merge(maintenance::routes())
}

/// Parses a path segment into a typed ID, answering 400 on garbage.
pub(crate) fn parse_id<T>(raw: &str, request_id: &str) -> Result<T, ApiError>
where
    T: std::str::FromStr<Err = skein_core::Error>,
{
    raw.parse::<T>()
        .map_err(|e| ApiError::from(e).with_request_id(request_id))
}
