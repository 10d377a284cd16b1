//! Session (login) routes.
//!
//! - `POST /sessions` - Exchange handle + secret for a bearer token

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skein_catalog::Principal;
use skein_core::AuthorId;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::server::AppState;

/// Login request.
#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    /// Author handle.
    pub handle: String,
    /// Plaintext secret.
    pub secret: String,
}

/// Login response.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    /// The authenticated author.
    pub author_id: AuthorId,
    /// Bearer token.
    pub token: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Creates session routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/sessions", post(create_session))
}

/// Log in.
///
/// POST /api/v1/sessions
///
/// An unknown handle and a wrong secret produce the same response.
pub(crate) async fn create_session(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let author = state
        .catalog
        .find_author_by_handle(&req.handle)
        .await
        .map_err(|e| ctx.error(e))?;

    let verified = match author {
        Some(author) => state
            .credentials
            .verify(&req.secret, &author.credential)
            .then_some(author),
        None => {
            state.credentials.reject_unknown(&req.secret);
            None
        }
    };
    let Some(author) = verified else {
        crate::metrics::record_auth_failure("bad_login");
        tracing::info!(request_id = %ctx.request_id, "login rejected");
        return Err(ctx.error(ApiError::unauthenticated("invalid handle or secret")));
    };

    let issued = state
        .authenticator
        .issue(&Principal::new(author.id))
        .map_err(|e| ctx.error(e))?;
    tracing::info!(author_id = %author.id, request_id = %ctx.request_id, "session issued");

    Ok(Json(SessionResponse {
        author_id: author.id,
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}
