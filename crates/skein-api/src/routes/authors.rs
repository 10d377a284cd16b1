//! Author API routes.
//!
//! ## Routes
//!
//! - `POST /authors` - Register an author (returns a bearer token)
//! - `GET  /authors/{id}` - Public profile
//! - `PUT  /authors/{id}` - Change handle and/or secret (owner only)
//! - `GET  /authors/{id}/reviews` - Reviews by the author, newest first

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use skein_catalog::{Author, AuthorUpdate, Principal};
use skein_core::{AuthorId, ReviewId};

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::routes::parse_id;
use crate::routes::reviews::ListReviewsResponse;
use crate::server::AppState;

/// Request to register an author.
#[derive(Debug, Deserialize)]
pub struct RegisterAuthorRequest {
    /// Desired handle (ASCII letters and digits).
    pub handle: String,
    /// Plaintext secret; only its digest is stored.
    pub secret: String,
}

/// Request to update an author.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateAuthorRequest {
    /// New handle.
    pub handle: Option<String>,
    /// New plaintext secret.
    pub secret: Option<String>,
}

/// Public author profile. Never includes the credential.
#[derive(Debug, Serialize)]
pub struct AuthorResponse {
    /// Author ID.
    pub id: AuthorId,
    /// Handle.
    pub handle: String,
    /// Reviews written by the author.
    pub review_refs: Vec<ReviewId>,
    /// Registration timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<Author> for AuthorResponse {
    fn from(author: Author) -> Self {
        Self {
            id: author.id,
            handle: author.handle.as_str().to_string(),
            review_refs: author.review_refs,
            created_at: author.created_at,
        }
    }
}

/// Registration response.
#[derive(Debug, Serialize)]
pub struct RegisterAuthorResponse {
    /// The new author.
    pub author: AuthorResponse,
    /// Bearer token for the new author.
    pub token: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Creates author routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/authors", post(register_author))
        .route("/authors/:id", get(get_author).put(update_author))
        .route("/authors/:id/reviews", get(list_author_reviews))
}

/// Register an author.
///
/// POST /api/v1/authors
pub(crate) async fn register_author(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<RegisterAuthorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!(handle = %req.handle, request_id = %ctx.request_id, "Registering author");

    let digest = state
        .credentials
        .digest(&req.secret)
        .map_err(|e| ctx.error(e))?;
    let author = state
        .catalog
        .register_author(&req.handle, digest)
        .await
        .map_err(|e| ctx.error(e))?;

    let issued = state
        .authenticator
        .issue(&Principal::new(author.id))
        .map_err(|e| ctx.error(e))?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterAuthorResponse {
            author: author.into(),
            token: issued.token,
            expires_at: issued.expires_at,
        }),
    ))
}

/// Get an author's public profile.
///
/// GET /api/v1/authors/{id}
pub(crate) async fn get_author(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let author_id: AuthorId = parse_id(&id, &ctx.request_id)?;
    let author = state
        .catalog
        .get_author(author_id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(AuthorResponse::from(author)))
}

/// Change an author's handle and/or secret.
///
/// PUT /api/v1/authors/{id}
pub(crate) async fn update_author(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateAuthorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let acting = ctx.principal()?;
    let author_id: AuthorId = parse_id(&id, &ctx.request_id)?;
    tracing::info!(author_id = %author_id, request_id = %ctx.request_id, "Updating author");

    let credential = req
        .secret
        .as_deref()
        .map(|secret| state.credentials.digest(secret))
        .transpose()
        .map_err(|e| ctx.error(e))?;

    let author = state
        .catalog
        .update_author(
            &acting,
            author_id,
            AuthorUpdate {
                handle: req.handle,
                credential,
            },
        )
        .await
        .map_err(|e| ctx.error(e))?;

    Ok(Json(AuthorResponse::from(author)))
}

/// List reviews written by an author, newest first.
///
/// GET /api/v1/authors/{id}/reviews
pub(crate) async fn list_author_reviews(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let author_id: AuthorId = parse_id(&id, &ctx.request_id)?;
    let reviews = state
        .catalog
        .reviews_by_author(author_id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(ListReviewsResponse { reviews }))
}
