//! Review API routes.
//!
//! Writes go through the review coordinator, which keeps listing and author
//! back-references and the listing average consistent.
//!
//! ## Routes
//!
//! - `POST   /reviews` - Create a review (authenticated)
//! - `GET    /reviews/{id}` - Get a review
//! - `PUT    /reviews/{id}` - Edit a review (author only)
//! - `DELETE /reviews/{id}` - Delete a review (author only)

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use skein_catalog::{NewReview, Review, ReviewEdit};
use skein_core::ReviewId;

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::routes::parse_id;
use crate::server::AppState;

/// List reviews response.
#[derive(Debug, Serialize)]
pub struct ListReviewsResponse {
    /// Reviews, newest first.
    pub reviews: Vec<Review>,
}

/// Creates review routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/reviews", post(create_review))
        .route(
            "/reviews/:id",
            get(get_review).put(edit_review).delete(delete_review),
        )
}

/// Create a review.
///
/// POST /api/v1/reviews
pub(crate) async fn create_review(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<NewReview>,
) -> Result<impl IntoResponse, ApiError> {
    let acting = ctx.principal()?;
    tracing::info!(
        author_id = %acting.author_id,
        listing_id = %req.listing_id,
        request_id = %ctx.request_id,
        "Creating review"
    );

    let review = state
        .catalog
        .create_review(&acting, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// Get a review.
///
/// GET /api/v1/reviews/{id}
pub(crate) async fn get_review(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let review_id: ReviewId = parse_id(&id, &ctx.request_id)?;
    let review = state
        .catalog
        .get_review(review_id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(review))
}

/// Edit a review. Omitted fields keep their stored value.
///
/// PUT /api/v1/reviews/{id}
pub(crate) async fn edit_review(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ReviewEdit>,
) -> Result<impl IntoResponse, ApiError> {
    let acting = ctx.principal()?;
    let review_id: ReviewId = parse_id(&id, &ctx.request_id)?;
    tracing::info!(review_id = %review_id, request_id = %ctx.request_id, "Editing review");

    let review = state
        .catalog
        .edit_review(review_id, &acting, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(review))
}

/// Delete a review.
///
/// DELETE /api/v1/reviews/{id}
pub(crate) async fn delete_review(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let acting = ctx.principal()?;
    let review_id: ReviewId = parse_id(&id, &ctx.request_id)?;
    tracing::info!(review_id = %review_id, request_id = %ctx.request_id, "Deleting review");

    state
        .catalog
        .delete_review(review_id, &acting)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(StatusCode::NO_CONTENT)
}
