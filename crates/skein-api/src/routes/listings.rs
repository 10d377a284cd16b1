//! Listing API routes.
//!
//! ## Routes
//!
//! - `GET  /listings` - Listing summaries, optionally `?owner={author_id}`
//! - `POST /listings` - Create a listing (authenticated)
//! - `GET  /listings/{id}` - Listing detail
//! - `GET  /listings/{id}/reviews` - Reviews for a listing, newest first

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use skein_catalog::{ListingSummary, NewListing};
use skein_core::{AuthorId, ListingId};

use crate::context::RequestContext;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::routes::parse_id;
use crate::routes::reviews::ListReviewsResponse;
use crate::server::AppState;

/// List listings response.
#[derive(Debug, Serialize)]
pub struct ListListingsResponse {
    /// Listing summaries, oldest first.
    pub listings: Vec<ListingSummary>,
}

/// Query parameters for listing summaries.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListListingsParams {
    /// Only listings posted by this author.
    pub owner: Option<String>,
}

/// Creates listing routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/listings", get(list_listings).post(create_listing))
        .route("/listings/:id", get(get_listing))
        .route("/listings/:id/reviews", get(list_listing_reviews))
}

/// List listings, optionally only those of one owner.
///
/// GET /api/v1/listings
pub(crate) async fn list_listings(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListListingsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let listings = match params.owner.as_deref() {
        Some(owner) => {
            let owner: AuthorId = parse_id(owner, &ctx.request_id)?;
            state.catalog.listings_owned_by(owner).await
        }
        None => state.catalog.list_listings().await,
    }
    .map_err(|e| ctx.error(e))?;
    Ok(Json(ListListingsResponse { listings }))
}

/// Create a listing owned by the caller.
///
/// POST /api/v1/listings
pub(crate) async fn create_listing(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    ApiJson(req): ApiJson<NewListing>,
) -> Result<impl IntoResponse, ApiError> {
    let acting = ctx.principal()?;
    tracing::info!(
        owner = %acting.author_id,
        name = %req.name,
        request_id = %ctx.request_id,
        "Creating listing"
    );

    let listing = state
        .catalog
        .create_listing(&acting, req)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok((StatusCode::CREATED, Json(listing)))
}

/// Get a listing.
///
/// GET /api/v1/listings/{id}
pub(crate) async fn get_listing(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let listing_id: ListingId = parse_id(&id, &ctx.request_id)?;
    let listing = state
        .catalog
        .get_listing(listing_id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(listing))
}

/// List the reviews of a listing, newest first.
///
/// GET /api/v1/listings/{id}/reviews
pub(crate) async fn list_listing_reviews(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let listing_id: ListingId = parse_id(&id, &ctx.request_id)?;
    let reviews = state
        .catalog
        .reviews_for_listing(listing_id)
        .await
        .map_err(|e| ctx.error(e))?;
    Ok(Json(ListReviewsResponse { reviews }))
}
