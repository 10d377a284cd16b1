//! Request body extraction.
//!
//! [`ApiJson`] wraps `axum::Json` so a body that fails to parse answers with
//! the same `VALIDATION_FAILED` envelope as every other client error, tagged
//! with the request ID set by the auth middleware.

use async_trait::async_trait;
use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::context::RequestContext;
use crate::error::ApiError;

/// JSON request body whose rejection is an [`ApiError`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = req
            .extensions()
            .get::<RequestContext>()
            .map(|ctx| ctx.request_id.clone());

        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "rejected request body");
                let err = ApiError::from(rejection);
                Err(match request_id {
                    Some(id) => err.with_request_id(id),
                    None => err,
                })
            }
        }
    }
}
