//! Request context extraction and authentication middleware.
//!
//! Every `/api/v1` request gets a [`RequestContext`]. A bearer token, when
//! present, must verify; an invalid token fails the request with 401 even on
//! routes that allow anonymous access. Handlers that need an identity call
//! [`RequestContext::principal`].

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::extract::State;
use axum::http::header::HeaderName;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use ulid::Ulid;

use skein_catalog::Principal;

use crate::error::ApiError;
use crate::server::AppState;

/// Header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request context derived from authentication and headers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Verified identity, if a bearer token was presented.
    pub principal: Option<Principal>,
    /// Request ID for tracing/correlation.
    pub request_id: String,
}

impl RequestContext {
    /// Returns the verified identity or a 401.
    ///
    /// # Errors
    ///
    /// Returns `UNAUTHENTICATED` if the request carried no bearer token.
    pub fn principal(&self) -> Result<Principal, ApiError> {
        self.principal
            .ok_or_else(|| ApiError::missing_auth().with_request_id(self.request_id.clone()))
    }

    /// Converts a failure into an [`ApiError`] tagged with this request's ID.
    pub fn error(&self, err: impl Into<ApiError>) -> ApiError {
        err.into().with_request_id(self.request_id.clone())
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(existing) = parts.extensions.get::<Self>() {
            return Ok(existing.clone());
        }

        let headers = &parts.headers;
        let request_id =
            request_id_from_headers(headers).unwrap_or_else(|| Ulid::new().to_string());

        let principal = match bearer_token(headers) {
            Some(token) => {
                let principal = state.authenticator.verify(&token).map_err(|_| {
                    crate::metrics::record_auth_failure("invalid_token");
                    ApiError::invalid_token().with_request_id(request_id.clone())
                })?;
                Some(principal)
            }
            None => None,
        };

        let ctx = Self {
            principal,
            request_id,
        };

        parts.extensions.insert(ctx.clone());
        Ok(ctx)
    }
}

fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    header_string(headers, "X-Request-Id").filter(|id| !id.is_empty() && id.len() <= 128)
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = header_string(headers, "Authorization")?;
    let token = raw.strip_prefix("Bearer ")?;
    Some(token.trim().to_string())
}

pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    let value = headers.get(name)?;
    header_value_to_string(value)
}

fn header_value_to_string(value: &HeaderValue) -> Option<String> {
    value.to_str().ok().map(str::to_string)
}

/// Authentication middleware.
///
/// Injects a verified [`RequestContext`] into request extensions and echoes
/// the request ID on the response.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let ctx = match RequestContext::from_request_parts(&mut parts, &state).await {
        Ok(ctx) => ctx,
        Err(err) => return err.into_response(),
    };

    let mut req = Request::from_parts(parts, body);
    let request_id = ctx.request_id.clone();
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(REQUEST_ID_HEADER), value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_requires_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(bearer_token(&headers).is_none());

        headers.insert("authorization", HeaderValue::from_static("Bearer abc.def"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def"));
    }

    #[test]
    fn oversized_request_id_is_replaced() {
        let mut headers = HeaderMap::new();
        let long = "x".repeat(200);
        headers.insert("x-request-id", HeaderValue::from_str(&long).unwrap());
        assert!(request_id_from_headers(&headers).is_none());

        headers.insert("x-request-id", HeaderValue::from_static("abc-123"));
        assert_eq!(request_id_from_headers(&headers).as_deref(), Some("abc-123"));
    }
}
