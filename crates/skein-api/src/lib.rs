//! # skein-api
//!
//! HTTP composition layer for the Skein yarn review catalog.
//!
//! This crate provides the API surface for Skein, handling:
//!
//! - **Authentication**: Bearer token issuance/verification and credential digests
//! - **Routing**: HTTP endpoints for authors, sessions, listings, and reviews
//! - **Maintenance**: Consistency checks and a periodic repair sweep
//! - **Observability**: Metrics, tracing, and health checks
//!
//! ## Design Principles
//!
//! This crate is a **thin composition layer** with no domain policy.
//! Validation, ownership checks, and the review write protocol live in
//! `skein-catalog`.
//!
//! ## Endpoints
//!
//! ```text
//! GET  /health, /ready, /metrics
//! POST /api/v1/authors                  register (returns token)
//! POST /api/v1/sessions                 login
//! GET  /api/v1/authors/{id}             profile
//! PUT  /api/v1/authors/{id}             update handle/secret (owner only)
//! GET  /api/v1/authors/{id}/reviews     reviews by author
//! GET  /api/v1/listings                 listing summaries (?owner=)
//! POST /api/v1/listings                 create listing
//! GET  /api/v1/listings/{id}            listing detail
//! GET  /api/v1/listings/{id}/reviews    reviews for listing
//! POST /api/v1/reviews                  create review
//! GET  /api/v1/reviews/{id}
//! PUT  /api/v1/reviews/{id}             edit (author only)
//! DELETE /api/v1/reviews/{id}           delete (author only)
//! GET  /api/v1/maintenance/consistency  reconciliation report
//! POST /api/v1/maintenance/repair       check + repair
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use skein_api::server::Server;
//!
//! let server = Server::builder()
//!     .http_port(8000)
//!     .jwt_hs256_secret(secret)
//!     .credential_pepper(pepper)
//!     .build();
//!
//! server.serve().await?;
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod extract;
pub mod metrics;
pub mod routes;
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::context::RequestContext;
    pub use crate::error::{ApiError, ApiResult};
    pub use crate::server::Server;
}
