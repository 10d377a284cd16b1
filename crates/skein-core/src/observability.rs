//! Observability infrastructure for Skein.
//!
//! Structured logging with consistent spans. This module provides the
//! initialization helper and the span constructors used by the catalog and
//! the API so that every write step of a review operation can be correlated.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `skein_catalog=debug`)
///
/// # Example
///
/// ```rust
/// use skein_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for review lifecycle operations.
///
/// # Example
///
/// ```rust
/// use skein_core::observability::review_span;
///
/// let span = review_span("edit_review", "01J5Z6Q8W3K2M1N0P9R8S7T6V5");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn review_span(operation: &str, review_id: &str) -> Span {
    tracing::info_span!("review", op = operation, review_id = review_id)
}

/// Creates a span for catalog operations on listings and authors.
///
/// # Example
///
/// ```rust
/// use skein_core::observability::catalog_span;
///
/// let span = catalog_span("create_listing", "listing");
/// let _guard = span.enter();
/// ```
#[must_use]
pub fn catalog_span(operation: &str, entity: &str) -> Span {
    tracing::info_span!("catalog", op = operation, entity = entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_succeeds() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Pretty); // Second call should be no-op
    }

    #[test]
    fn test_span_helpers_create_spans() {
        let span = review_span("create_review", "r1");
        let _guard = span.enter();
        tracing::info!("inside review span");

        let span = catalog_span("register_author", "author");
        let _guard = span.enter();
        tracing::info!("inside catalog span");
    }
}
