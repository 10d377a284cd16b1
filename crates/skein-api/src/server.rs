//! API server implementation.
//!
//! Provides health, ready, metrics and catalog endpoints, and runs the
//! background consistency sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use skein_catalog::{
    Authenticator, Catalog, CoordinatorOptions, EntityStore, InMemoryEntityStore, Reconciler,
};
use skein_core::{Collection, ListingId, Result};

use crate::auth::{CredentialDigest, JwtAuthenticator, ephemeral_secret};
use crate::config::{Config, CorsConfig};

// ============================================================================
// Health and Ready Responses
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ReadyResponse {
    /// Service readiness status.
    pub ready: bool,
    /// Optional message about readiness state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Catalog operations over the entity store.
    pub catalog: Catalog,
    /// Bearer token verification and issuance.
    pub authenticator: Arc<dyn Authenticator>,
    /// Credential digest for registration and login.
    pub credentials: CredentialDigest,
    /// Consistency checker and repairer.
    pub reconciler: Reconciler,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("catalog", &"<Catalog>")
            .field("authenticator", &"<Authenticator>")
            .field("credentials", &self.credentials)
            .field("reconciler", &"<Reconciler>")
            .finish()
    }
}

impl AppState {
    /// Creates application state over the given entity store.
    ///
    /// In debug mode a missing JWT secret or credential pepper is replaced by
    /// a random per-process value.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn EntityStore>) -> Self {
        let jwt_secret = config.jwt.hs256_secret.clone().unwrap_or_else(|| {
            tracing::warn!("SKEIN_JWT_SECRET not set; using an ephemeral signing key (debug only)");
            ephemeral_secret()
        });
        let pepper = config.credential_pepper.clone().unwrap_or_else(|| {
            tracing::warn!(
                "SKEIN_CREDENTIAL_PEPPER not set; using an ephemeral pepper (debug only)"
            );
            ephemeral_secret()
        });

        let catalog = Catalog::new(
            Arc::clone(&store),
            CoordinatorOptions {
                max_cas_attempts: config.max_cas_attempts,
            },
        );
        let grace_secs = i64::try_from(config.repair.orphan_grace_secs).unwrap_or(i64::MAX / 1000);
        let orphan_grace = chrono::Duration::seconds(grace_secs);
        let reconciler = Reconciler::new(store)
            .with_orphan_grace(orphan_grace)
            .with_max_cas_attempts(config.max_cas_attempts);

        Self {
            authenticator: Arc::new(JwtAuthenticator::new(
                jwt_secret.as_bytes(),
                config.jwt.ttl_seconds,
            )),
            credentials: CredentialDigest::new(pepper),
            catalog,
            reconciler,
            config,
        }
    }

    /// Creates application state with an in-memory store (for testing).
    #[must_use]
    pub fn with_memory_store(config: Config) -> Self {
        Self::new(config, Arc::new(InMemoryEntityStore::new()))
    }
}

// ============================================================================
// Route Handlers
// ============================================================================

/// Health check endpoint handler.
///
/// Shallow liveness check; does not touch the store.
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Readiness check endpoint handler.
///
/// A point read of a listing that cannot exist is enough to prove the
/// store answers.
async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state
        .catalog
        .store()
        .listings()
        .get(&ListingId::generate())
        .await
    {
        Ok(_) => (
            StatusCode::OK,
            Json(ReadyResponse {
                ready: true,
                message: None,
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    ready: false,
                    message: Some("store check failed".to_string()),
                }),
            )
        }
    }
}

// ============================================================================
// Server
// ============================================================================

/// The Skein API server.
pub struct Server {
    config: Config,
    store: Arc<dyn EntityStore>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("store", &"<EntityStore>")
            .finish()
    }
}

impl Server {
    /// Creates a new server with the given configuration and an in-memory store.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            store: Arc::new(InMemoryEntityStore::new()),
        }
    }

    /// Creates a new server with an explicit entity store.
    #[must_use]
    pub fn with_store(config: Config, store: Arc<dyn EntityStore>) -> Self {
        Self { config, store }
    }

    /// Creates a new `ServerBuilder`.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn create_state(&self) -> Arc<AppState> {
        Arc::new(AppState::new(self.config.clone(), Arc::clone(&self.store)))
    }

    /// Creates the router with all routes and middleware.
    fn create_router(state: Arc<AppState>) -> Router {
        let cors = Self::build_cors_layer(&state.config.cors);
        let auth_layer =
            middleware::from_fn_with_state(Arc::clone(&state), crate::context::auth_middleware);
        let metrics_layer = middleware::from_fn(crate::metrics::metrics_middleware);

        Router::new()
            // Health, ready, and metrics endpoints (no auth required)
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/metrics", get(crate::metrics::serve_metrics))
            .nest("/api/v1", crate::routes::api_v1_routes().layer(auth_layer))
            // Middleware (order matters): Metrics outermost for timing, then trace, then CORS.
            .layer(cors)
            .layer(TraceLayer::new_for_http())
            .layer(metrics_layer)
            .with_state(state)
    }

    fn build_cors_layer(cors_config: &CorsConfig) -> CorsLayer {
        let cors = CorsLayer::new()
            .allow_methods([
                Method::GET,
                Method::HEAD,
                Method::POST,
                Method::PUT,
                Method::DELETE,
                Method::OPTIONS,
            ])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                header::ACCEPT,
                header::HeaderName::from_static("x-request-id"),
            ])
            .expose_headers([
                header::CONTENT_TYPE,
                header::CONTENT_LENGTH,
                header::RETRY_AFTER,
                header::HeaderName::from_static("x-request-id"),
            ])
            .max_age(Duration::from_secs(cors_config.max_age_seconds));

        if cors_config.allowed_origins.is_empty() {
            return cors;
        }

        if cors_config.allowed_origins.len() == 1
            && cors_config
                .allowed_origins
                .first()
                .is_some_and(|origin| origin == "*")
        {
            return cors.allow_origin(Any);
        }

        if cors_config.allowed_origins.iter().any(|origin| origin == "*") {
            tracing::error!(
                origins = ?cors_config.allowed_origins,
                "Invalid CORS config: '*' must be the only allowed origin"
            );
            return cors;
        }

        let mut allowed = Vec::new();
        for origin in &cors_config.allowed_origins {
            match HeaderValue::from_str(origin) {
                Ok(value) => allowed.push(value),
                Err(_) => {
                    tracing::error!(origin = %origin, "Invalid CORS origin; expected a valid HeaderValue");
                }
            }
        }

        if allowed.is_empty() {
            tracing::warn!("All configured CORS origins were invalid; disabling CORS");
            cors
        } else {
            tracing::info!(origins = ?cors_config.allowed_origins, "CORS configured");
            cors.allow_origin(AllowOrigin::list(allowed))
        }
    }

    /// Starts the server and blocks until shutdown (Ctrl-C or SIGTERM).
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is unsafe or the server cannot
    /// bind to the port.
    pub async fn serve(&self) -> Result<()> {
        self.validate_config()?;

        crate::metrics::init_metrics();
        skein_catalog::metrics::register_metrics();

        let state = self.create_state();
        let sweeper = (state.config.repair.interval_secs > 0).then(|| {
            tokio::spawn(repair_loop(
                state.reconciler.clone(),
                Duration::from_secs(state.config.repair.interval_secs),
            ))
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = Self::create_router(state);

        tracing::info!(http_port = self.config.http_port, "Starting Skein API server");

        let listener =
            tokio::net::TcpListener::bind(addr)
                .await
                .map_err(|e| skein_core::Error::Internal {
                    message: format!("failed to bind to {addr}: {e}"),
                })?;

        let served = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| skein_core::Error::Internal {
                message: format!("server error: {e}"),
            });

        if let Some(sweeper) = sweeper {
            sweeper.abort();
        }
        served
    }

    /// Creates a test router for the server.
    ///
    /// Intended for integration tests that drive routes without binding a port.
    #[doc(hidden)]
    pub fn test_router(&self) -> Router {
        Self::create_router(self.create_state())
    }

    fn validate_config(&self) -> Result<()> {
        if self.config.debug {
            return Ok(());
        }

        if self
            .config
            .cors
            .allowed_origins
            .iter()
            .any(|origin| origin == "*")
        {
            return Err(skein_core::Error::InvalidInput(
                "cors.allowed_origins cannot include '*' when debug=false".to_string(),
            ));
        }
        if self.config.jwt.hs256_secret.is_none() {
            return Err(skein_core::Error::InvalidInput(
                "SKEIN_JWT_SECRET is required when debug=false".to_string(),
            ));
        }
        if self.config.credential_pepper.is_none() {
            return Err(skein_core::Error::InvalidInput(
                "SKEIN_CREDENTIAL_PEPPER is required when debug=false".to_string(),
            ));
        }

        Ok(())
    }
}

/// Runs `check` + `repair` every `interval` until aborted.
async fn repair_loop(reconciler: Reconciler, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick fires immediately; skip it so startup is not a sweep.
    ticker.tick().await;

    loop {
        ticker.tick().await;
        match reconciler.sweep().await {
            Ok((report, result)) => {
                crate::metrics::record_repair_sweep("success");
                if report.has_issues() {
                    tracing::info!(
                        issues = report.issues.len(),
                        repaired = result.repaired_count,
                        skipped = result.skipped_count,
                        failed = result.failed_count,
                        "consistency sweep finished"
                    );
                } else {
                    tracing::debug!("consistency sweep found no issues");
                }
            }
            Err(e) => {
                crate::metrics::record_repair_sweep("error");
                tracing::error!(error = %e, "consistency sweep failed");
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

/// Builder for constructing a server.
pub struct ServerBuilder {
    config: Config,
    store: Arc<dyn EntityStore>,
}

impl std::fmt::Debug for ServerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerBuilder")
            .field("config", &self.config)
            .field("store", &"<EntityStore>")
            .finish()
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            config: Config::default(),
            store: Arc::new(InMemoryEntityStore::new()),
        }
    }
}

impl ServerBuilder {
    /// Creates a new server builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the HTTP port.
    #[must_use]
    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    /// Enables debug mode.
    #[must_use]
    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    /// Sets the JWT HS256 secret. Required when `debug` is false.
    #[must_use]
    pub fn jwt_hs256_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.jwt.hs256_secret = Some(secret.into());
        self
    }

    /// Sets the credential pepper. Required when `debug` is false.
    #[must_use]
    pub fn credential_pepper(mut self, pepper: impl Into<String>) -> Self {
        self.config.credential_pepper = Some(pepper.into());
        self
    }

    /// Enables the maintenance endpoints behind `secret`.
    #[must_use]
    pub fn maintenance_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.maintenance_secret = Some(secret.into());
        self
    }

    /// Requires `secret` to scrape `/metrics`.
    #[must_use]
    pub fn metrics_secret(mut self, secret: impl Into<String>) -> Self {
        self.config.metrics_secret = Some(secret.into());
        self
    }

    /// Sets the orphan grace period used by the reconciler.
    #[must_use]
    pub fn orphan_grace_secs(mut self, secs: u64) -> Self {
        self.config.repair.orphan_grace_secs = secs;
        self
    }

    /// Sets the entity store used by request handlers.
    ///
    /// By default the server uses an in-memory store.
    #[must_use]
    pub fn store(mut self, store: Arc<dyn EntityStore>) -> Self {
        self.store = store;
        self
    }

    /// Builds the server.
    #[must_use]
    pub fn build(self) -> Server {
        Server {
            config: self.config,
            store: self.store,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
