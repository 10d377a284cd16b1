//! Consistency maintenance routes.
//!
//! Disabled (404) unless a maintenance secret is configured; callers present
//! it in `X-Maintenance-Secret`.
//!
//! - `GET  /maintenance/consistency` - Reconciliation report
//! - `POST /maintenance/repair` - Check, then repair what the check found

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use skein_catalog::{ReconciliationReport, RepairResult};

use crate::auth::shared_secret_matches;
use crate::context::{RequestContext, header_string};
use crate::error::ApiError;
use crate::server::AppState;

/// Header carrying the maintenance secret.
pub const MAINTENANCE_SECRET_HEADER: &str = "X-Maintenance-Secret";

/// Repair response.
#[derive(Debug, Serialize)]
pub struct RepairResponse {
    /// What the check found.
    pub report: ReconciliationReport,
    /// What the repair did.
    pub result: RepairResult,
}

/// Creates maintenance routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/maintenance/consistency", get(check_consistency))
        .route("/maintenance/repair", post(repair))
}

fn authorize(ctx: &RequestContext, state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(secret) = state.config.maintenance_secret.as_deref() else {
        return Err(ctx.error(ApiError::not_found("maintenance endpoints are disabled")));
    };
    let presented = header_string(headers, MAINTENANCE_SECRET_HEADER);
    if presented.is_some_and(|p| shared_secret_matches(&p, secret)) {
        Ok(())
    } else {
        crate::metrics::record_auth_failure("maintenance_secret");
        Err(ctx.error(ApiError::unauthenticated("maintenance secret required")))
    }
}

/// Run a consistency check.
///
/// GET /api/v1/maintenance/consistency
pub(crate) async fn check_consistency(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&ctx, &state, &headers)?;
    let report = state.reconciler.check().await.map_err(|e| ctx.error(e))?;
    tracing::info!(
        issues = report.issues.len(),
        request_id = %ctx.request_id,
        "consistency check served"
    );
    Ok(Json(report))
}

/// Check, then repair.
///
/// POST /api/v1/maintenance/repair
pub(crate) async fn repair(
    ctx: RequestContext,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    authorize(&ctx, &state, &headers)?;
    let (report, result) = state.reconciler.sweep().await.map_err(|e| ctx.error(e))?;
    tracing::info!(
        issues = report.issues.len(),
        repaired = result.repaired_count,
        failed = result.failed_count,
        request_id = %ctx.request_id,
        "repair served"
    );
    Ok(Json(RepairResponse { report, result }))
}
