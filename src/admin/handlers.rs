use axum::{extract::State, Json};
use serde::Serialize;

use crate::http::{server::AppState, ProxyError};

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: &'static str,
    pub memory_usage_mb: f64,
    pub pool_replaced: bool,
}

/// Run a full cleanup now and report the resulting usage.
pub async fn cleanup_handler(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, ProxyError> {
    let report = state.monitor.cleanup().await.map_err(|e| {
        tracing::error!(error = %e, "Manual cleanup failed");
        ProxyError::Internal(e.to_string())
    })?;

    Ok(Json(CleanupResponse {
        message: "cleanup complete",
        memory_usage_mb: report.after.rounded_mb(),
        pool_replaced: report.pool_replaced,
    }))
}
