//! Health check handlers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Health check endpoint (liveness probe).
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub active_processes: usize,
    pub checks: Vec<CheckStatus>,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub tool: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Readiness check endpoint.
///
/// Reports degraded (503) when either external tool fails a trivial
/// version-query invocation.
pub async fn ready(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let health = state.service.health().await;

    let checks = health
        .checks
        .into_iter()
        .map(|check| CheckStatus {
            tool: check.tool,
            status: if check.ok { "ok" } else { "error" }.to_string(),
            error: check.error,
        })
        .collect();

    let response = ReadinessResponse {
        status: if health.degraded { "degraded" } else { "ready" }.to_string(),
        active_processes: state.service.active_processes(),
        checks,
    };

    if health.degraded {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    } else {
        Ok(Json(response))
    }
}
