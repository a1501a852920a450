use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub services: ServiceHealth,
}

#[derive(Serialize)]
pub struct ServiceHealth {
    pub ai_backend: String,
}

/// Health check endpoint - public
///
/// The process is up whenever this answers, so an unreachable model backend
/// only degrades the status.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let backend_ok = state.analyzer.backend_health().await;

    let status = if backend_ok { "healthy" } else { "degraded" };

    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        services: ServiceHealth {
            ai_backend: if backend_ok { "ok" } else { "error" }.to_string(),
        },
    })
}
