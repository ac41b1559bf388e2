//! Health endpoints for probes and monitoring.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::{AppState, audit::AUDIT_COLLECTION, store::Filter};

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    /// "healthy" or "unhealthy"
    pub status: String,
    pub version: String,
    pub store_backend: String,
}

/// Full health check: verifies the document store answers a trivial query.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_healthy = state
        .store
        .query(AUDIT_COLLECTION, Filter::new().limit(1))
        .await
        .is_ok();

    let status_code = if store_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let health = HealthStatus {
        status: if store_healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        store_backend: state.store.backend_name().to_string(),
    };

    (status_code, Json(health))
}

/// Liveness probe: succeeds whenever the process is running.
pub async fn liveness() -> impl IntoResponse {
    StatusCode::OK
}
