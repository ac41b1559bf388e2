//! HTTP surface: health probes plus the protected admin gateways.

pub mod admin;
pub mod health;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Assemble the full application router.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness))
        .merge(admin::get_admin_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
