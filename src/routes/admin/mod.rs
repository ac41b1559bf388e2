//! Administrative HTTP surface: manual deletion and audit trail reads.
//!
//! Every route requires the admin capability, checked by the [`AdminAuth`]
//! extractor against the configured verifier.

pub mod audit_logs;
pub mod deletions;
mod error;

use axum::{
    Router,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    routing::{get, post},
};
pub use error::{AdminError, ErrorResponse};

use crate::{
    AppState,
    authz::{AdminIdentity, AuthContext},
};

pub fn get_admin_routes() -> Router<AppState> {
    Router::new().nest("/admin/v1", admin_v1_routes())
}

fn admin_v1_routes() -> Router<AppState> {
    Router::new()
        .route("/deletions", post(deletions::create))
        .route("/deletion-audit-logs", get(audit_logs::list))
}

/// Extractor rejecting callers without the admin capability.
///
/// Expects `Authorization: Bearer <token>`; a missing or unverifiable token
/// maps to the same permission-denied response so probes cannot distinguish
/// unknown tokens from missing ones.
pub struct AdminAuth(pub AdminIdentity);

impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = AdminError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(AdminError::PermissionDenied)?;
        let ctx = AuthContext {
            token: token.to_string(),
        };
        match state.authz.verify(&ctx).await {
            Some(identity) => Ok(AdminAuth(identity)),
            None => Err(AdminError::PermissionDenied),
        }
    }
}
