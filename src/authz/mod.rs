//! Caller-authorization capability for the admin gateways.
//!
//! The manual-deletion and audit-query endpoints require an administrative
//! capability. The check itself is a collaborator behind [`AdminVerifier`];
//! the built-in implementation matches a static bearer-token table from
//! configuration and yields the operator name recorded in the audit trail.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AuthConfig;

/// Credentials presented by a caller.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Bearer token from the Authorization header.
    pub token: String,
}

/// A verified administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminIdentity {
    /// Operator name, written into `deleted_by` on manual audit records.
    pub operator: String,
}

/// Trait for pluggable admin authorization.
#[async_trait]
pub trait AdminVerifier: Send + Sync {
    /// Resolve the caller to an admin identity, or `None` if the caller does
    /// not hold the administrative capability.
    async fn verify(&self, ctx: &AuthContext) -> Option<AdminIdentity>;
}

/// Verifier backed by the static operator -> token table from `[auth]`
/// config.
///
/// An empty table means nobody is an admin; the protected endpoints then
/// reject every caller.
pub struct StaticTokenVerifier {
    tokens: Vec<(String, String)>,
}

impl StaticTokenVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            tokens: config
                .admin_tokens
                .iter()
                .map(|(operator, token)| (operator.clone(), token.clone()))
                .collect(),
        }
    }

    pub fn from_config(config: &AuthConfig) -> Arc<dyn AdminVerifier> {
        Arc::new(Self::new(config))
    }
}

#[async_trait]
impl AdminVerifier for StaticTokenVerifier {
    async fn verify(&self, ctx: &AuthContext) -> Option<AdminIdentity> {
        self.tokens
            .iter()
            .find(|(_, token)| token == &ctx.token)
            .map(|(operator, _)| AdminIdentity {
                operator: operator.clone(),
            })
    }
}
