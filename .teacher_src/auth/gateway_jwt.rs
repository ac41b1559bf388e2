//! Per-org gateway JWT validation registry.
//!
//! Routes incoming JWTs to the correct per-org validator based on the `iss` claim.
//! Validators are cached across requests so the JWKS cache is reused, fixing the
//! per-request `JwtValidator` creation that previously discarded the JWKS cache.

use std::{collections::HashMap, sync::Arc, time::Instant};

use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::jwt::JwtValidator;
#[cfg(any(feature = "sso", test))]
use crate::config::JwtAuthConfig;

/// How long to cache "no SSO config exists for this issuer" results.
/// Prevents repeated DB queries from JWTs with unknown/attacker-controlled issuers.
const NEGATIVE_CACHE_TTL: std::time::Duration = std::time::Duration::from_secs(60);

/// Maximum number of negative cache entries before eviction kicks in.
/// Prevents unbounded memory growth from attacker-controlled JWT issuers.
const MAX_NEGATIVE_CACHE_ENTRIES: usize = 10_000;

/// Internal state behind the single `RwLock`.
struct RegistryInner {
    /// org_id → Arc<JwtValidator> (validators persist JWKS cache across requests)
    validators: HashMap<Uuid, Arc<JwtValidator>>,
    /// issuer → Vec<org_id> index for fast token routing
    issuer_index: HashMap<String, Vec<Uuid>>,
    /// Issuers that had no matching SSO config in the DB, cached to avoid repeated queries.
    negative_cache: HashMap<String, Instant>,
}

/// Registry of per-org `JwtValidator`s, indexed by issuer for fast token routing.
pub struct GatewayJwtRegistry {
    inner: RwLock<RegistryInner>,
    /// Serializes lazy-load operations to prevent thundering herd on cache miss.
    /// Only held during DB query + OIDC discovery for unknown issuers.
    load_mutex: Mutex<()>,
}

impl GatewayJwtRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                validators: HashMap::new(),
                issuer_index: HashMap::new(),
                negative_cache: HashMap::new(),
            }),
            load_mutex: Mutex::new(()),
        }
    }

    /// Register (or re-register) a validator built from an org SSO config.
    ///
    /// Fetches the JWKS URI from the OIDC discovery endpoint, builds a
    /// `JwtAuthConfig`, creates a `JwtValidator`, and stores it keyed by org_id.
    #[cfg(feature = "sso")]
    pub async fn register_from_sso_config(
        &self,
        config: &crate::models::OrgSsoConfig,
        http_client: &reqwest::Client,
        allow_loopback: bool,
    ) -> Result<(), super::AuthError> {
        use super::AuthError;

        let issuer = config
            .issuer
            .as_deref()
            .ok_or_else(|| AuthError::Internal("SSO config missing issuer".to_string()))?;
        let client_id = config
            .client_id
            .as_deref()
            .ok_or_else(|| AuthError::Internal("SSO config missing client_id".to_string()))?;

        // Determine the discovery URL
        let discovery_url = config.discovery_url.as_deref().unwrap_or(issuer);

        let jwks_url = super::fetch_jwks_uri(discovery_url, http_client, allow_loopback).await?;
        let jwt_config = build_jwt_config_from_sso(issuer, client_id, &jwks_url, config);
        let validator = Arc::new(JwtValidator::with_client(jwt_config, http_client.clone()));

        // Single write lock: remove old issuer index, insert validator, update index
        let mut inner = self.inner.write().await;
        remove_from_issuer_index(&mut inner, config.org_id);
        inner.validators.insert(config.org_id, validator);
        inner
            .issuer_index
            .entry(issuer.to_string())
            .or_default()
            .push(config.org_id);

        tracing::info!(
            org_id = %config.org_id,
            issuer = %issuer,
            "Registered gateway JWT validator for org"
        );

        Ok(())
    }

    /// Find all validators whose issuer matches the given string.
    pub async fn find_validators_by_issuer(&self, issuer: &str) -> Vec<(Uuid, Arc<JwtValidator>)> {
        let inner = self.inner.read().await;
        let Some(org_ids) = inner.issuer_index.get(issuer) else {
            return Vec::new();
        };
        org_ids
            .iter()
            .filter_map(|id| inner.validators.get(id).map(|v| (*id, v.clone())))
            .collect()
    }

    /// Remove a validator by org_id and clean up the issuer index.
    pub async fn remove(&self, org_id: Uuid) {
        let mut inner = self.inner.write().await;
        inner.validators.remove(&org_id);
        remove_from_issuer_index(&mut inner, org_id);
    }

    /// Find validators for an issuer, lazy-loading from the DB if needed.
    ///
    /// Deduplicates concurrent loads via `load_mutex` and caches negative results
    /// (unknown issuers) for [`NEGATIVE_CACHE_TTL`] to prevent DB query amplification.
    #[cfg(feature = "sso")]
    pub async fn find_or_load_by_issuer(
        &self,
        issuer: &str,
        db: &crate::db::DbPool,
        http_client: &reqwest::Client,
        allow_loopback: bool,
    ) -> Result<Vec<(Uuid, Arc<JwtValidator>)>, super::AuthError> {
        // Fast path: already cached
        let validators = self.find_validators_by_issuer(issuer).await;
        if !validators.is_empty() {
            return Ok(validators);
        }

        // Check negative cache (read lock only)
        {
            let inner = self.inner.read().await;
            if let Some(cached_at) = inner.negative_cache.get(issuer)
                && cached_at.elapsed() < NEGATIVE_CACHE_TTL
            {
                return Ok(Vec::new());
            }
        }

        // Serialize lazy-loads to prevent thundering herd.
        // The lock is held across DB query + OIDC discovery, but this only
        // triggers on cache miss (first request for an unknown issuer).
        let _guard = self.load_mutex.lock().await;

        // Re-check after acquiring lock — another request may have loaded it
        let validators = self.find_validators_by_issuer(issuer).await;
        if !validators.is_empty() {
            return Ok(validators);
        }

        // Also re-check negative cache (may have been populated while waiting)
        {
            let inner = self.inner.read().await;
            if let Some(cached_at) = inner.negative_cache.get(issuer)
                && cached_at.elapsed() < NEGATIVE_CACHE_TTL
            {
                return Ok(Vec::new());
            }
        }

        // Load from DB
        let configs = db
            .org_sso_configs()
            .find_enabled_oidc_by_issuer(issuer)
            .await
            .map_err(|e| super::AuthError::Internal(e.to_string()))?;

        if configs.is_empty() {
            // Cache negative result to avoid repeated DB queries
            let mut inner = self.inner.write().await;
            // Evict expired entries if at capacity
            if inner.negative_cache.len() >= MAX_NEGATIVE_CACHE_ENTRIES {
                inner
                    .negative_cache
                    .retain(|_, cached_at| cached_at.elapsed() < NEGATIVE_CACHE_TTL);
            }
            // If still at capacity after expiry cleanup, drop oldest half
            if inner.negative_cache.len() >= MAX_NEGATIVE_CACHE_ENTRIES {
                let mut entries: Vec<_> = inner.negative_cache.drain().collect();
                entries.sort_by_key(|(_, instant)| *instant);
                let half = entries.len() / 2;
                inner.negative_cache = entries.into_iter().skip(half).collect();
            }
            inner
                .negative_cache
                .insert(issuer.to_string(), Instant::now());
            return Ok(Vec::new());
        }

        for config in &configs {
            if let Err(e) = self
                .register_from_sso_config(config, http_client, allow_loopback)
                .await
            {
                tracing::warn!(
                    org_id = %config.org_id,
                    issuer = ?config.issuer,
                    error = %e,
                    "Failed to lazy-load gateway JWT validator for org"
                );
            }
        }

        Ok(self.find_validators_by_issuer(issuer).await)
    }

    /// Invalidate the negative cache for an issuer.
    ///
    /// Called when a new SSO config is created so that subsequent JWT requests
    /// for that issuer aren't blocked by a stale negative cache entry.
    pub async fn invalidate_negative_cache(&self, issuer: &str) {
        let mut inner = self.inner.write().await;
        inner.negative_cache.remove(issuer);
    }

    /// Number of registered validators.
    pub async fn len(&self) -> usize {
        self.inner.read().await.validators.len()
    }
}

/// Clean up issuer index entries for a given org_id. Operates on `&mut RegistryInner`
/// so callers can combine this with other mutations under a single write lock.
fn remove_from_issuer_index(inner: &mut RegistryInner, org_id: Uuid) {
    inner.issuer_index.retain(|_, ids| {
        ids.retain(|id| *id != org_id);
        !ids.is_empty()
    });
}

/// Build a `JwtAuthConfig` from per-org SSO config fields with secure defaults.
#[cfg(feature = "sso")]
fn build_jwt_config_from_sso(
    issuer: &str,
    client_id: &str,
    jwks_url: &str,
    config: &crate::models::OrgSsoConfig,
) -> JwtAuthConfig {
    use crate::config::{JwtAlgorithm, OneOrMany};

    JwtAuthConfig {
        issuer: issuer.to_string(),
        audience: OneOrMany::One(client_id.to_string()),
        jwks_url: jwks_url.to_string(),
        jwks_refresh_secs: 3600,
        identity_claim: config
            .identity_claim
            .clone()
            .unwrap_or_else(|| "sub".to_string()),
        org_claim: config.org_claim.clone(),
        additional_claims: Vec::new(),
        allow_expired: false,
        allowed_algorithms: vec![
            JwtAlgorithm::RS256,
            JwtAlgorithm::RS384,
            JwtAlgorithm::RS512,
            JwtAlgorithm::ES256,
            JwtAlgorithm::ES384,
        ],
    }
}
