//! Policy registry for per-organization RBAC policies.
//!
//! This module provides a `PolicyRegistry` that wraps the system-level `AuthzEngine`
//! and adds support for per-organization RBAC policies stored in the database.
//!
//! # Architecture
//!
//! The `PolicyRegistry` maintains a cache of compiled CEL programs for each organization's
//! policies. This provides:
//! - **Eager compilation**: Policies are compiled at startup to catch errors early
//! - **Lazy refresh**: When policies are updated, only that org's cache is invalidated
//! - **System-first evaluation**: System policies from config are evaluated first
//! - **Multi-node consistency**: Redis-based version tracking for distributed deployments
//!
//! # Multi-Node Cache Consistency
//!
//! In multi-node deployments with Redis, the registry uses a version-based cache
//! invalidation strategy:
//!
//! 1. Each org's policies have a version number stored in Redis
//! 2. On policy CRUD operations, the version is incremented atomically
//! 3. Each node tracks when it last checked the Redis version (local TTL)
//! 4. If TTL has expired, the node checks Redis and refreshes if version mismatch
//!
//! This provides bounded staleness (max 1 TTL period) with minimal Redis overhead.
//!
//! # Evaluation Order
//!
//! 1. Check if RBAC is globally disabled → allow all
//! 2. Evaluate system policies (from config) first - highest priority
//! 3. If system policy matched → return that decision
//! 4. If org_id provided → evaluate org policies (from database)
//! 5. If org policy matched → return that decision
//! 6. No policy matched → apply default_effect
//!
//! # Usage
//!
//! ```rust,ignore
//! // Initialize at startup
//! let registry = PolicyRegistry::initialize_from_db(
//!     &org_rbac_policy_service,
//!     engine,
//!     default_effect,
//!     cache,
//!     policy_repo,
//!     version_check_ttl,
//! ).await?;
//!
//! // Authorize with org context
//! let result = registry.authorize_with_org(
//!     Some(org_id),
//!     &subject,
//!     &context,
//! );
//! ```

#[cfg(feature = "cel")]
use std::{collections::HashMap, panic, time::Instant};
use std::{sync::Arc, time::Duration};

#[cfg(feature = "cel")]
use cel_interpreter::{Context, Program, Value, to_value};
use thiserror::Error;
#[cfg(feature = "cel")]
use tokio::sync::RwLock;
use uuid::Uuid;

#[cfg(feature = "cel")]
use super::AuthzError;
use super::{AuthzEngine, AuthzResult, PolicyContext, Subject};
#[cfg(feature = "cel")]
use crate::cache::CacheKeys;
#[cfg(feature = "cel")]
use crate::models::{OrgRbacPolicy, RbacPolicyEffect};
use crate::{
    cache::Cache, config::PolicyEffect, db::repos::OrgRbacPolicyRepo,
    services::OrgRbacPolicyService,
};

/// A compiled organization RBAC policy ready for evaluation.
#[cfg(feature = "cel")]
#[derive(Debug)]
pub struct CompiledOrgPolicy {
    /// The original policy from the database
    pub policy: OrgRbacPolicy,
    /// Compiled CEL program for efficient evaluation
    pub program: Arc<Program>,
}

/// Cached policies for an organization with version tracking.
///
/// This struct tracks the version of cached policies and when the version
/// was last checked against Redis. This enables efficient multi-node
/// cache invalidation with bounded staleness.
#[cfg(feature = "cel")]
struct CachedOrgPolicies {
    /// Compiled policies for this organization
    policies: Vec<CompiledOrgPolicy>,
    /// Version number from Redis (or local timestamp if no Redis)
    version: u64,
    /// When we last checked Redis for version changes
    last_version_check: Instant,
    /// When these policies were last accessed for authorization (LRU tracking)
    last_accessed: Instant,
}

/// Errors that can occur during policy registry operations.
#[derive(Debug, Error)]
pub enum PolicyRegistryError {
    #[error("Failed to load policies: {0}")]
    LoadError(String),

    #[error("Failed to compile policy '{policy_name}' for org {org_id}: {message}")]
    CompilationError {
        org_id: Uuid,
        policy_name: String,
        message: String,
    },
}

impl From<crate::db::DbError> for PolicyRegistryError {
    fn from(e: crate::db::DbError) -> Self {
        PolicyRegistryError::LoadError(e.to_string())
    }
}

// ============================================================================
// CEL-enabled PolicyRegistry
// ============================================================================

/// Registry of compiled RBAC policies for per-organization authorization.
///
/// The registry wraps the system-level `AuthzEngine` and adds support for
/// per-organization policies stored in the database. System policies from
/// the config file are always evaluated first, with org policies providing
/// additional organization-specific rules.
///
/// # Multi-Node Consistency
///
/// In distributed deployments, each node maintains its own local cache of
/// compiled policies. The registry uses Redis-based version tracking to
/// ensure cache consistency:
///
/// - On policy changes, the writing node increments the Redis version
/// - Other nodes check Redis periodically (controlled by `version_check_ttl`)
/// - If the Redis version is newer, the node refreshes from the database
///
/// This provides eventual consistency with bounded staleness.
///
/// # LRU Cache Eviction
///
/// For large deployments with many organizations, the registry supports LRU
/// (Least Recently Used) cache eviction to bound memory usage:
///
/// - `max_cached_orgs`: Maximum orgs to cache (0 = unlimited)
/// - `eviction_batch_size`: How many orgs to evict when cache is full
///
/// When the cache reaches capacity, the least recently accessed organizations
/// are evicted in batches. Evicted orgs have their policies reloaded from the
/// database on next access.
#[cfg(feature = "cel")]
pub struct PolicyRegistry {
    /// System-level authorization engine (config-based policies)
    engine: Arc<AuthzEngine>,
    /// Compiled org policies: org_id -> cached policies with version tracking
    /// Policies within each org are sorted by priority (descending), then effect (deny before allow)
    org_policies: Arc<RwLock<HashMap<Uuid, CachedOrgPolicies>>>,
    /// Default effect when no policy matches
    default_effect: PolicyEffect,
    /// Redis/memory cache for version checks (None = single-node, skip version checks)
    cache: Option<Arc<dyn Cache>>,
    /// Repository for fetching policies on version mismatch
    policy_repo: Option<Arc<dyn OrgRbacPolicyRepo>>,
    /// How often to check Redis for version changes
    version_check_ttl: Duration,
    /// Maximum orgs to cache (0 = unlimited)
    max_cached_orgs: usize,
    /// How many orgs to evict when cache is full
    eviction_batch_size: usize,
}

#[cfg(feature = "cel")]
impl PolicyRegistry {
    /// Create a new empty policy registry.
    ///
    /// The registry is initialized with a system-level engine and will
    /// use the provided default effect when no policy matches.
    ///
    /// # Arguments
    ///
    /// * `engine` - The system-level authorization engine
    /// * `default_effect` - Default effect when no policy matches
    /// * `cache` - Optional Redis/memory cache for version tracking
    /// * `policy_repo` - Optional repository for fetching policies on version mismatch
    /// * `version_check_ttl` - How often to check Redis for version changes
    /// * `max_cached_orgs` - Maximum orgs to cache (0 = unlimited)
    /// * `eviction_batch_size` - How many orgs to evict when cache is full
    pub fn new(
        engine: Arc<AuthzEngine>,
        default_effect: PolicyEffect,
        cache: Option<Arc<dyn Cache>>,
        policy_repo: Option<Arc<dyn OrgRbacPolicyRepo>>,
        version_check_ttl: Duration,
        max_cached_orgs: usize,
        eviction_batch_size: usize,
    ) -> Self {
        Self {
            engine,
            org_policies: Arc::new(RwLock::new(HashMap::new())),
            default_effect,
            cache,
            policy_repo,
            version_check_ttl,
            max_cached_orgs,
            eviction_batch_size,
        }
    }

    /// Create a new policy registry with lazy loading enabled.
    ///
    /// Unlike `initialize_from_db`, this constructor does NOT load policies at startup.
    /// Instead, policies are loaded on-demand when an organization is first accessed
    /// during authorization.
    ///
    /// This is recommended for large deployments with many organizations where:
    /// - Startup time is important
    /// - Memory usage should scale with active orgs, not total orgs
    /// - Many orgs may never be accessed in a given node's lifetime
    ///
    /// # Arguments
    ///
    /// * `engine` - The system-level authorization engine
    /// * `default_effect` - Default effect when no policy matches
    /// * `cache` - Optional Redis/memory cache for version tracking
    /// * `policy_repo` - Repository for fetching policies (required for lazy loading)
    /// * `version_check_ttl` - How often to check Redis for version changes
    /// * `max_cached_orgs` - Maximum orgs to cache (0 = unlimited)
    /// * `eviction_batch_size` - How many orgs to evict when cache is full
    pub fn new_lazy(
        engine: Arc<AuthzEngine>,
        default_effect: PolicyEffect,
        cache: Option<Arc<dyn Cache>>,
        policy_repo: Arc<dyn OrgRbacPolicyRepo>,
        version_check_ttl: Duration,
        max_cached_orgs: usize,
        eviction_batch_size: usize,
    ) -> Self {
        Self::new(
            engine,
            default_effect,
            cache,
            Some(policy_repo),
            version_check_ttl,
            max_cached_orgs,
            eviction_batch_size,
        )
    }

    /// Initialize the registry by loading all org policies from the database.
    ///
    /// This compiles all policies at startup to:
    /// - Catch CEL syntax errors early
    /// - Avoid compilation overhead during request handling
    ///
    /// Policies that fail to compile are logged and skipped, allowing the
    /// system to start even with invalid policies.
    ///
    /// # Arguments
    ///
    /// * `service` - Service for loading policies at startup
    /// * `engine` - The system-level authorization engine
    /// * `default_effect` - Default effect when no policy matches
    /// * `cache` - Optional Redis/memory cache for version tracking
    /// * `policy_repo` - Repository for fetching policies on version mismatch
    /// * `version_check_ttl` - How often to check Redis for version changes
    /// * `max_cached_orgs` - Maximum orgs to cache (0 = unlimited)
    /// * `eviction_batch_size` - How many orgs to evict when cache is full
    #[allow(clippy::too_many_arguments)]
    pub async fn initialize_from_db(
        service: &OrgRbacPolicyService,
        engine: Arc<AuthzEngine>,
        default_effect: PolicyEffect,
        cache: Option<Arc<dyn Cache>>,
        policy_repo: Arc<dyn OrgRbacPolicyRepo>,
        version_check_ttl: Duration,
        max_cached_orgs: usize,
        eviction_batch_size: usize,
    ) -> Result<Self, PolicyRegistryError> {
        let registry = Self::new(
            engine,
            default_effect,
            cache,
            Some(policy_repo),
            version_check_ttl,
            max_cached_orgs,
            eviction_batch_size,
        );

        // Load all enabled policies grouped by organization
        // The service returns policies sorted by priority descending
        let policies = service.list_all_enabled().await?;

        // Group by org_id and compile
        let mut by_org: HashMap<Uuid, Vec<OrgRbacPolicy>> = HashMap::new();
        for policy in policies {
            by_org.entry(policy.org_id).or_default().push(policy);
        }

        let mut compiled_by_org = HashMap::new();
        let mut total_compiled = 0;
        let mut total_failed = 0;
        let now = Instant::now();

        let max_expr_len = registry.engine.max_expression_length();
        for (org_id, policies) in by_org {
            let compiled = compile_policies(
                &policies,
                &mut total_compiled,
                &mut total_failed,
                max_expr_len,
            );

            if !compiled.is_empty() {
                // Fetch or initialize Redis version for this org
                let version = registry.fetch_or_init_redis_version(org_id).await;

                compiled_by_org.insert(
                    org_id,
                    CachedOrgPolicies {
                        policies: compiled,
                        version,
                        last_version_check: now,
                        last_accessed: now,
                    },
                );
            }
        }

        if total_failed > 0 {
            tracing::warn!(
                compiled = total_compiled,
                failed = total_failed,
                "Some org RBAC policies failed to compile"
            );
        }

        *registry.org_policies.write().await = compiled_by_org;

        Ok(registry)
    }

    /// Fetch the current version from Redis, or initialize to 0 if not present.
    async fn fetch_or_init_redis_version(&self, org_id: Uuid) -> u64 {
        let Some(cache) = &self.cache else {
            return 0;
        };

        let key = CacheKeys::rbac_policy_version(org_id);
        match cache.get_bytes(&key).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(org_id = %org_id, error = %e, "Failed to fetch policy version from Redis");
                0
            }
        }
    }

    /// Get the number of organizations with registered policies.
    pub async fn org_count(&self) -> usize {
        self.org_policies.read().await.len()
    }

    /// Get the total number of compiled policies across all organizations.
    pub async fn policy_count(&self) -> usize {
        self.org_policies
            .read()
            .await
            .values()
            .map(|cached| cached.policies.len())
            .sum()
    }

    /// Refresh the cached policies for a specific organization.
    ///
    /// This recompiles all policies for the org, updates the cache, and
    /// increments the Redis version to notify other nodes.
    ///
    /// Called when policies are created, updated, or deleted.
    ///
    /// Policies that fail to compile are skipped with a warning.
    pub async fn refresh_org_policies(
        &self,
        org_id: Uuid,
        policies: Vec<OrgRbacPolicy>,
    ) -> Result<(), PolicyRegistryError> {
        let mut total_compiled = 0;
        let mut total_failed = 0;
        let compiled = compile_policies(
            &policies,
            &mut total_compiled,
            &mut total_failed,
            self.engine.max_expression_length(),
        );

        // Increment Redis version to notify other nodes
        let new_version = self.increment_redis_version(org_id).await;

        // Update the cache with atomic swap (avoids brief window with no policies)
        let now = Instant::now();
        let mut cache = self.org_policies.write().await;
        if compiled.is_empty() {
            cache.remove(&org_id);
        } else {
            cache.insert(
                org_id,
                CachedOrgPolicies {
                    policies: compiled,
                    version: new_version,
                    last_version_check: now,
                    last_accessed: now,
                },
            );
        }

        tracing::debug!(
            org_id = %org_id,
            policy_count = cache.get(&org_id).map(|c| c.policies.len()).unwrap_or(0),
            version = new_version,
            "Refreshed org RBAC policies"
        );

        Ok(())
    }

    /// Increment the Redis version for an organization's policies.
    ///
    /// Returns the new version number. If Redis is unavailable, uses a
    /// timestamp as the version to ensure local cache is still updated.
    async fn increment_redis_version(&self, org_id: Uuid) -> u64 {
        if let Some(cache) = &self.cache {
            let key = CacheKeys::rbac_policy_version(org_id);
            // INCR with 30-day TTL (policies should be refreshed within this period)
            match cache.incr(&key, Duration::from_secs(86400 * 30)).await {
                Ok(version) => return version as u64,
                Err(e) => {
                    tracing::warn!(
                        org_id = %org_id,
                        error = %e,
                        "Failed to increment policy version in Redis, using timestamp"
                    );
                }
            }
        }

        // No cache or cache error: use timestamp as version
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    /// Ensure the cached policies for an organization are fresh.
    ///
    /// This implements the version-check-with-TTL strategy:
    /// 1. If TTL hasn't expired since last check, use cached policies (fast path)
    /// 2. If TTL expired, check Redis for version changes
    /// 3. If Redis version is newer OR org is not in cache, refresh from database
    ///
    /// This provides bounded staleness with minimal Redis overhead.
    async fn ensure_policies_fresh(&self, org_id: Uuid) {
        // Fast path: check if TTL has expired (read lock only)
        let (needs_version_check, is_cached) = {
            let cache = self.org_policies.read().await;
            match cache.get(&org_id) {
                Some(cached) => (
                    cached.last_version_check.elapsed() > self.version_check_ttl,
                    true,
                ),
                None => (true, false), // No cached policies, need to load
            }
        };

        if !needs_version_check {
            return;
        }

        // If no Redis cache, handle single-node mode
        let Some(redis_cache) = &self.cache else {
            // Single-node mode: if org not cached, load from DB
            if !is_cached {
                self.load_org_policies_from_db(org_id).await;
            }
            return;
        };

        let key = CacheKeys::rbac_policy_version(org_id);
        let redis_version: u64 = match redis_cache.get_bytes(&key).await {
            Ok(Some(bytes)) => String::from_utf8_lossy(&bytes).parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(org_id = %org_id, error = %e, "Failed to check policy version in Redis");
                // On Redis error, still load from DB if not cached
                if !is_cached {
                    self.load_org_policies_from_db(org_id).await;
                }
                return;
            }
        };

        // Evict LRU orgs if needed before potentially loading a new org
        if !is_cached {
            self.evict_if_needed().await;
        }

        // Now take write lock and check again (double-checked locking)
        let mut org_cache = self.org_policies.write().await;

        // Fix for the 0 > 0 bug: detect "org not in cache" separately
        let cached = org_cache.get(&org_id);
        let should_load = match cached {
            None => true,                         // Org not in cache - always load from DB
            Some(c) => redis_version > c.version, // Check version mismatch
        };

        if should_load {
            // Version mismatch or not cached - fetch from DB and recompile
            let Some(policy_repo) = &self.policy_repo else {
                tracing::warn!(org_id = %org_id, "Policy repo not available for refresh");
                return;
            };

            match policy_repo.list_enabled_by_org(org_id).await {
                Ok(policies) => {
                    let mut total_compiled = 0;
                    let mut total_failed = 0;
                    let compiled = compile_policies(
                        &policies,
                        &mut total_compiled,
                        &mut total_failed,
                        self.engine.max_expression_length(),
                    );

                    let now = Instant::now();
                    if compiled.is_empty() {
                        org_cache.remove(&org_id);
                    } else {
                        org_cache.insert(
                            org_id,
                            CachedOrgPolicies {
                                policies: compiled,
                                version: redis_version,
                                last_version_check: now,
                                last_accessed: now,
                            },
                        );
                    }
                    tracing::debug!(
                        org_id = %org_id,
                        version = redis_version,
                        "Refreshed stale org policies from database"
                    );
                }
                Err(e) => {
                    tracing::warn!(org_id = %org_id, error = %e, "Failed to refresh policies from DB");
                    // Update last_version_check to avoid hammering DB on errors
                    if let Some(cached) = org_cache.get_mut(&org_id) {
                        cached.last_version_check = Instant::now();
                    }
                }
            }
        } else {
            // Version matches, just update the check timestamp
            if let Some(cached) = org_cache.get_mut(&org_id) {
                cached.last_version_check = Instant::now();
            }
        }
    }

    /// Load policies for an organization from the database (single-node mode helper).
    async fn load_org_policies_from_db(&self, org_id: Uuid) {
        // Evict LRU orgs if needed before loading new org
        self.evict_if_needed().await;

        let Some(policy_repo) = &self.policy_repo else {
            tracing::warn!(org_id = %org_id, "Policy repo not available for loading");
            return;
        };

        match policy_repo.list_enabled_by_org(org_id).await {
            Ok(policies) => {
                let mut total_compiled = 0;
                let mut total_failed = 0;
                let compiled = compile_policies(
                    &policies,
                    &mut total_compiled,
                    &mut total_failed,
                    self.engine.max_expression_length(),
                );

                let now = Instant::now();
                let mut org_cache = self.org_policies.write().await;
                if compiled.is_empty() {
                    org_cache.remove(&org_id);
                } else {
                    org_cache.insert(
                        org_id,
                        CachedOrgPolicies {
                            policies: compiled,
                            version: 0, // No Redis version in single-node mode
                            last_version_check: now,
                            last_accessed: now,
                        },
                    );
                }
                tracing::debug!(
                    org_id = %org_id,
                    "Loaded org policies from database (single-node mode)"
                );
            }
            Err(e) => {
                tracing::warn!(org_id = %org_id, error = %e, "Failed to load policies from DB");
            }
        }
    }

    /// Remove all cached policies for an organization.
    ///
    /// Called when an organization is deleted or all its policies are removed.
    pub async fn remove_org(&self, org_id: Uuid) {
        let mut cache = self.org_policies.write().await;
        cache.remove(&org_id);
        tracing::debug!(org_id = %org_id, "Removed org from RBAC policy cache");
    }

    /// Evict least recently used organizations if the cache exceeds the limit.
    ///
    /// This implements LRU (Least Recently Used) eviction to bound memory usage
    /// in large deployments with many organizations.
    ///
    /// When `max_cached_orgs` is reached, `eviction_batch_size` least recently
    /// accessed organizations are evicted from the cache.
    async fn evict_if_needed(&self) {
        // 0 means unlimited, no eviction needed
        if self.max_cached_orgs == 0 {
            return;
        }

        let mut cache = self.org_policies.write().await;
        if cache.len() < self.max_cached_orgs {
            return;
        }

        // Calculate how many orgs to evict
        let target = self
            .max_cached_orgs
            .saturating_sub(self.eviction_batch_size);
        let to_evict = cache.len().saturating_sub(target);

        if to_evict == 0 {
            return;
        }

        // Collect org IDs sorted by last_accessed (oldest first)
        let mut entries: Vec<_> = cache.iter().map(|(id, c)| (*id, c.last_accessed)).collect();
        entries.sort_by_key(|(_, t)| *t);

        // Evict the oldest entries
        let evicted_count = entries.iter().take(to_evict).count();
        for (org_id, _) in entries.into_iter().take(to_evict) {
            cache.remove(&org_id);
        }

        tracing::info!(
            evicted = evicted_count,
            remaining = cache.len(),
            max = self.max_cached_orgs,
            "Evicted LRU org policies from cache"
        );
    }

    /// Get the system-level authorization engine.
    pub fn engine(&self) -> &Arc<AuthzEngine> {
        &self.engine
    }

    /// Authorize an action, evaluating both system and org-specific policies.
    ///
    /// # Evaluation Order
    ///
    /// 1. If RBAC is disabled in the engine → allow
    /// 2. Evaluate system policies (config-based) in priority order
    /// 3. If a system policy matched → return that decision
    /// 4. If `org_id` is provided, ensure policies are fresh and evaluate
    /// 5. If an org policy matched → return that decision
    /// 6. No policy matched → apply `default_effect`
    ///
    /// # Multi-Node Consistency
    ///
    /// Before evaluating org policies, this method checks if the local cache
    /// is stale (based on `policy_cache_ttl_ms`). If stale and Redis is configured,
    /// it checks the Redis version and refreshes from the database if needed.
    ///
    /// # Arguments
    ///
    /// * `org_id` - The organization context for org-specific policies
    /// * `subject` - The subject (user) making the request
    /// * `context` - The resource/action being authorized
    pub async fn authorize_with_org(
        &self,
        org_id: Option<Uuid>,
        subject: &Subject,
        context: &PolicyContext,
    ) -> AuthzResult {
        self.authorize_internal(org_id, subject, context, self.default_effect)
            .await
    }

    /// Authorize a request with organization context and a custom default effect.
    ///
    /// This method is identical to `authorize_with_org` but allows overriding
    /// the default effect when no policy matches. This is useful for API endpoints
    /// which may need a different default effect (e.g., "allow") than admin
    /// endpoints (e.g., "deny").
    ///
    /// # Arguments
    ///
    /// * `org_id` - The organization context for org-specific policies
    /// * `subject` - The subject (user) making the request
    /// * `context` - The resource/action being authorized
    /// * `override_default_effect` - The default effect to use when no policy matches
    pub async fn authorize_with_org_and_default(
        &self,
        org_id: Option<Uuid>,
        subject: &Subject,
        context: &PolicyContext,
        override_default_effect: PolicyEffect,
    ) -> AuthzResult {
        self.authorize_internal(org_id, subject, context, override_default_effect)
            .await
    }

    /// Internal authorization implementation shared by `authorize_with_org` and
    /// `authorize_with_org_and_default`.
    ///
    /// # Evaluation Order
    ///
    /// 1. If RBAC is disabled in the engine → allow
    /// 2. Evaluate system policies (config-based) in priority order
    /// 3. If a system policy matched → return that decision
    /// 4. If `org_id` is provided, ensure policies are fresh and evaluate
    /// 5. If an org policy matched → return that decision
    /// 6. No policy matched → apply `default_effect`
    async fn authorize_internal(
        &self,
        org_id: Option<Uuid>,
        subject: &Subject,
        context: &PolicyContext,
        default_effect: PolicyEffect,
    ) -> AuthzResult {
        // If RBAC is disabled, allow everything
        if !self.engine.is_enabled() {
            return AuthzResult::allow();
        }

        // First, evaluate system policies via the engine
        let system_result = self.engine.authorize(subject, context);

        // If a system policy made a decision (matched), return it
        // We can tell if a policy matched by checking if policy_name is set
        if system_result.policy_name.is_some() {
            return system_result;
        }

        // System policies didn't match (fell through to default)
        // Now evaluate org-specific policies if org_id is provided
        if let Some(org_id) = org_id {
            // Ensure policies are fresh before evaluation (multi-node consistency)
            self.ensure_policies_fresh(org_id).await;

            // Take a write lock to both read policies and update last_accessed (LRU tracking)
            let mut cache = self.org_policies.write().await;
            if let Some(cached) = cache.get_mut(&org_id) {
                // Update LRU timestamp
                cached.last_accessed = Instant::now();

                for compiled in &cached.policies {
                    // Check if policy applies to this resource/action
                    if !policy_matches(&compiled.policy, context) {
                        continue;
                    }

                    // Evaluate the CEL condition
                    match evaluate_condition(&compiled.program, subject, context) {
                        Ok(true) => {
                            tracing::debug!(
                                org_id = %org_id,
                                policy = %compiled.policy.name,
                                effect = ?compiled.policy.effect,
                                "Org policy condition matched"
                            );

                            return match compiled.policy.effect {
                                RbacPolicyEffect::Allow => {
                                    AuthzResult::allow_by_policy(&compiled.policy.name)
                                }
                                RbacPolicyEffect::Deny => AuthzResult::deny_by_policy(
                                    &compiled.policy.name,
                                    compiled.policy.description.clone(),
                                ),
                            };
                        }
                        Ok(false) => {
                            // Condition didn't match, try next policy
                            continue;
                        }
                        Err(e) => {
                            // Log the error
                            let fail_on_error = self.engine.fail_on_evaluation_error();
                            tracing::warn!(
                                org_id = %org_id,
                                policy = %compiled.policy.name,
                                error = %e,
                                fail_on_error,
                                "Org policy evaluation error"
                            );

                            // If fail_on_evaluation_error is true (default), deny the request
                            // to avoid security holes from silently skipping policies
                            if fail_on_error {
                                return AuthzResult {
                                    allowed: false,
                                    policy_name: Some(compiled.policy.name.clone()),
                                    reason: Some(format!(
                                        "Policy '{}' failed to evaluate: {}",
                                        compiled.policy.name, e
                                    )),
                                };
                            }

                            // Otherwise, skip this policy and continue to the next one
                            continue;
                        }
                    }
                }
            }
        }

        // No policy matched, apply default effect
        match default_effect {
            PolicyEffect::Allow => AuthzResult::allow_default(),
            PolicyEffect::Deny => AuthzResult::deny_default(),
        }
    }
}

/// Compile a CEL expression into a program with optional length validation.
#[cfg(feature = "cel")]
fn compile_policy(
    policy: &OrgRbacPolicy,
    max_expression_length: usize,
) -> Result<Program, AuthzError> {
    // Validate expression length before compilation
    if max_expression_length > 0 && policy.condition.len() > max_expression_length {
        return Err(AuthzError::InvalidExpression(format!(
            "Policy '{}': CEL expression length ({} bytes) exceeds maximum ({} bytes)",
            policy.name,
            policy.condition.len(),
            max_expression_length
        )));
    }

    Program::compile(&policy.condition)
        .map_err(|e| AuthzError::InvalidExpression(format!("Policy '{}': {}", policy.name, e)))
}

/// Compile a list of policies, tracking success/failure counts.
///
/// Only enabled policies are compiled. Failed policies are logged and skipped.
/// Returns the compiled policies sorted by priority (descending), then effect (deny before allow).
#[cfg(feature = "cel")]
fn compile_policies(
    policies: &[OrgRbacPolicy],
    total_compiled: &mut usize,
    total_failed: &mut usize,
    max_expression_length: usize,
) -> Vec<CompiledOrgPolicy> {
    let mut compiled = Vec::with_capacity(policies.len());

    for policy in policies {
        // Only compile enabled policies
        if !policy.enabled {
            continue;
        }

        match compile_policy(policy, max_expression_length) {
            Ok(program) => {
                compiled.push(CompiledOrgPolicy {
                    policy: policy.clone(),
                    program: Arc::new(program),
                });
                *total_compiled += 1;
            }
            Err(e) => {
                tracing::warn!(
                    org_id = %policy.org_id,
                    policy_name = %policy.name,
                    error = %e,
                    "Failed to compile org RBAC policy, skipping"
                );
                *total_failed += 1;
            }
        }
    }

    // Sort compiled policies by priority (descending), then effect (deny before allow)
    sort_policies(&mut compiled);

    compiled
}

/// Sort policies by priority (descending), then effect (deny before allow).
#[cfg(feature = "cel")]
fn sort_policies(policies: &mut [CompiledOrgPolicy]) {
    policies.sort_by(|a, b| {
        match b.policy.priority.cmp(&a.policy.priority) {
            std::cmp::Ordering::Equal => {
                // Deny before allow at same priority
                match (&a.policy.effect, &b.policy.effect) {
                    (RbacPolicyEffect::Deny, RbacPolicyEffect::Allow) => std::cmp::Ordering::Less,
                    (RbacPolicyEffect::Allow, RbacPolicyEffect::Deny) => {
                        std::cmp::Ordering::Greater
                    }
                    _ => std::cmp::Ordering::Equal,
                }
            }
            other => other,
        }
    });
}

/// Check if a policy applies to the given resource/action.
///
/// Uses pattern matching that supports:
/// - `*` to match any value
/// - `foo*` to match any value starting with `foo`
/// - `foo` for exact match only
#[cfg(feature = "cel")]
fn policy_matches(policy: &OrgRbacPolicy, context: &PolicyContext) -> bool {
    let resource_matches = super::pattern_matches(&policy.resource, &context.resource_type);
    let action_matches = super::pattern_matches(&policy.action, &context.action);
    resource_matches && action_matches
}

/// Evaluate a CEL condition against subject and context.
#[cfg(feature = "cel")]
fn evaluate_condition(
    program: &Program,
    subject: &Subject,
    context: &PolicyContext,
) -> Result<bool, AuthzError> {
    let mut ctx = Context::default();

    // Add subject to context
    let subject_value = to_value(subject)
        .map_err(|e| AuthzError::PolicyEvaluation(format!("Failed to serialize subject: {}", e)))?;
    ctx.add_variable("subject", subject_value);

    // Add context to context
    let context_value = to_value(context)
        .map_err(|e| AuthzError::PolicyEvaluation(format!("Failed to serialize context: {}", e)))?;
    ctx.add_variable("context", context_value);

    // Execute with panic protection.
    // The CEL interpreter uses ANTLR-generated code which can potentially
    // panic on edge cases during execution.
    let exec_result = panic::catch_unwind(panic::AssertUnwindSafe(|| program.execute(&ctx)));

    let result = match exec_result {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            return Err(AuthzError::PolicyEvaluation(format!(
                "Execution error: {}",
                e
            )));
        }
        Err(_) => {
            return Err(AuthzError::PolicyEvaluation(
                "CEL expression execution failed (internal error)".to_string(),
            ));
        }
    };

    match result {
        Value::Bool(b) => Ok(b),
        _ => Err(AuthzError::PolicyEvaluation(
            "Policy condition must evaluate to boolean".to_string(),
        )),
    }
}

// ============================================================================
// Stub PolicyRegistry when CEL feature is disabled
// ============================================================================

/// Policy registry stub (CEL feature disabled).
///
/// When the `cel` feature is not enabled, the registry delegates directly
/// to the engine (which returns `default_effect`). Org policy operations
/// are no-ops.
#[cfg(not(feature = "cel"))]
pub struct PolicyRegistry {
    /// System-level authorization engine
    engine: Arc<AuthzEngine>,
    /// Default effect when no policy matches
    default_effect: PolicyEffect,
}

#[cfg(not(feature = "cel"))]
impl PolicyRegistry {
    /// Create a new policy registry (no CEL compilation).
    pub fn new(
        engine: Arc<AuthzEngine>,
        default_effect: PolicyEffect,
        _cache: Option<Arc<dyn Cache>>,
        _policy_repo: Option<Arc<dyn OrgRbacPolicyRepo>>,
        _version_check_ttl: Duration,
        _max_cached_orgs: usize,
        _eviction_batch_size: usize,
    ) -> Self {
        Self {
            engine,
            default_effect,
        }
    }

    /// Create a new policy registry with lazy loading (no-op without CEL).
    pub fn new_lazy(
        engine: Arc<AuthzEngine>,
        default_effect: PolicyEffect,
        _cache: Option<Arc<dyn Cache>>,
        _policy_repo: Arc<dyn OrgRbacPolicyRepo>,
        _version_check_ttl: Duration,
        _max_cached_orgs: usize,
        _eviction_batch_size: usize,
    ) -> Self {
        Self {
            engine,
            default_effect,
        }
    }

    /// Initialize from database (no-op without CEL).
    #[allow(clippy::too_many_arguments)]
    pub async fn initialize_from_db(
        _service: &OrgRbacPolicyService,
        engine: Arc<AuthzEngine>,
        default_effect: PolicyEffect,
        _cache: Option<Arc<dyn Cache>>,
        _policy_repo: Arc<dyn OrgRbacPolicyRepo>,
        _version_check_ttl: Duration,
        _max_cached_orgs: usize,
        _eviction_batch_size: usize,
    ) -> Result<Self, PolicyRegistryError> {
        tracing::warn!(
            "Policy registry initialized without CEL feature; org policies will not be evaluated"
        );
        Ok(Self {
            engine,
            default_effect,
        })
    }

    /// Get the system-level authorization engine.
    pub fn engine(&self) -> &Arc<AuthzEngine> {
        &self.engine
    }

    /// Authorize with org context (delegates to engine, returns default_effect).
    pub async fn authorize_with_org(
        &self,
        _org_id: Option<Uuid>,
        subject: &Subject,
        context: &PolicyContext,
    ) -> AuthzResult {
        if !self.engine.is_enabled() {
            return AuthzResult::allow();
        }

        let system_result = self.engine.authorize(subject, context);
        if system_result.policy_name.is_some() {
            return system_result;
        }

        match self.default_effect {
            PolicyEffect::Allow => AuthzResult::allow_default(),
            PolicyEffect::Deny => AuthzResult::deny_default(),
        }
    }

    /// Authorize with org context and custom default effect.
    pub async fn authorize_with_org_and_default(
        &self,
        _org_id: Option<Uuid>,
        subject: &Subject,
        context: &PolicyContext,
        override_default_effect: PolicyEffect,
    ) -> AuthzResult {
        if !self.engine.is_enabled() {
            return AuthzResult::allow();
        }

        let system_result = self.engine.authorize(subject, context);
        if system_result.policy_name.is_some() {
            return system_result;
        }

        match override_default_effect {
            PolicyEffect::Allow => AuthzResult::allow_default(),
            PolicyEffect::Deny => AuthzResult::deny_default(),
        }
    }

    /// Refresh org policies (no-op without CEL).
    pub async fn refresh_org_policies(
        &self,
        _org_id: Uuid,
        _policies: Vec<crate::models::OrgRbacPolicy>,
    ) -> Result<(), PolicyRegistryError> {
        Ok(())
    }

    /// Remove org from cache (no-op without CEL).
    pub async fn remove_org(&self, _org_id: Uuid) {}

    /// Get the number of cached organizations (always 0 without CEL).
    pub async fn org_count(&self) -> usize {
        0
    }

    /// Get the total number of compiled policies (always 0 without CEL).
    pub async fn policy_count(&self) -> usize {
        0
    }
}
