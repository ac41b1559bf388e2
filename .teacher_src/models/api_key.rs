use std::{fmt, net::IpAddr, str::FromStr};

use chrono::{DateTime, Utc};
use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Permission scope for API keys.
///
/// Scopes control which API endpoints an API key can access.
/// When `scopes` is `None` on an API key, the key has full access.
/// When `scopes` is set, the key can only access endpoints matching those scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyScope {
    /// Access to chat completions and responses endpoints (`/v1/chat/completions`, `/v1/responses`)
    Chat,
    /// Access to legacy completions endpoint (`/v1/completions`)
    Completions,
    /// Access to embeddings endpoint (`/v1/embeddings`)
    Embeddings,
    /// Access to image generation endpoints (`/v1/images/*`)
    Images,
    /// Access to audio endpoints (`/v1/audio/*`)
    Audio,
    /// Access to files and vector store endpoints (`/v1/files/*`, `/v1/vector_stores/*`)
    Files,
    /// Access to models listing endpoint (`/v1/models`)
    Models,
    /// Access to admin endpoints (`/admin/*`)
    Admin,
}

impl ApiKeyScope {
    /// Returns the string representation of the scope.
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiKeyScope::Chat => "chat",
            ApiKeyScope::Completions => "completions",
            ApiKeyScope::Embeddings => "embeddings",
            ApiKeyScope::Images => "images",
            ApiKeyScope::Audio => "audio",
            ApiKeyScope::Files => "files",
            ApiKeyScope::Models => "models",
            ApiKeyScope::Admin => "admin",
        }
    }

    /// Returns all valid scope values.
    pub fn all_values() -> &'static [ApiKeyScope] {
        &[
            ApiKeyScope::Chat,
            ApiKeyScope::Completions,
            ApiKeyScope::Embeddings,
            ApiKeyScope::Images,
            ApiKeyScope::Audio,
            ApiKeyScope::Files,
            ApiKeyScope::Models,
            ApiKeyScope::Admin,
        ]
    }

    /// Returns all valid scope names as strings.
    pub fn all_names() -> Vec<&'static str> {
        Self::all_values().iter().map(|s| s.as_str()).collect()
    }
}

impl fmt::Display for ApiKeyScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ApiKeyScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(ApiKeyScope::Chat),
            "completions" => Ok(ApiKeyScope::Completions),
            "embeddings" => Ok(ApiKeyScope::Embeddings),
            "images" => Ok(ApiKeyScope::Images),
            "audio" => Ok(ApiKeyScope::Audio),
            "files" => Ok(ApiKeyScope::Files),
            "models" => Ok(ApiKeyScope::Models),
            "admin" => Ok(ApiKeyScope::Admin),
            _ => Err(format!(
                "Invalid scope '{}'. Valid scopes: {}",
                s,
                ApiKeyScope::all_names().join(", ")
            )),
        }
    }
}

/// Validate a list of scope strings.
///
/// Returns `Ok(())` if all scopes are valid, or `Err` with a list of invalid scopes.
pub fn validate_scopes(scopes: &[String]) -> Result<(), Vec<String>> {
    let invalid: Vec<String> = scopes
        .iter()
        .filter(|s| ApiKeyScope::from_str(s).is_err())
        .cloned()
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(invalid)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct ApiKey {
    pub id: Uuid,
    /// Prefix of the key (for identification without exposing full key)
    pub key_prefix: String,
    pub name: String,
    pub owner: ApiKeyOwner,
    /// Budget limit in cents
    pub budget_limit_cents: Option<i64>,
    pub budget_period: Option<BudgetPeriod>,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    /// Permission scopes (null = full access)
    /// Valid scopes: chat, completions, embeddings, images, audio, files, models, admin
    pub scopes: Option<Vec<String>>,
    /// Allowed models (null = all models, supports wildcards like "gpt-4*")
    pub allowed_models: Option<Vec<String>>,
    /// IP allowlist in CIDR notation (null = all IPs allowed)
    pub ip_allowlist: Option<Vec<String>>,
    /// Requests per minute override (null = use global default)
    pub rate_limit_rpm: Option<i32>,
    /// Tokens per minute override (null = use global default)
    pub rate_limit_tpm: Option<i32>,
    /// ID of the key this was rotated from (for audit trail)
    pub rotated_from_key_id: Option<Uuid>,
    /// If set, this key is being rotated out but still valid until this time
    pub rotation_grace_until: Option<DateTime<Utc>>,
}

impl ApiKey {
    /// Check if this API key has the required scope.
    ///
    /// Returns `true` if:
    /// - `scopes` is `None` (full access)
    /// - `scopes` contains the required scope
    pub fn has_scope(&self, required: ApiKeyScope) -> bool {
        match &self.scopes {
            None => true, // No scopes = full access
            Some(scopes) => scopes.iter().any(|s| s == required.as_str()),
        }
    }

    /// Check if a model is allowed by this API key's `allowed_models` restriction.
    ///
    /// Returns `true` if:
    /// - `allowed_models` is `None` (all models allowed)
    /// - `allowed_models` is empty (all models allowed)
    /// - Any pattern in `allowed_models` matches the model name
    ///
    /// Patterns support trailing wildcard: `"gpt-4*"` matches `"gpt-4"`, `"gpt-4o"`, `"gpt-4-turbo"`
    pub fn is_model_allowed(&self, model: &str) -> bool {
        match &self.allowed_models {
            None => true,
            Some(patterns) if patterns.is_empty() => true,
            Some(patterns) => patterns.iter().any(|p| model_matches_pattern(model, p)),
        }
    }

    /// Check if an IP address is allowed by this API key's `ip_allowlist`.
    ///
    /// Returns `true` if:
    /// - `ip_allowlist` is `None` (all IPs allowed)
    /// - `ip_allowlist` is empty (all IPs allowed)
    /// - The IP matches any CIDR/IP in the allowlist
    pub fn is_ip_allowed(&self, ip: IpAddr) -> bool {
        match &self.ip_allowlist {
            None => true,
            Some(allowlist) if allowlist.is_empty() => true,
            Some(allowlist) => allowlist.iter().any(|entry| ip_matches_entry(ip, entry)),
        }
    }
}

/// Check if a model name matches a pattern.
///
/// Supports exact match and trailing wildcard:
/// - `"gpt-4"` matches `"gpt-4"` exactly
/// - `"gpt-4*"` matches `"gpt-4"`, `"gpt-4o"`, `"gpt-4-turbo"`
fn model_matches_pattern(model: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix('*') {
        model.starts_with(prefix)
    } else {
        model == pattern
    }
}

/// Validate model patterns for API key configuration.
///
/// Returns `Ok(())` if all patterns are valid, or `Err` with a list of invalid patterns.
///
/// Valid patterns:
/// - Non-empty strings
/// - Wildcards only allowed at the end (trailing `*`)
/// - No bare `*` (would match everything, use `None` for all models)
pub fn validate_model_patterns(patterns: &[String]) -> Result<(), Vec<String>> {
    let invalid: Vec<String> = patterns
        .iter()
        .filter(|p| !is_valid_model_pattern(p))
        .cloned()
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(invalid)
    }
}

/// Check if a single model pattern is valid.
fn is_valid_model_pattern(pattern: &str) -> bool {
    // Empty patterns are invalid
    if pattern.is_empty() {
        return false;
    }

    // Bare "*" is invalid (use None for all models)
    if pattern == "*" {
        return false;
    }

    // Check for wildcards in the middle (only trailing * allowed)
    if let Some(star_pos) = pattern.find('*') {
        // Wildcard must be at the very end
        if star_pos != pattern.len() - 1 {
            return false;
        }
        // Must have at least one character before the wildcard
        if star_pos == 0 {
            return false;
        }
    }

    true
}

/// Check if an IP address matches an allowlist entry.
///
/// Supports both CIDR notation (e.g., "192.168.1.0/24") and single IPs (e.g., "10.0.0.1").
fn ip_matches_entry(ip: IpAddr, entry: &str) -> bool {
    // Try parsing as CIDR
    if let Ok(net) = entry.parse::<IpNet>() {
        return net.contains(&ip);
    }
    // Try parsing as single IP (exact match)
    if let Ok(allowlist_ip) = entry.parse::<IpAddr>() {
        return ip == allowlist_ip;
    }
    false // Invalid entry format - shouldn't happen if validation is done at creation
}

/// Validate IP allowlist entries as valid CIDR notation or IP addresses.
///
/// Returns `Ok(())` if all entries are valid, or `Err` with a list of invalid entries.
/// Valid formats: "192.168.1.0/24", "10.0.0.1", "2001:db8::/32", "::1"
pub fn validate_ip_allowlist(entries: &[String]) -> Result<(), Vec<String>> {
    let invalid: Vec<String> = entries
        .iter()
        .filter(|e| !is_valid_ip_allowlist_entry(e))
        .cloned()
        .collect();

    if invalid.is_empty() {
        Ok(())
    } else {
        Err(invalid)
    }
}

/// Check if a single IP allowlist entry is valid.
fn is_valid_ip_allowlist_entry(entry: &str) -> bool {
    // Try parsing as CIDR first
    if entry.parse::<IpNet>().is_ok() {
        return true;
    }
    // Try parsing as single IP (will be treated as /32 or /128)
    entry.parse::<IpAddr>().is_ok()
}

/// Owner of an API key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ApiKeyOwner {
    Organization { org_id: Uuid },
    Team { team_id: Uuid },
    Project { project_id: Uuid },
    User { user_id: Uuid },
    ServiceAccount { service_account_id: Uuid },
}

/// Budget period for spending limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum BudgetPeriod {
    Daily,
    Monthly,
}

impl BudgetPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BudgetPeriod::Daily => "daily",
            BudgetPeriod::Monthly => "monthly",
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CreateApiKey {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub owner: ApiKeyOwner,
    /// Budget limit in cents
    pub budget_limit_cents: Option<i64>,
    pub budget_period: Option<BudgetPeriod>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Permission scopes (null = full access)
    pub scopes: Option<Vec<String>>,
    /// Allowed models (null = all models)
    pub allowed_models: Option<Vec<String>>,
    /// IP allowlist in CIDR notation (null = all IPs)
    pub ip_allowlist: Option<Vec<String>>,
    /// Requests per minute override
    pub rate_limit_rpm: Option<i32>,
    /// Tokens per minute override
    pub rate_limit_tpm: Option<i32>,
}

/// Self-service API key creation request (owner auto-set to current user).
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CreateSelfServiceApiKey {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Budget limit in cents
    pub budget_limit_cents: Option<i64>,
    pub budget_period: Option<BudgetPeriod>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Permission scopes (null = full access)
    pub scopes: Option<Vec<String>>,
    /// Allowed models (null = all models)
    pub allowed_models: Option<Vec<String>>,
    /// IP allowlist in CIDR notation (null = all IPs)
    pub ip_allowlist: Option<Vec<String>>,
    /// Requests per minute override
    pub rate_limit_rpm: Option<i32>,
    /// Tokens per minute override
    pub rate_limit_tpm: Option<i32>,
}

/// Returned on creation only (contains the raw key)
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "utoipa", derive(utoipa::ToSchema))]
pub struct CreatedApiKey {
    #[serde(flatten)]
    pub api_key: ApiKey,
    /// The raw API key (only shown once at creation)
    pub key: String,
}

/// Cached version for fast lookups - contains all data needed for auth
/// This allows us to skip the database query entirely on cache hit.
/// Cache is invalidated on revoke, so we can trust this data for the TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedApiKey {
    /// The full API key data
    pub key: ApiKey,
    /// Resolved organization ID (for project/team/user/service_account-owned keys, this is the parent org)
    pub org_id: Option<Uuid>,
    /// Team ID if key is owned by a team
    pub team_id: Option<Uuid>,
    /// Project ID if key is owned by a project or user within a project
    pub project_id: Option<Uuid>,
    /// User ID if key is owned by a user
    pub user_id: Option<Uuid>,
    /// Service account ID if key is owned by a service account
    pub service_account_id: Option<Uuid>,
    /// Roles from the service account (pre-fetched for RBAC evaluation)
    pub service_account_roles: Option<Vec<String>>,
}

/// API key with ownership details loaded
#[derive(Debug, Clone)]
pub struct ApiKeyWithOwner {
    pub key: ApiKey,
    pub org_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub project_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub service_account_id: Option<Uuid>,
    /// Roles from the service account (pre-fetched for RBAC evaluation)
    pub service_account_roles: Option<Vec<String>>,
}
