//! Configuration module for the offboarding worker.
//!
//! The worker is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 8080
//!
//! [store]
//! backend = "sqlite"
//!
//! [store.sqlite]
//! path = "${OFFBOARD_DB_PATH}"
//!
//! [deletion]
//! enabled = true
//! interval_hours = 24
//! ```

mod auth;
mod deletion;
mod identity;
mod observability;
mod server;
mod storage;
mod store;

use std::path::{Path, PathBuf};

pub use auth::*;
pub use deletion::*;
pub use identity::*;
pub use observability::*;
use serde::{Deserialize, Serialize};
pub use server::*;
pub use storage::*;
pub use store::*;
use thiserror::Error;

/// Root configuration for the offboarding worker.
///
/// All sections are optional with defaults that run entirely in-process
/// (memory store, memory storage), which is what tests and local runs use.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Admin HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Document store holding accounts, owned records, retained records,
    /// and the audit trail.
    #[serde(default)]
    pub store: StoreConfig,

    /// Object storage holding per-account blobs.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Identity provider holding authentication records.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Admin authorization for the manual-deletion and audit-query endpoints.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Deletion engine settings (worker interval, dry-run, batching).
    #[serde(default)]
    pub deletion: DeletionConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(#[source] std::io::Error, PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing variables cause an error rather than an empty value.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: Config = toml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate().map_err(ConfigError::Validation)?;
        self.storage.validate().map_err(ConfigError::Validation)?;
        if self.deletion.storage_batch_size == 0 {
            return Err(ConfigError::Validation(
                "deletion.storage_batch_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `${VAR_NAME}` references against the process environment.
fn expand_env_vars(contents: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(contents.len());
    let mut rest = contents;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            result.push_str(&rest[start..]);
            return Ok(result);
        };
        let name = &after[..end];
        let value =
            std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(!config.deletion.enabled);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [server]
            host = "0.0.0.0"
            port = 9090

            [deletion]
            enabled = true
            interval_hours = 12
            dry_run = true
            storage_batch_size = 25

            [auth.admin_tokens]
            alice = "secret-token"
        "#;
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.server.port, 9090);
        assert!(config.deletion.enabled);
        assert_eq!(config.deletion.interval_hours, 12);
        assert!(config.deletion.dry_run);
        assert_eq!(config.deletion.storage_batch_size, 25);
        assert_eq!(
            config.auth.admin_tokens.get("alice").map(String::as_str),
            Some("secret-token")
        );
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::from_toml_str("[server]\nbogus = 1\n").is_err());
    }

    #[test]
    fn test_env_var_expansion() {
        // Set-and-read in one test to avoid cross-test env races.
        unsafe { std::env::set_var("OFFBOARD_TEST_PORT", "8123") };
        let config = Config::from_toml_str("[server]\nport = ${OFFBOARD_TEST_PORT}\n").unwrap();
        assert_eq!(config.server.port, 8123);

        let missing = Config::from_toml_str("[server]\nport = ${OFFBOARD_TEST_UNSET}\n");
        assert!(matches!(missing, Err(ConfigError::MissingEnvVar(_))));
    }

    #[test]
    fn test_zero_storage_batch_size_rejected() {
        let result = Config::from_toml_str("[deletion]\nstorage_batch_size = 0\n");
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
