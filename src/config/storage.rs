//! Object storage configuration for per-account blobs.

use serde::{Deserialize, Serialize};

/// Object storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// In-process store. Default; used for tests and local runs.
    #[default]
    Memory,
    /// Objects as files under a base directory.
    Filesystem,
    /// S3-compatible object storage. Requires the `s3-storage` feature.
    S3,
}

/// Object storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Filesystem settings, required when `backend = "filesystem"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesystem: Option<FilesystemStorageConfig>,

    /// S3 settings, required when `backend = "s3"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3StorageConfig>,
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), String> {
        match self.backend {
            StorageBackend::Filesystem if self.filesystem.is_none() => Err(
                "storage.backend = \"filesystem\" requires a [storage.filesystem] section".into(),
            ),
            StorageBackend::S3 if self.s3.is_none() => {
                Err("storage.backend = \"s3\" requires a [storage.s3] section".into())
            }
            _ => Ok(()),
        }
    }
}

/// Filesystem object storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilesystemStorageConfig {
    /// Base directory; object keys become paths beneath it.
    pub path: String,

    /// Create the base directory if it does not exist.
    /// Default: true
    #[serde(default = "default_create_dir")]
    pub create_dir: bool,
}

fn default_create_dir() -> bool {
    true
}

/// S3-compatible object storage settings.
///
/// Works with AWS S3, MinIO, Cloudflare R2, and other S3-compatible services.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct S3StorageConfig {
    /// Bucket name.
    pub bucket: String,

    /// AWS region. Falls back to the SDK's default resolution when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Custom endpoint URL for S3-compatible services.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Static credentials. When unset, the SDK's default credential chain
    /// (environment, instance profile) is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_access_key: Option<String>,

    /// Use path-style addressing (required by MinIO).
    /// Default: false
    #[serde(default)]
    pub force_path_style: bool,

    /// Prefix prepended to every object key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_prefix: Option<String>,
}

impl S3StorageConfig {
    /// Full object key for a logical key, applying the configured prefix.
    pub fn object_key(&self, key: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}{key}"),
            None => key.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_sections_required() {
        let fs = StorageConfig {
            backend: StorageBackend::Filesystem,
            filesystem: None,
            s3: None,
        };
        assert!(fs.validate().is_err());

        let s3 = StorageConfig {
            backend: StorageBackend::S3,
            filesystem: None,
            s3: None,
        };
        assert!(s3.validate().is_err());

        assert!(StorageConfig::default().validate().is_ok());
    }

    #[test]
    fn test_s3_object_key_prefix() {
        let config: S3StorageConfig = toml::from_str(
            r#"
            bucket = "blobs"
            key_prefix = "offboard/"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.object_key("accounts/u1/avatar.png"),
            "offboard/accounts/u1/avatar.png"
        );
    }
}
