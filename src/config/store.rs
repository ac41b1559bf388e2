use serde::{Deserialize, Serialize};

/// Document store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-process store. Default; used for tests and local runs.
    #[default]
    Memory,
    /// SQLite via sqlx. Requires the `database-sqlite` feature.
    Sqlite,
}

/// Document store configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// SQLite settings, required when `backend = "sqlite"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sqlite: Option<SqliteStoreConfig>,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.backend == StoreBackend::Sqlite && self.sqlite.is_none() {
            return Err("store.backend = \"sqlite\" requires a [store.sqlite] section".into());
        }
        Ok(())
    }
}

/// SQLite document store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the database file.
    pub path: String,

    /// Create the database file if it does not exist.
    /// Default: true
    #[serde(default = "default_create_if_missing")]
    pub create_if_missing: bool,

    /// Maximum pool connections.
    /// Default: 5
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_create_if_missing() -> bool {
    true
}

fn default_max_connections() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_requires_section() {
        let config = StoreConfig {
            backend: StoreBackend::Sqlite,
            sqlite: None,
        };
        assert!(config.validate().is_err());
        assert!(StoreConfig::default().validate().is_ok());
    }

    #[test]
    fn test_parse_sqlite_config() {
        let config: StoreConfig = toml::from_str(
            r#"
            backend = "sqlite"

            [sqlite]
            path = "/var/lib/offboard/offboard.db"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend, StoreBackend::Sqlite);
        let sqlite = config.sqlite.unwrap();
        assert!(sqlite.create_if_missing);
        assert_eq!(sqlite.max_connections, 5);
    }
}
