use serde::{Deserialize, Serialize};

/// Identity provider backend selection.
///
/// The real identity provider is deployment glue behind the
/// [`crate::identity::IdentityProvider`] trait; the built-in backend keeps
/// local runs and tests self-contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityBackend {
    #[default]
    Memory,
}

/// Identity provider configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    #[serde(default)]
    pub backend: IdentityBackend,
}
