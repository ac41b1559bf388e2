use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Admin authorization configuration.
///
/// The manual-deletion and audit-query endpoints require an administrative
/// capability, presented as a bearer token from this table. The key is the
/// operator name recorded in the audit trail, the value is that operator's
/// token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Operator name -> accepted bearer token. Empty means no caller is an
    /// admin and every protected endpoint rejects with permission denied.
    #[serde(default)]
    pub admin_tokens: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_admins() {
        assert!(AuthConfig::default().admin_tokens.is_empty());
    }
}
