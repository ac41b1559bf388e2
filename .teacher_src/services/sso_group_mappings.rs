use std::{collections::HashMap, sync::Arc};

use uuid::Uuid;

use crate::{
    db::{DbPool, DbResult, ListParams, repos::ListResult},
    models::{CreateSsoGroupMapping, ResolvedMembership, SsoGroupMapping, UpdateSsoGroupMapping},
};

/// Service layer for SSO group mapping operations.
///
/// This service handles the resolution of IdP groups to Hadrian team memberships
/// during JIT (Just-in-Time) provisioning. When a user logs in via SSO, their
/// IdP groups are looked up to determine which teams they should be added to.
#[derive(Clone)]
pub struct SsoGroupMappingService {
    db: Arc<DbPool>,
}

impl SsoGroupMappingService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Create a new SSO group mapping.
    pub async fn create(
        &self,
        org_id: Uuid,
        input: CreateSsoGroupMapping,
    ) -> DbResult<SsoGroupMapping> {
        self.db.sso_group_mappings().create(org_id, input).await
    }

    /// Get a mapping by its ID.
    pub async fn get_by_id(&self, id: Uuid) -> DbResult<Option<SsoGroupMapping>> {
        self.db.sso_group_mappings().get_by_id(id).await
    }

    /// List all mappings for an organization.
    pub async fn list_by_org(
        &self,
        org_id: Uuid,
        params: ListParams,
    ) -> DbResult<ListResult<SsoGroupMapping>> {
        self.db
            .sso_group_mappings()
            .list_by_org(org_id, params)
            .await
    }

    /// List mappings for a specific SSO connection within an organization.
    pub async fn list_by_connection(
        &self,
        sso_connection_name: &str,
        org_id: Uuid,
        params: ListParams,
    ) -> DbResult<ListResult<SsoGroupMapping>> {
        self.db
            .sso_group_mappings()
            .list_by_connection(sso_connection_name, org_id, params)
            .await
    }

    /// Count mappings for an organization.
    pub async fn count_by_org(&self, org_id: Uuid) -> DbResult<i64> {
        self.db.sso_group_mappings().count_by_org(org_id).await
    }

    /// Update a mapping.
    pub async fn update(
        &self,
        id: Uuid,
        input: UpdateSsoGroupMapping,
    ) -> DbResult<SsoGroupMapping> {
        self.db.sso_group_mappings().update(id, input).await
    }

    /// Delete a mapping.
    pub async fn delete(&self, id: Uuid) -> DbResult<()> {
        self.db.sso_group_mappings().delete(id).await
    }

    /// Delete all mappings for a specific IdP group within an org/connection.
    pub async fn delete_by_idp_group(
        &self,
        sso_connection_name: &str,
        org_id: Uuid,
        idp_group: &str,
    ) -> DbResult<u64> {
        self.db
            .sso_group_mappings()
            .delete_by_idp_group(sso_connection_name, org_id, idp_group)
            .await
    }

    /// Resolve a user's IdP groups to Hadrian team memberships.
    ///
    /// This is the core method used during JIT provisioning. It looks up all
    /// configured mappings that match the user's IdP groups and returns the
    /// resolved team memberships.
    ///
    /// # Arguments
    /// * `sso_connection_name` - The SSO connection identifier (from config, defaults to "default")
    /// * `org_id` - The organization to resolve memberships within
    /// * `idp_groups` - List of IdP group names from the user's token
    /// * `default_role` - Default role to use when a mapping doesn't specify one
    ///
    /// # Returns
    /// A list of resolved memberships, each containing a team ID, role, and the
    /// IdP group that triggered the membership. Returns an empty list if no
    /// mappings match or if `idp_groups` is empty.
    ///
    /// # Behavior
    /// - Mappings without a `team_id` are skipped (they represent org-level roles only)
    /// - Mappings without a `role` use the provided `default_role`
    /// - Multiple mappings can match the same IdP group (e.g., one group → multiple teams)
    /// - When multiple mappings target the same team, the highest priority mapping wins
    /// - Each team appears at most once in the result
    ///
    /// # Priority Resolution
    /// Mappings are processed in priority order (highest first). When a user belongs
    /// to multiple IdP groups that map to the same team with different roles, the
    /// mapping with the highest `priority` value determines the role. If priorities
    /// are equal, the first matching group (alphabetically) wins.
    ///
    /// # Example
    /// ```ignore
    /// let memberships = service.resolve_memberships(
    ///     "default",
    ///     org_id,
    ///     &["Engineering".to_string(), "Platform".to_string()],
    ///     "member",
    /// ).await?;
    ///
    /// for m in memberships {
    ///     println!("Add to team {} with role {} (from group {})",
    ///         m.team_id, m.role, m.from_idp_group);
    /// }
    /// ```
    pub async fn resolve_memberships(
        &self,
        sso_connection_name: &str,
        org_id: Uuid,
        idp_groups: &[String],
        default_role: &str,
    ) -> DbResult<Vec<ResolvedMembership>> {
        // Early return for empty groups
        if idp_groups.is_empty() {
            return Ok(Vec::new());
        }

        // Find all mappings that match the user's IdP groups
        // Results are ordered by priority DESC, idp_group ASC, created_at ASC
        let mappings = self
            .db
            .sso_group_mappings()
            .find_mappings_for_groups(sso_connection_name, org_id, idp_groups)
            .await?;

        // Deduplicate by team_id, keeping the highest priority mapping for each team.
        // Since mappings are ordered by priority DESC, the first occurrence wins.
        let mut seen_teams: HashMap<Uuid, ResolvedMembership> = HashMap::new();

        for mapping in mappings {
            // Skip mappings without a team_id (org-level role only)
            let Some(team_id) = mapping.team_id else {
                continue;
            };

            // Only keep the first (highest priority) mapping for each team
            seen_teams
                .entry(team_id)
                .or_insert_with(|| ResolvedMembership {
                    team_id,
                    role: mapping.role.unwrap_or_else(|| default_role.to_string()),
                    from_idp_group: mapping.idp_group,
                });
        }

        // Sort by team_id for deterministic ordering
        let mut memberships: Vec<_> = seen_teams.into_values().collect();
        memberships.sort_by_key(|m| m.team_id);
        Ok(memberships)
    }

    /// Get all unique IdP groups that have been configured for an organization.
    ///
    /// Useful for admin UIs to show which groups have mappings configured.
    pub async fn get_configured_groups(
        &self,
        sso_connection_name: &str,
        org_id: Uuid,
    ) -> DbResult<Vec<String>> {
        let mappings = self
            .db
            .sso_group_mappings()
            .list_by_connection(sso_connection_name, org_id, ListParams::default())
            .await?;

        let mut groups: Vec<String> = mappings.items.into_iter().map(|m| m.idp_group).collect();

        // Deduplicate and sort
        groups.sort();
        groups.dedup();

        Ok(groups)
    }
}
