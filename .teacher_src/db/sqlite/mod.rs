mod api_keys;
mod audit_logs;
mod common;
mod conversations;
#[cfg(feature = "sso")]
mod domain_verifications;
mod files;
mod model_pricing;
mod org_rbac_policies;
#[cfg(feature = "sso")]
mod org_sso_configs;
mod organizations;
mod projects;
mod prompts;
mod providers;
#[cfg(feature = "sso")]
mod scim_configs;
#[cfg(feature = "sso")]
mod scim_group_mappings;
#[cfg(feature = "sso")]
mod scim_user_mappings;
mod service_accounts;
#[cfg(feature = "sso")]
mod sso_group_mappings;
mod teams;
mod usage;
mod users;
mod vector_stores;

pub use api_keys::SqliteApiKeyRepo;
pub use audit_logs::SqliteAuditLogRepo;
pub use conversations::SqliteConversationRepo;
#[cfg(feature = "sso")]
pub use domain_verifications::SqliteDomainVerificationRepo;
pub use files::SqliteFilesRepo;
pub use model_pricing::SqliteModelPricingRepo;
pub use org_rbac_policies::SqliteOrgRbacPolicyRepo;
#[cfg(feature = "sso")]
pub use org_sso_configs::SqliteOrgSsoConfigRepo;
pub use organizations::SqliteOrganizationRepo;
pub use projects::SqliteProjectRepo;
pub use prompts::SqlitePromptRepo;
pub use providers::SqliteDynamicProviderRepo;
#[cfg(feature = "sso")]
pub use scim_configs::SqliteOrgScimConfigRepo;
#[cfg(feature = "sso")]
pub use scim_group_mappings::SqliteScimGroupMappingRepo;
#[cfg(feature = "sso")]
pub use scim_user_mappings::SqliteScimUserMappingRepo;
pub use service_accounts::SqliteServiceAccountRepo;
#[cfg(feature = "sso")]
pub use sso_group_mappings::SqliteSsoGroupMappingRepo;
pub use teams::SqliteTeamRepo;
pub use usage::SqliteUsageRepo;
pub use users::SqliteUserRepo;
pub use vector_stores::SqliteVectorStoresRepo;
