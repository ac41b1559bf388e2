mod api_keys;
mod audit_logs;
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

pub use api_keys::PostgresApiKeyRepo;
pub use audit_logs::PostgresAuditLogRepo;
pub use conversations::PostgresConversationRepo;
#[cfg(feature = "sso")]
pub use domain_verifications::PostgresDomainVerificationRepo;
pub use files::PostgresFilesRepo;
pub use model_pricing::PostgresModelPricingRepo;
pub use org_rbac_policies::PostgresOrgRbacPolicyRepo;
#[cfg(feature = "sso")]
pub use org_sso_configs::PostgresOrgSsoConfigRepo;
pub use organizations::PostgresOrganizationRepo;
pub use projects::PostgresProjectRepo;
pub use prompts::PostgresPromptRepo;
pub use providers::PostgresDynamicProviderRepo;
#[cfg(feature = "sso")]
pub use scim_configs::PostgresOrgScimConfigRepo;
#[cfg(feature = "sso")]
pub use scim_group_mappings::PostgresScimGroupMappingRepo;
#[cfg(feature = "sso")]
pub use scim_user_mappings::PostgresScimUserMappingRepo;
pub use service_accounts::PostgresServiceAccountRepo;
#[cfg(feature = "sso")]
pub use sso_group_mappings::PostgresSsoGroupMappingRepo;
pub use teams::PostgresTeamRepo;
pub use usage::PostgresUsageRepo;
pub use users::PostgresUserRepo;
pub use vector_stores::PostgresVectorStoresRepo;
