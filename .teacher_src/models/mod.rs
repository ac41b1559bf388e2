mod access_review;
mod api_key;
mod api_key_gen;
mod attribute_filter;
mod audit_log;
mod conversation;
#[cfg(feature = "sso")]
mod domain_verification;
mod dynamic_provider;
mod model_pricing;
mod org_rbac_policy;
#[cfg(feature = "sso")]
mod org_sso_config;
mod organization;
mod prefixed_id;
mod project;
mod prompt;
mod ranking_options;
#[cfg(feature = "sso")]
mod scim;
mod service_account;
#[cfg(feature = "sso")]
mod sso_group_mapping;
mod team;
mod usage;
mod user;
mod validators;
mod vector_store;

pub use access_review::*;
pub use api_key::*;
pub use api_key_gen::*;
pub use attribute_filter::*;
pub use audit_log::*;
pub use conversation::*;
#[cfg(feature = "sso")]
pub use domain_verification::*;
pub use dynamic_provider::*;
pub use model_pricing::*;
pub use org_rbac_policy::*;
#[cfg(feature = "sso")]
pub use org_sso_config::*;
pub use organization::*;
pub use prefixed_id::*;
pub use project::*;
pub use prompt::*;
pub use ranking_options::*;
#[cfg(feature = "sso")]
pub use scim::*;
pub use service_account::*;
#[cfg(feature = "sso")]
pub use sso_group_mapping::*;
pub use team::*;
pub use usage::*;
pub use user::*;
pub use vector_store::*;
