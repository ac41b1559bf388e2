//! CSV export utilities for access review reports
//!
//! This module provides CSV serialization for access review data,
//! enabling auditor-friendly exports for compliance reviews.

use axum::{
    body::Body,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use csv::Writer;

use crate::models::{
    AccessInventoryResponse, OrgAccessReportResponse, StaleAccessResponse,
    UserAccessInventoryEntry, UserAccessSummaryResponse,
};

/// Error type for CSV export operations
#[derive(Debug)]
pub struct CsvExportError(String);

impl std::fmt::Display for CsvExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CSV export error: {}", self.0)
    }
}

impl std::error::Error for CsvExportError {}

impl IntoResponse for CsvExportError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
    }
}

/// CSV response wrapper that sets appropriate headers
pub struct CsvResponse {
    pub data: Vec<u8>,
    pub filename: String,
}

impl IntoResponse for CsvResponse {
    fn into_response(self) -> Response {
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/csv; charset=utf-8")
            .header(
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", self.filename),
            )
            .body(Body::from(self.data))
            .unwrap()
    }
}

/// Flattened row for access inventory CSV export
#[derive(Clone, serde::Serialize)]
struct AccessInventoryRow {
    user_id: String,
    external_id: String,
    email: String,
    name: String,
    created_at: String,
    org_id: String,
    org_slug: String,
    org_name: String,
    org_role: String,
    org_granted_at: String,
    project_id: String,
    project_slug: String,
    project_name: String,
    project_org_id: String,
    project_role: String,
    project_granted_at: String,
    api_keys_active: i64,
    api_keys_revoked: i64,
    api_keys_expired: i64,
    last_activity_at: String,
}

/// Export access inventory to CSV format
pub fn export_access_inventory_csv(
    response: &AccessInventoryResponse,
) -> Result<Vec<u8>, CsvExportError> {
    let mut wtr = Writer::from_writer(vec![]);

    // Flatten the hierarchical data into rows
    // Each user-org-project combination becomes a row
    for user in &response.users {
        let base_row = create_base_inventory_row(user);

        if user.organizations.is_empty() && user.projects.is_empty() {
            // User with no org/project memberships - output one row
            wtr.serialize(&base_row)
                .map_err(|e| CsvExportError(e.to_string()))?;
        } else {
            // Output a row for each org membership
            for org in &user.organizations {
                let mut row = base_row.clone();
                row.org_id = org.org_id.to_string();
                row.org_slug = org.org_slug.clone();
                row.org_name = org.org_name.clone();
                row.org_role = org.role.clone();
                row.org_granted_at = org.granted_at.to_rfc3339();
                wtr.serialize(&row)
                    .map_err(|e| CsvExportError(e.to_string()))?;
            }

            // Output a row for each project membership
            for project in &user.projects {
                let mut row = base_row.clone();
                row.project_id = project.project_id.to_string();
                row.project_slug = project.project_slug.clone();
                row.project_name = project.project_name.clone();
                row.project_org_id = project.org_id.to_string();
                row.project_role = project.role.clone();
                row.project_granted_at = project.granted_at.to_rfc3339();
                wtr.serialize(&row)
                    .map_err(|e| CsvExportError(e.to_string()))?;
            }
        }
    }

    wtr.into_inner().map_err(|e| CsvExportError(e.to_string()))
}

fn create_base_inventory_row(user: &UserAccessInventoryEntry) -> AccessInventoryRow {
    AccessInventoryRow {
        user_id: user.user_id.to_string(),
        external_id: user.external_id.clone(),
        email: user.email.clone().unwrap_or_default(),
        name: user.name.clone().unwrap_or_default(),
        created_at: user.created_at.to_rfc3339(),
        org_id: String::new(),
        org_slug: String::new(),
        org_name: String::new(),
        org_role: String::new(),
        org_granted_at: String::new(),
        project_id: String::new(),
        project_slug: String::new(),
        project_name: String::new(),
        project_org_id: String::new(),
        project_role: String::new(),
        project_granted_at: String::new(),
        api_keys_active: user.api_key_summary.active_count,
        api_keys_revoked: user.api_key_summary.revoked_count,
        api_keys_expired: user.api_key_summary.expired_count,
        last_activity_at: user
            .last_activity_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    }
}

/// Flattened row for org access report CSV export
#[derive(Clone, serde::Serialize)]
struct OrgAccessReportRow {
    user_id: String,
    external_id: String,
    email: String,
    name: String,
    org_role: String,
    org_granted_at: String,
    project_id: String,
    project_slug: String,
    project_name: String,
    project_role: String,
    project_granted_at: String,
    api_keys_active: i64,
    api_keys_revoked: i64,
    api_keys_expired: i64,
    last_activity_at: String,
}

/// Export org access report to CSV format
pub fn export_org_access_report_csv(
    response: &OrgAccessReportResponse,
) -> Result<Vec<u8>, CsvExportError> {
    let mut wtr = Writer::from_writer(vec![]);

    for member in &response.members {
        let base_row = OrgAccessReportRow {
            user_id: member.user_id.to_string(),
            external_id: member.external_id.clone(),
            email: member.email.clone().unwrap_or_default(),
            name: member.name.clone().unwrap_or_default(),
            org_role: member.role.clone(),
            org_granted_at: member.granted_at.to_rfc3339(),
            project_id: String::new(),
            project_slug: String::new(),
            project_name: String::new(),
            project_role: String::new(),
            project_granted_at: String::new(),
            api_keys_active: member.api_key_summary.active_count,
            api_keys_revoked: member.api_key_summary.revoked_count,
            api_keys_expired: member.api_key_summary.expired_count,
            last_activity_at: member
                .last_activity_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        };

        if member.project_access.is_empty() {
            wtr.serialize(&base_row)
                .map_err(|e| CsvExportError(e.to_string()))?;
        } else {
            for project in &member.project_access {
                let mut row = base_row.clone();
                row.project_id = project.project_id.to_string();
                row.project_slug = project.project_slug.clone();
                row.project_name = project.project_name.clone();
                row.project_role = project.role.clone();
                row.project_granted_at = project.granted_at.to_rfc3339();
                wtr.serialize(&row)
                    .map_err(|e| CsvExportError(e.to_string()))?;
            }
        }
    }

    wtr.into_inner().map_err(|e| CsvExportError(e.to_string()))
}

/// Flattened row for user access summary CSV export
#[derive(serde::Serialize)]
struct UserAccessSummaryRow {
    user_id: String,
    external_id: String,
    email: String,
    name: String,
    created_at: String,
    resource_type: String, // "organization", "project", or "api_key"
    resource_id: String,
    resource_slug: String,
    resource_name: String,
    role: String,
    granted_at: String,
    is_active: String, // For API keys
    last_used_at: String,
    last_activity_at: String,
}

/// Export user access summary to CSV format
pub fn export_user_access_summary_csv(
    response: &UserAccessSummaryResponse,
) -> Result<Vec<u8>, CsvExportError> {
    let mut wtr = Writer::from_writer(vec![]);

    let base = |resource_type: &str| UserAccessSummaryRow {
        user_id: response.user_id.to_string(),
        external_id: response.external_id.clone(),
        email: response.email.clone().unwrap_or_default(),
        name: response.name.clone().unwrap_or_default(),
        created_at: response.created_at.to_rfc3339(),
        resource_type: resource_type.to_string(),
        resource_id: String::new(),
        resource_slug: String::new(),
        resource_name: String::new(),
        role: String::new(),
        granted_at: String::new(),
        is_active: String::new(),
        last_used_at: String::new(),
        last_activity_at: response
            .last_activity_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default(),
    };

    // Organizations
    for org in &response.organizations {
        let mut row = base("organization");
        row.resource_id = org.org_id.to_string();
        row.resource_slug = org.org_slug.clone();
        row.resource_name = org.org_name.clone();
        row.role = org.role.clone();
        row.granted_at = org.granted_at.to_rfc3339();
        row.last_activity_at = org
            .last_activity_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        wtr.serialize(&row)
            .map_err(|e| CsvExportError(e.to_string()))?;
    }

    // Projects
    for project in &response.projects {
        let mut row = base("project");
        row.resource_id = project.project_id.to_string();
        row.resource_slug = project.project_slug.clone();
        row.resource_name = project.project_name.clone();
        row.role = project.role.clone();
        row.granted_at = project.granted_at.to_rfc3339();
        row.last_activity_at = project
            .last_activity_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        wtr.serialize(&row)
            .map_err(|e| CsvExportError(e.to_string()))?;
    }

    // API keys
    for api_key in &response.api_keys {
        let mut row = base("api_key");
        row.resource_id = api_key.key_id.to_string();
        row.resource_name = api_key.name.clone();
        row.is_active = api_key.is_active.to_string();
        row.granted_at = api_key.created_at.to_rfc3339();
        row.last_used_at = api_key
            .last_used_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        wtr.serialize(&row)
            .map_err(|e| CsvExportError(e.to_string()))?;
    }

    // If no resources, output a single row with user info
    if response.organizations.is_empty()
        && response.projects.is_empty()
        && response.api_keys.is_empty()
    {
        wtr.serialize(base(""))
            .map_err(|e| CsvExportError(e.to_string()))?;
    }

    wtr.into_inner().map_err(|e| CsvExportError(e.to_string()))
}

/// Flattened row for stale access CSV export
#[derive(serde::Serialize)]
struct StaleAccessRow {
    category: String, // "stale_user", "stale_api_key", "never_active_user"
    user_id: String,
    external_id: String,
    email: String,
    name: String,
    created_at: String,
    last_activity_at: String,
    days_inactive: i64,
    org_count: i64,
    project_count: i64,
    active_api_keys: i64,
    // For API keys
    key_id: String,
    key_name: String,
    key_prefix: String,
    owner_type: String,
    owner_id: String,
    never_used: String,
}

/// Export stale access report to CSV format
pub fn export_stale_access_csv(response: &StaleAccessResponse) -> Result<Vec<u8>, CsvExportError> {
    let mut wtr = Writer::from_writer(vec![]);

    // Stale users
    for user in &response.stale_users {
        let row = StaleAccessRow {
            category: "stale_user".to_string(),
            user_id: user.user_id.to_string(),
            external_id: user.external_id.clone(),
            email: user.email.clone().unwrap_or_default(),
            name: user.name.clone().unwrap_or_default(),
            created_at: user.created_at.to_rfc3339(),
            last_activity_at: user
                .last_activity_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
            days_inactive: user.days_inactive,
            org_count: user.org_count,
            project_count: user.project_count,
            active_api_keys: user.active_api_keys,
            key_id: String::new(),
            key_name: String::new(),
            key_prefix: String::new(),
            owner_type: String::new(),
            owner_id: String::new(),
            never_used: String::new(),
        };
        wtr.serialize(&row)
            .map_err(|e| CsvExportError(e.to_string()))?;
    }

    // Never active users
    for user in &response.never_active_users {
        let row = StaleAccessRow {
            category: "never_active_user".to_string(),
            user_id: user.user_id.to_string(),
            external_id: user.external_id.clone(),
            email: user.email.clone().unwrap_or_default(),
            name: user.name.clone().unwrap_or_default(),
            created_at: user.created_at.to_rfc3339(),
            last_activity_at: String::new(),
            days_inactive: user.days_since_creation,
            org_count: user.org_count,
            project_count: user.project_count,
            active_api_keys: user.active_api_keys,
            key_id: String::new(),
            key_name: String::new(),
            key_prefix: String::new(),
            owner_type: String::new(),
            owner_id: String::new(),
            never_used: String::new(),
        };
        wtr.serialize(&row)
            .map_err(|e| CsvExportError(e.to_string()))?;
    }

    // Stale API keys
    for key in &response.stale_api_keys {
        let row = StaleAccessRow {
            category: "stale_api_key".to_string(),
            user_id: String::new(),
            external_id: String::new(),
            email: String::new(),
            name: String::new(),
            created_at: key.created_at.to_rfc3339(),
            last_activity_at: key.last_used_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
            days_inactive: key.days_inactive,
            org_count: 0,
            project_count: 0,
            active_api_keys: 0,
            key_id: key.key_id.to_string(),
            key_name: key.name.clone(),
            key_prefix: key.key_prefix.clone(),
            owner_type: key.owner_type.clone(),
            owner_id: key.owner_id.to_string(),
            never_used: key.never_used.to_string(),
        };
        wtr.serialize(&row)
            .map_err(|e| CsvExportError(e.to_string()))?;
    }

    wtr.into_inner().map_err(|e| CsvExportError(e.to_string()))
}
