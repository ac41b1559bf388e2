//! Read access to the deletion audit trail.

use axum::{Json, extract::Query, extract::State};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{AdminAuth, AdminError};
use crate::{AppState, models::{AuditQuery, AuditRecord}};

#[derive(Debug, Default, Deserialize)]
pub struct AuditLogParams {
    /// Inclusive, `YYYY-MM-DD`.
    pub start_date: Option<NaiveDate>,
    /// Inclusive, `YYYY-MM-DD`.
    pub end_date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct AuditLogsResponse {
    pub success: bool,
    pub logs: Vec<AuditRecord>,
    pub count: usize,
}

pub async fn list(
    State(state): State<AppState>,
    AdminAuth(_admin): AdminAuth,
    Query(params): Query<AuditLogParams>,
) -> Result<Json<AuditLogsResponse>, AdminError> {
    if let (Some(start), Some(end)) = (params.start_date, params.end_date)
        && start > end
    {
        return Err(AdminError::InvalidArgument(
            "start_date must not be after end_date".to_string(),
        ));
    }
    if params.limit == Some(0) {
        return Err(AdminError::InvalidArgument(
            "limit must be at least 1".to_string(),
        ));
    }

    let query = AuditQuery {
        start_date: params.start_date,
        end_date: params.end_date,
        limit: params.limit,
    };
    let logs = state.audit.query(&query).await?;
    let count = logs.len();

    Ok(Json(AuditLogsResponse {
        success: true,
        logs,
        count,
    }))
}
