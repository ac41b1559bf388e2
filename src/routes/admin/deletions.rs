//! Manual deletion endpoint: an administrator erases one account
//! immediately, bypassing the grace-period schedule.

use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AdminAuth, AdminError};
use crate::{
    AppState,
    deletion::policy::ACCOUNTS_COLLECTION,
    models::{Account, DeletionOutcome, OutcomeStatus},
};

#[derive(Debug, Deserialize)]
pub struct ManualDeletionRequest {
    #[serde(default)]
    pub account_id: String,
}

#[derive(Debug, Serialize)]
pub struct ManualDeletionResponse {
    pub success: bool,
    pub message: String,
}

pub async fn create(
    State(state): State<AppState>,
    AdminAuth(admin): AdminAuth,
    Json(request): Json<ManualDeletionRequest>,
) -> Result<Json<ManualDeletionResponse>, AdminError> {
    let account_id = request.account_id.trim();
    if account_id.is_empty() {
        return Err(AdminError::InvalidArgument(
            "account_id is required".to_string(),
        ));
    }

    let doc = state
        .store
        .get(ACCOUNTS_COLLECTION, account_id)
        .await?
        .ok_or_else(|| AdminError::NotFound(format!("Account not found: {account_id}")))?;
    let account: Account = doc.parse()?;

    let now = Utc::now();
    let erased = state.eraser.erase(&account, now).await?;

    let outcome = DeletionOutcome {
        account_id: account.id.clone(),
        email: account.email.clone(),
        deleted_at: now,
        status: OutcomeStatus::Success,
        reason: account.deletion_reason.clone(),
        error: None,
        storage: erased.storage,
        identity: Some(erased.identity),
    };
    state.audit.record_manual(&outcome, &admin.operator).await?;

    info!(
        account_id = %account.id,
        operator = %admin.operator,
        "Manual account deletion complete"
    );

    Ok(Json(ManualDeletionResponse {
        success: true,
        message: format!("Account {account_id} and all associated data deleted"),
    }))
}
