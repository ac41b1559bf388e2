use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{deletion::EraseError, store::StoreError};

/// Wire shape of every admin error body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug)]
pub enum AdminError {
    InvalidArgument(String),
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    Store(StoreError),
    Internal(String),
}

impl From<StoreError> for AdminError {
    fn from(err: StoreError) -> Self {
        AdminError::Store(err)
    }
}

impl From<EraseError> for AdminError {
    fn from(err: EraseError) -> Self {
        match err {
            EraseError::NotFound(id) => AdminError::NotFound(format!("Account not found: {id}")),
            EraseError::InProgress(id) => {
                AdminError::Conflict(format!("Account {id} is already being erased"))
            }
            EraseError::CommitFailed(e) | EraseError::Store(e) => AdminError::Store(e),
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AdminError::InvalidArgument(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_argument", msg)
            }
            AdminError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                "permission_denied",
                "Admin capability required".to_string(),
            ),
            AdminError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            AdminError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            AdminError::Store(err) => {
                tracing::error!(error = %err, "Document store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "store_error",
                    "An internal store error occurred".to_string(),
                )
            }
            AdminError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(code, message))).into_response()
    }
}
