//! Provisioning API error types.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use idbridge_db::DbError;
use idbridge_roles::RoleError;
use idbridge_scim_client::ScimClientError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Error type for provisioning API operations.
#[derive(Debug, Error)]
pub enum SyncApiError {
    /// Resource not found.
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },

    /// Request body failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Conflicting operation, e.g. a bulk sync already running.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Remote directory failure that could not be recorded as entity status.
    #[error("remote directory error: {0}")]
    Remote(ScimClientError),

    #[error("role error: {0}")]
    Role(RoleError),

    #[error("store error: {0}")]
    Store(DbError),

    /// Unexpected failure inside the service.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for provisioning API operations.
pub type Result<T> = std::result::Result<T, SyncApiError>;

impl From<DbError> for SyncApiError {
    fn from(err: DbError) -> Self {
        Self::Store(err)
    }
}

impl From<ScimClientError> for SyncApiError {
    fn from(err: ScimClientError) -> Self {
        match err {
            ScimClientError::Store(e) => Self::Store(e),
            ScimClientError::Internal(msg) => Self::Internal(msg),
            other => Self::Remote(other),
        }
    }
}

impl From<RoleError> for SyncApiError {
    fn from(err: RoleError) -> Self {
        match err {
            RoleError::Store(e) => Self::Store(e),
            other => Self::Role(other),
        }
    }
}

impl From<validator::ValidationErrors> for SyncApiError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl IntoResponse for SyncApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            SyncApiError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            SyncApiError::Validation(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            SyncApiError::Conflict(_) => (StatusCode::CONFLICT, "conflict", self.to_string()),
            SyncApiError::Remote(e) => {
                error!(class = e.class(), error = %e, "Remote directory error");
                (StatusCode::BAD_GATEWAY, e.class(), e.status_message())
            }
            SyncApiError::Role(RoleError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            SyncApiError::Role(RoleError::InUse { .. }) => {
                (StatusCode::CONFLICT, "role_in_use", self.to_string())
            }
            SyncApiError::Role(RoleError::DefaultConflict { .. }) => {
                (StatusCode::CONFLICT, "default_role_conflict", self.to_string())
            }
            SyncApiError::Role(_) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            SyncApiError::Store(DbError::NotFound(_)) => {
                (StatusCode::NOT_FOUND, "not_found", self.to_string())
            }
            SyncApiError::Store(DbError::Conflict(_)) => {
                (StatusCode::CONFLICT, "conflict", self.to_string())
            }
            SyncApiError::Store(DbError::Validation(_)) => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                self.to_string(),
            ),
            SyncApiError::Store(DbError::ReferentialIntegrity(_)) => (
                StatusCode::CONFLICT,
                "referential_integrity",
                self.to_string(),
            ),
            SyncApiError::Internal(msg) => {
                error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": error_type,
            "message": message,
        });

        (status, Json(body)).into_response()
    }
}
