//! Role resolver errors.

use idbridge_db::DbError;
use thiserror::Error;

pub type RoleResult<T> = Result<T, RoleError>;

#[derive(Debug, Error)]
pub enum RoleError {
    #[error("Role not found: {0}")]
    NotFound(String),

    /// The role is still assigned and cannot be deleted.
    #[error("Role {name} is assigned to {users} user(s)")]
    InUse { name: String, users: usize },

    /// Another role is already the default.
    #[error("Role {existing} is already the default role")]
    DefaultConflict { existing: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] DbError),
}

impl From<validator::ValidationErrors> for RoleError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}
