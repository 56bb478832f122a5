//! Error types for the idbridge-db crate.

use thiserror::Error;

/// Result alias for store operations.
pub type DbResult<T> = Result<T, DbError>;

/// Store operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint would be violated (email, role name, external value).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Input failed a shape or invariant check.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The record is still referenced by other records.
    #[error("Referential integrity violation: {0}")]
    ReferentialIntegrity(String),
}
