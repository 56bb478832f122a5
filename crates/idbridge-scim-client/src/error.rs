//! Error types for the remote directory client and sync engine.

use idbridge_db::DbError;
use thiserror::Error;

/// Result alias for client and engine operations.
pub type ScimClientResult<T> = Result<T, ScimClientError>;

/// Errors raised while talking to the remote directory or applying sync state.
#[derive(Debug, Error)]
pub enum ScimClientError {
    /// Client could not be constructed from the given settings.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Response body could not be decoded.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// 404 from the remote.
    #[error("Remote resource not found: {0}")]
    NotFound(String),

    /// 409 from the remote, typically a duplicate create.
    #[error("Remote conflict: {0}")]
    Conflict(String),

    /// 409 on create, and the existing remote user could not be found.
    #[error("Remote reported a conflict but no existing user was discoverable for {0}")]
    ConflictNotDiscoverable(String),

    /// 429 from the remote.
    #[error("Rate limited by remote (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    /// 401/403 from the remote.
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// Any other 4xx. Not retryable.
    #[error("Remote rejected request ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// 5xx from the remote. Retryable.
    #[error("Remote unavailable ({status}): {detail}")]
    Unavailable { status: u16, detail: String },

    /// The per-call timeout elapsed.
    #[error("Remote call timed out: {0}")]
    Timeout(String),

    /// Network-level failure (DNS, connect, reset).
    #[error("Remote unreachable: {0}")]
    Unreachable(String),

    /// Retries were exhausted for an idempotent operation.
    #[error("{operation} failed after {attempts} attempt(s): {source}")]
    MaxRetriesExceeded {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<ScimClientError>,
    },

    /// Setting `active=false` on the remote user failed.
    #[error("Could not deactivate remote user {remote_id}: {source}")]
    DeactivationFailed {
        remote_id: String,
        #[source]
        source: Box<ScimClientError>,
    },

    /// A background sync task ended abnormally.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Local store failure.
    #[error("Store error: {0}")]
    Store(#[from] DbError),
}

impl ScimClientError {
    /// Whether the operation may succeed if retried unchanged.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Unreachable(_)
        )
    }

    /// Whether the remote answered with a 5xx.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Short stable label for operators and persisted error strings.
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "config",
            Self::ParseError(_) => "parse",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::ConflictNotDiscoverable(_) => "conflict_not_discoverable",
            Self::RateLimited { .. } => "rate_limited",
            Self::AuthError(_) => "auth",
            Self::Rejected { .. } => "rejected",
            Self::Unavailable { .. } | Self::Unreachable(_) => "unavailable",
            Self::MaxRetriesExceeded { source, .. } => source.class(),
            Self::Timeout(_) => "timeout",
            Self::DeactivationFailed { .. } => "deactivation_failed",
            Self::Store(_) => "store",
            Self::Internal(_) => "internal",
        }
    }

    /// Message persisted on the entity: `"<class>: <detail>"`.
    #[must_use]
    pub fn status_message(&self) -> String {
        format!("{}: {}", self.class(), self)
    }
}

impl From<reqwest::Error> for ScimClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else if err.is_decode() {
            Self::ParseError(err.to_string())
        } else if err.is_builder() {
            Self::InvalidConfig(err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ScimClientError {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}
