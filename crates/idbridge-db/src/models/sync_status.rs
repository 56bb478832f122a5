//! Sync status value and the transitions the sync engine may apply.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where an entity stands relative to the remote directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// Never attempted, or changed locally since the last push.
    #[default]
    Pending,
    /// Remote state matches the last pushed local state.
    Synced,
    /// The remote rejected the last attempt.
    Failed,
    /// Partially applied (e.g. some group members could not be pushed).
    Warning,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Failed => "failed",
            Self::Warning => "warning",
        }
    }

    /// Whether bulk sync should pick this entity up.
    #[must_use]
    pub fn needs_sync(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "failed" => Ok(Self::Failed),
            "warning" => Ok(Self::Warning),
            other => Err(DbError::Validation(format!("unknown sync status: {other}"))),
        }
    }
}

/// A sync-state change, applied to one entity in a single write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTransition {
    /// Remote matches local. `fingerprint` is the hash of the pushed payload.
    Synced {
        remote_id: String,
        fingerprint: Option<String>,
    },
    /// Remote user was locked out; sets local `active = false` as well.
    Deactivated { remote_id: String },
    /// Partially applied; the group keeps its remote reference.
    Warning {
        remote_id: String,
        error: String,
    },
    /// Attempt failed. An existing remote reference is preserved.
    Failed { error: String },
}

impl SyncTransition {
    pub(crate) fn validate(&self) -> DbResult<()> {
        match self {
            Self::Synced { remote_id, .. }
            | Self::Deactivated { remote_id }
            | Self::Warning { remote_id, .. }
                if remote_id.trim().is_empty() =>
            {
                Err(DbError::Validation(
                    "remote identity reference must not be empty".to_string(),
                ))
            }
            Self::Failed { error } | Self::Warning { error, .. } if error.trim().is_empty() => Err(
                DbError::Validation("failed/warning status requires an error message".to_string()),
            ),
            _ => Ok(()),
        }
    }
}
