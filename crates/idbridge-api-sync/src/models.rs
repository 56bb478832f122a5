//! Request and response bodies of the provisioning API.

use chrono::{DateTime, Utc};
use idbridge_db::{Group, SyncStatus, User};
use idbridge_roles::RoleMapping;
use idbridge_scim_client::BulkSyncReport;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Sync state of one user or group after a trigger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SyncResult {
    pub id: Uuid,
    pub sync_status: SyncStatus,
    pub remote_id: Option<String>,
    pub error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl From<User> for SyncResult {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            sync_status: user.sync_status,
            remote_id: user.remote_id,
            error: user.sync_error,
            last_synced_at: user.last_synced_at,
        }
    }
}

impl From<Group> for SyncResult {
    fn from(group: Group) -> Self {
        Self {
            id: group.id,
            sync_status: group.sync_status,
            remote_id: group.remote_id,
            error: group.sync_error,
            last_synced_at: group.last_synced_at,
        }
    }
}

/// Optional body of `POST /sync/bulk`. Both kinds run when omitted.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BulkSyncRequest {
    #[serde(default = "default_true")]
    pub users: bool,
    #[serde(default = "default_true")]
    pub groups: bool,
}

impl Default for BulkSyncRequest {
    fn default() -> Self {
        Self {
            users: true,
            groups: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BulkSyncResponse {
    #[serde(flatten)]
    pub report: BulkSyncReport,
    pub message: String,
}

impl From<BulkSyncReport> for BulkSyncResponse {
    fn from(report: BulkSyncReport) -> Self {
        Self {
            message: report.message(),
            report,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CancelBulkResponse {
    /// False when no bulk sync was running.
    pub cancelled: bool,
}

/// Body of `POST /roles/mappings/bulk`: a JSON array of mappings.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(transparent)]
pub struct BulkMappingsRequest {
    #[validate(length(min = 1, max = 500, message = "Between 1 and 500 mappings per request"))]
    pub mappings: Vec<RoleMapping>,
}

/// Body of `POST /users/:id/roles/sync`: a JSON array of external role values.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(transparent)]
pub struct ExternalRoleValues {
    #[validate(length(max = 100, message = "At most 100 role values per request"))]
    pub values: Vec<String>,
}
