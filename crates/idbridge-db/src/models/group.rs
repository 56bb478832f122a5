//! Local group model.

use super::sync_status::{SyncStatus, SyncTransition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A locally-owned group whose membership is mirrored to the remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Group {
    pub id: Uuid,
    pub display_name: String,
    pub description: Option<String>,

    /// Identifier assigned by the remote directory.
    pub remote_id: Option<String>,

    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_error: Option<String>,

    /// Local member user identifiers. Order is irrelevant.
    pub member_ids: BTreeSet<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Group {
    pub(crate) fn apply_transition(&mut self, transition: SyncTransition, now: DateTime<Utc>) {
        match transition {
            SyncTransition::Synced { remote_id, .. } | SyncTransition::Deactivated { remote_id } => {
                self.remote_id = Some(remote_id);
                self.sync_status = SyncStatus::Synced;
                self.sync_error = None;
                self.last_synced_at = Some(now);
            }
            SyncTransition::Warning { remote_id, error } => {
                self.remote_id = Some(remote_id);
                self.sync_status = SyncStatus::Warning;
                self.sync_error = Some(error);
                self.last_synced_at = Some(now);
            }
            SyncTransition::Failed { error } => {
                self.sync_status = SyncStatus::Failed;
                self.sync_error = Some(error);
            }
        }
        self.updated_at = now;
    }

    /// Mark locally changed so the next sync pushes it again.
    pub(crate) fn touch(&mut self, now: DateTime<Utc>) {
        self.sync_status = SyncStatus::Pending;
        self.updated_at = now;
    }
}

/// Data required to create a group.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewGroup {
    pub display_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub member_ids: BTreeSet<Uuid>,
}

/// Partial update of a group's metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GroupChanges {
    pub display_name: Option<String>,
    pub description: Option<Option<String>>,
}

impl GroupChanges {
    pub(crate) fn apply(self, group: &mut Group) -> bool {
        let mut changed = false;
        if let Some(display_name) = self.display_name {
            changed |= group.display_name != display_name;
            group.display_name = display_name;
        }
        if let Some(description) = self.description {
            changed |= group.description != description;
            group.description = description;
        }
        changed
    }
}
