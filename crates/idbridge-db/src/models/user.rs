//! Local user model.

use super::sync_status::{SyncStatus, SyncTransition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// A locally-owned user, pushed to the remote directory by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    /// Unique identifier.
    pub id: Uuid,

    pub username: String,

    /// Email address. Unique under case-insensitive comparison.
    pub email: String,

    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,

    /// Whether the user may sign in.
    pub active: bool,

    /// Identifier assigned by the remote directory. Null until the first
    /// successful create (or conflict adoption).
    pub remote_id: Option<String>,

    pub sync_status: SyncStatus,

    /// When the user was last successfully synced.
    pub last_synced_at: Option<DateTime<Utc>>,

    /// Last error message if sync failed or only partially applied.
    pub sync_error: Option<String>,

    /// Hash of the payload last pushed to the remote directory.
    pub last_synced_hash: Option<String>,

    /// Assigned role identifiers.
    pub role_ids: BTreeSet<Uuid>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Lowercased email used as the comparison key.
    #[must_use]
    pub fn email_key(&self) -> String {
        self.email.trim().to_lowercase()
    }

    /// Display name in "First Last" form, falling back to the username.
    #[must_use]
    pub fn formatted_name(&self) -> String {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            self.username.clone()
        } else {
            parts.join(" ")
        }
    }

    pub(crate) fn apply_transition(&mut self, transition: SyncTransition, now: DateTime<Utc>) {
        match transition {
            SyncTransition::Synced {
                remote_id,
                fingerprint,
            } => {
                self.remote_id = Some(remote_id);
                self.sync_status = SyncStatus::Synced;
                self.sync_error = None;
                self.last_synced_at = Some(now);
                self.last_synced_hash = fingerprint;
            }
            SyncTransition::Deactivated { remote_id } => {
                self.remote_id = Some(remote_id);
                self.active = false;
                self.sync_status = SyncStatus::Synced;
                self.sync_error = None;
                self.last_synced_at = Some(now);
                self.last_synced_hash = None;
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
}

/// Data required to create a user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewUser {
    /// Minimal user with only an email; the username defaults to the email.
    #[must_use]
    pub fn with_email(email: impl Into<String>) -> Self {
        let email = email.into();
        Self {
            username: email.clone(),
            email,
            active: true,
            ..Self::default()
        }
    }
}

/// Partial update of a user's directory attributes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub title: Option<Option<String>>,
    pub active: Option<bool>,
}

impl UserChanges {
    /// Apply the changes; returns true if any synced attribute changed.
    pub(crate) fn apply(self, user: &mut User) -> bool {
        let mut changed = false;
        if let Some(username) = self.username {
            changed |= user.username != username;
            user.username = username;
        }
        if let Some(email) = self.email {
            changed |= user.email != email;
            user.email = email;
        }
        if let Some(first_name) = self.first_name {
            changed |= user.first_name != first_name;
            user.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            changed |= user.last_name != last_name;
            user.last_name = last_name;
        }
        if let Some(title) = self.title {
            changed |= user.title != title;
            user.title = title;
        }
        if let Some(active) = self.active {
            changed |= user.active != active;
            user.active = active;
        }
        changed
    }
}
