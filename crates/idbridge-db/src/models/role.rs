//! Role model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A local role, optionally mapped to an external role value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Role {
    pub id: Uuid,

    /// Unique role name.
    pub name: String,

    pub description: Option<String>,

    /// Value an upstream identity source uses for this role. Unique when set.
    pub external_value: Option<String>,

    pub active: bool,

    /// Assigned to JIT-provisioned users when nothing else matches.
    pub is_default: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub external_value: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub is_default: bool,
}

fn default_true() -> bool {
    true
}

impl NewRole {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            ..Self::default()
        }
    }
}

/// Partial update of a role.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub external_value: Option<Option<String>>,
    pub active: Option<bool>,
    pub is_default: Option<bool>,
}

impl RoleChanges {
    pub(crate) fn apply(self, role: &mut Role) {
        if let Some(name) = self.name {
            role.name = name;
        }
        if let Some(description) = self.description {
            role.description = description;
        }
        if let Some(external_value) = self.external_value {
            role.external_value = external_value;
        }
        if let Some(active) = self.active {
            role.active = active;
        }
        if let Some(is_default) = self.is_default {
            role.is_default = is_default;
        }
    }
}
