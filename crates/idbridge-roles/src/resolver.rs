//! Role resolution and assignment rules.

use crate::error::{RoleError, RoleResult};
use idbridge_db::{DbError, DirectoryStore, NewRole, Role, RoleChanges, User};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

/// Result of resolving upstream role values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleResolution {
    /// Active roles whose external value was supplied, ordered by name.
    pub roles: Vec<Role>,
    /// Supplied values that matched no active role.
    pub unmapped: Vec<String>,
}

/// One entry of a bulk mapping upload.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RoleMapping {
    #[validate(length(min = 1, max = 255))]
    pub external_value: String,
    #[validate(length(min = 1, max = 255))]
    pub role_name: String,
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// A mapping entry that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct MappingError {
    pub external_value: String,
    pub error: String,
}

/// Outcome of [`RoleResolver::bulk_upsert_mappings`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BulkMappingReport {
    /// Names of roles created.
    pub created: Vec<String>,
    /// Names of roles whose mapping was updated.
    pub updated: Vec<String>,
    pub errors: Vec<MappingError>,
}

/// Outcome of [`RoleResolver::sync_user_roles`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UserRoleSync {
    pub user_id: Uuid,
    /// Names of the roles the user now holds.
    pub assigned: Vec<String>,
    pub unmapped: Vec<String>,
    pub default_role_used: bool,
}

/// Resolves external role values to local roles and manages assignments.
#[derive(Clone)]
pub struct RoleResolver {
    store: Arc<dyn DirectoryStore>,
}

impl RoleResolver {
    #[must_use]
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    /// Active roles mapped from `values`. Unknown values are reported, not errors.
    pub async fn resolve(&self, values: &BTreeSet<String>) -> RoleResult<RoleResolution> {
        let roles: Vec<Role> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .filter(|r| {
                r.active
                    && r
                        .external_value
                        .as_ref()
                        .is_some_and(|v| values.contains(v))
            })
            .collect();

        let matched: BTreeSet<&str> = roles
            .iter()
            .filter_map(|r| r.external_value.as_deref())
            .collect();
        let unmapped: Vec<String> = values
            .iter()
            .filter(|v| !matched.contains(v.as_str()))
            .cloned()
            .collect();

        if !unmapped.is_empty() {
            debug!(unmapped = ?unmapped, "Unmapped external role values");
        }
        Ok(RoleResolution { roles, unmapped })
    }

    /// The active default role. If several are flagged, the lowest id wins.
    pub async fn default_role(&self) -> RoleResult<Option<Role>> {
        let defaults: Vec<Role> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .filter(|r| r.active && r.is_default)
            .collect();
        if defaults.len() > 1 {
            warn!(count = defaults.len(), "Multiple default roles flagged, using lowest id");
        }
        Ok(defaults.into_iter().min_by_key(|r| r.id))
    }

    /// Look up a role by name.
    pub async fn role_by_name(&self, name: &str) -> RoleResult<Option<Role>> {
        Ok(self.store.get_role_by_name(name).await?)
    }

    /// Create a role. A second default role is rejected.
    pub async fn create_role(&self, new: NewRole) -> RoleResult<Role> {
        if new.is_default {
            self.ensure_no_other_default(None).await?;
        }
        let role = self.store.insert_role(new).await?;
        info!(role_id = %role.id, name = %role.name, "Role created");
        Ok(role)
    }

    /// Update a role. Making it the default while another default exists is rejected.
    pub async fn update_role(&self, id: Uuid, changes: RoleChanges) -> RoleResult<Role> {
        if changes.is_default == Some(true) {
            self.ensure_no_other_default(Some(id)).await?;
        }
        match self.store.update_role(id, changes).await {
            Ok(role) => Ok(role),
            Err(DbError::NotFound(_)) => Err(RoleError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete a role that no user holds.
    pub async fn delete_role(&self, id: Uuid) -> RoleResult<()> {
        let role = self.load_role(id).await?;
        let users = self.store.users_with_role(id).await?.len();
        if users > 0 {
            return Err(RoleError::InUse {
                name: role.name,
                users,
            });
        }
        self.store.delete_role(id).await?;
        info!(role_id = %id, name = %role.name, "Role deleted");
        Ok(())
    }

    /// Assign a role. Already assigned is a no-op.
    pub async fn assign(&self, role_id: Uuid, user_id: Uuid) -> RoleResult<User> {
        self.load_role(role_id).await?;
        let user = self.load_user(user_id).await?;
        if user.role_ids.contains(&role_id) {
            return Ok(user);
        }
        let mut role_ids = user.role_ids;
        role_ids.insert(role_id);
        let user = self.store.set_user_roles(user_id, role_ids).await?;
        info!(role_id = %role_id, user_id = %user_id, "Role assigned");
        Ok(user)
    }

    /// Remove a role. Not assigned is a no-op.
    pub async fn unassign(&self, role_id: Uuid, user_id: Uuid) -> RoleResult<User> {
        let user = self.load_user(user_id).await?;
        if !user.role_ids.contains(&role_id) {
            return Ok(user);
        }
        let mut role_ids = user.role_ids;
        role_ids.remove(&role_id);
        let user = self.store.set_user_roles(user_id, role_ids).await?;
        info!(role_id = %role_id, user_id = %user_id, "Role unassigned");
        Ok(user)
    }

    /// Create or update roles keyed by external value.
    ///
    /// An existing mapping is renamed and re-described in place. Each entry
    /// succeeds or fails on its own.
    pub async fn bulk_upsert_mappings(&self, mappings: Vec<RoleMapping>) -> BulkMappingReport {
        let mut report = BulkMappingReport::default();

        for mapping in mappings {
            let external_value = mapping.external_value.clone();
            match self.upsert_mapping(mapping).await {
                Ok((name, true)) => report.created.push(name),
                Ok((name, false)) => report.updated.push(name),
                Err(e) => {
                    warn!(external_value = %external_value, error = %e, "Role mapping rejected");
                    report.errors.push(MappingError {
                        external_value,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            created = report.created.len(),
            updated = report.updated.len(),
            errors = report.errors.len(),
            "Role mappings applied"
        );
        report
    }

    async fn upsert_mapping(&self, mapping: RoleMapping) -> RoleResult<(String, bool)> {
        mapping.validate()?;

        let existing = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .find(|r| r.external_value.as_deref() == Some(mapping.external_value.as_str()));

        match existing {
            Some(role) => {
                let role = self
                    .store
                    .update_role(
                        role.id,
                        RoleChanges {
                            name: Some(mapping.role_name),
                            description: Some(mapping.description),
                            active: Some(mapping.active),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok((role.name, false))
            }
            None => {
                let role = self
                    .store
                    .insert_role(NewRole {
                        name: mapping.role_name,
                        description: mapping.description,
                        external_value: Some(mapping.external_value),
                        active: mapping.active,
                        is_default: false,
                    })
                    .await?;
                Ok((role.name, true))
            }
        }
    }

    /// Sorted distinct external role values.
    pub async fn list_external_values(&self) -> RoleResult<Vec<String>> {
        let values: BTreeSet<String> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .filter_map(|r| r.external_value)
            .collect();
        Ok(values.into_iter().collect())
    }

    /// Replace the user's roles with those mapped from `external_values`.
    ///
    /// When nothing maps and the user held no roles, the default role is assigned.
    pub async fn sync_user_roles(
        &self,
        user_id: Uuid,
        external_values: &BTreeSet<String>,
    ) -> RoleResult<UserRoleSync> {
        let user = self.load_user(user_id).await?;
        let resolution = self.resolve(external_values).await?;

        let (roles, default_role_used) = if !resolution.roles.is_empty() {
            (resolution.roles, false)
        } else if user.role_ids.is_empty() {
            match self.default_role().await? {
                Some(role) => (vec![role], true),
                None => (Vec::new(), false),
            }
        } else {
            (Vec::new(), false)
        };

        let role_ids: BTreeSet<Uuid> = roles.iter().map(|r| r.id).collect();
        self.store.set_user_roles(user_id, role_ids).await?;

        let assigned: Vec<String> = roles.into_iter().map(|r| r.name).collect();
        info!(
            user_id = %user_id,
            assigned = ?assigned,
            unmapped = ?resolution.unmapped,
            default_role_used,
            "User roles synced"
        );
        Ok(UserRoleSync {
            user_id,
            assigned,
            unmapped: resolution.unmapped,
            default_role_used,
        })
    }

    /// External values of the user's active roles, for assertion attributes.
    pub async fn external_values_for(&self, user: &User) -> RoleResult<Vec<String>> {
        let mut values = Vec::new();
        for role_id in &user.role_ids {
            if let Some(role) = self.store.get_role(*role_id).await? {
                if role.active {
                    if let Some(value) = role.external_value {
                        values.push(value);
                    }
                }
            }
        }
        values.sort();
        Ok(values)
    }

    async fn ensure_no_other_default(&self, except: Option<Uuid>) -> RoleResult<()> {
        let existing = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .find(|r| r.is_default && Some(r.id) != except);
        match existing {
            Some(role) => Err(RoleError::DefaultConflict {
                existing: role.name,
            }),
            None => Ok(()),
        }
    }

    async fn load_role(&self, id: Uuid) -> RoleResult<Role> {
        self.store
            .get_role(id)
            .await?
            .ok_or_else(|| RoleError::NotFound(id.to_string()))
    }

    async fn load_user(&self, id: Uuid) -> RoleResult<User> {
        self.store
            .get_user(id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("user {id}")).into())
    }
}
