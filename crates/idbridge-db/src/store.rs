//! Directory storage.
//!
//! [`DirectoryStore`] is the transactional seam the engines depend on.
//! [`InMemoryStore`] keeps every table behind one `RwLock`, so each trait
//! method is a single atomic write.

use crate::error::{DbError, DbResult};
use crate::models::{
    Group, GroupChanges, NewGroup, NewRole, NewUser, Role, RoleChanges, ServiceProviderMetadata,
    SyncStatus, SyncTransition, User, UserChanges,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Storage trait for users, groups, roles and SP metadata.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    // ── Users ─────────────────────────────────────────────────────────

    /// Insert a new user in `pending` status. Emails are unique (case-insensitive).
    async fn insert_user(&self, new: NewUser) -> DbResult<User>;

    async fn get_user(&self, id: Uuid) -> DbResult<Option<User>>;

    /// Case-insensitive lookup by email.
    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>>;

    async fn list_users(&self) -> DbResult<Vec<User>>;

    /// Update directory attributes. Resets status to `pending` when a synced
    /// attribute actually changed.
    async fn update_user(&self, id: Uuid, changes: UserChanges) -> DbResult<User>;

    /// Remove the user and drop it from every group.
    async fn delete_user(&self, id: Uuid) -> DbResult<()>;

    /// Apply a sync transition atomically.
    async fn apply_user_sync(&self, id: Uuid, transition: SyncTransition) -> DbResult<User>;

    /// Replace the user's role assignments.
    async fn set_user_roles(&self, id: Uuid, role_ids: BTreeSet<Uuid>) -> DbResult<User>;

    // ── Groups ────────────────────────────────────────────────────────

    async fn insert_group(&self, new: NewGroup) -> DbResult<Group>;

    async fn get_group(&self, id: Uuid) -> DbResult<Option<Group>>;

    async fn list_groups(&self) -> DbResult<Vec<Group>>;

    async fn update_group(&self, id: Uuid, changes: GroupChanges) -> DbResult<Group>;

    async fn delete_group(&self, id: Uuid) -> DbResult<()>;

    /// Add a member; a no-op if already present.
    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<Group>;

    /// Remove a member; a no-op if absent.
    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<Group>;

    async fn apply_group_sync(&self, id: Uuid, transition: SyncTransition) -> DbResult<Group>;

    // ── Roles ─────────────────────────────────────────────────────────

    /// Insert a role. Names and external values are unique.
    async fn insert_role(&self, new: NewRole) -> DbResult<Role>;

    async fn get_role(&self, id: Uuid) -> DbResult<Option<Role>>;

    async fn get_role_by_name(&self, name: &str) -> DbResult<Option<Role>>;

    async fn list_roles(&self) -> DbResult<Vec<Role>>;

    async fn update_role(&self, id: Uuid, changes: RoleChanges) -> DbResult<Role>;

    /// Delete a role. Rejected while any user still holds it.
    async fn delete_role(&self, id: Uuid) -> DbResult<()>;

    /// Users currently assigned the role.
    async fn users_with_role(&self, role_id: Uuid) -> DbResult<Vec<User>>;

    // ── Service Provider metadata ─────────────────────────────────────

    /// Insert or replace in place, keyed by entity ID.
    async fn upsert_sp_metadata(
        &self,
        metadata: ServiceProviderMetadata,
    ) -> DbResult<ServiceProviderMetadata>;

    async fn get_sp_metadata(&self, entity_id: &str) -> DbResult<Option<ServiceProviderMetadata>>;

    async fn list_sp_metadata(&self) -> DbResult<Vec<ServiceProviderMetadata>>;

    /// Returns `true` if a record was removed.
    async fn delete_sp_metadata(&self, entity_id: &str) -> DbResult<bool>;
}

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    groups: HashMap<Uuid, Group>,
    roles: HashMap<Uuid, Role>,
    sp_metadata: HashMap<String, ServiceProviderMetadata>,
}

impl Tables {
    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        let key = email.trim().to_lowercase();
        self.users
            .values()
            .any(|u| Some(u.id) != except && u.email_key() == key)
    }

    fn role_name_taken(&self, name: &str, except: Option<Uuid>) -> bool {
        self.roles
            .values()
            .any(|r| Some(r.id) != except && r.name == name)
    }

    fn external_value_taken(&self, value: &str, except: Option<Uuid>) -> bool {
        self.roles
            .values()
            .any(|r| Some(r.id) != except && r.external_value.as_deref() == Some(value))
    }
}

/// In-memory directory store.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_email(email: &str) -> DbResult<()> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(DbError::Validation(format!("invalid email address: {email}"))),
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn insert_user(&self, new: NewUser) -> DbResult<User> {
        validate_email(&new.email)?;
        if new.username.trim().is_empty() {
            return Err(DbError::Validation("username must not be empty".to_string()));
        }

        let mut tables = self.tables.write().await;
        if tables.email_taken(&new.email, None) {
            return Err(DbError::Conflict(format!(
                "user with email {} already exists",
                new.email
            )));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: new.username,
            email: new.email.trim().to_string(),
            first_name: new.first_name,
            last_name: new.last_name,
            title: new.title,
            active: new.active,
            remote_id: None,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            sync_error: None,
            last_synced_hash: None,
            role_ids: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> DbResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<User>> {
        let key = email.trim().to_lowercase();
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email_key() == key).cloned())
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        let tables = self.tables.read().await;
        let mut users: Vec<User> = tables.users.values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, changes: UserChanges) -> DbResult<User> {
        if let Some(email) = &changes.email {
            validate_email(email)?;
        }

        let mut tables = self.tables.write().await;
        if let Some(email) = &changes.email {
            if tables.email_taken(email, Some(id)) {
                return Err(DbError::Conflict(format!(
                    "user with email {email} already exists"
                )));
            }
        }

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
        let now = Utc::now();
        if changes.apply(user) {
            user.sync_status = SyncStatus::Pending;
        }
        user.updated_at = now;
        Ok(user.clone())
    }

    async fn delete_user(&self, id: Uuid) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if tables.users.remove(&id).is_none() {
            return Err(DbError::NotFound(format!("user {id}")));
        }
        let now = Utc::now();
        for group in tables.groups.values_mut() {
            if group.member_ids.remove(&id) {
                group.touch(now);
            }
        }
        Ok(())
    }

    async fn apply_user_sync(&self, id: Uuid, transition: SyncTransition) -> DbResult<User> {
        transition.validate()?;
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
        user.apply_transition(transition, Utc::now());
        Ok(user.clone())
    }

    async fn set_user_roles(&self, id: Uuid, role_ids: BTreeSet<Uuid>) -> DbResult<User> {
        let mut tables = self.tables.write().await;
        if let Some(missing) = role_ids.iter().find(|r| !tables.roles.contains_key(r)) {
            return Err(DbError::NotFound(format!("role {missing}")));
        }
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("user {id}")))?;
        user.role_ids = role_ids;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn insert_group(&self, new: NewGroup) -> DbResult<Group> {
        if new.display_name.trim().is_empty() {
            return Err(DbError::Validation(
                "group display name must not be empty".to_string(),
            ));
        }
        let mut tables = self.tables.write().await;
        if let Some(missing) = new.member_ids.iter().find(|m| !tables.users.contains_key(m)) {
            return Err(DbError::NotFound(format!("user {missing}")));
        }
        let now = Utc::now();
        let group = Group {
            id: Uuid::new_v4(),
            display_name: new.display_name,
            description: new.description,
            remote_id: None,
            sync_status: SyncStatus::Pending,
            last_synced_at: None,
            sync_error: None,
            member_ids: new.member_ids,
            created_at: now,
            updated_at: now,
        };
        tables.groups.insert(group.id, group.clone());
        Ok(group)
    }

    async fn get_group(&self, id: Uuid) -> DbResult<Option<Group>> {
        Ok(self.tables.read().await.groups.get(&id).cloned())
    }

    async fn list_groups(&self) -> DbResult<Vec<Group>> {
        let tables = self.tables.read().await;
        let mut groups: Vec<Group> = tables.groups.values().cloned().collect();
        groups.sort_by_key(|g| g.created_at);
        Ok(groups)
    }

    async fn update_group(&self, id: Uuid, changes: GroupChanges) -> DbResult<Group> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("group {id}")))?;
        let now = Utc::now();
        if changes.apply(group) {
            group.touch(now);
        }
        Ok(group.clone())
    }

    async fn delete_group(&self, id: Uuid) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .groups
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| DbError::NotFound(format!("group {id}")))
    }

    async fn add_group_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<Group> {
        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&user_id) {
            return Err(DbError::NotFound(format!("user {user_id}")));
        }
        let group = tables
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| DbError::NotFound(format!("group {group_id}")))?;
        if group.member_ids.insert(user_id) {
            group.touch(Utc::now());
        }
        Ok(group.clone())
    }

    async fn remove_group_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<Group> {
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(&group_id)
            .ok_or_else(|| DbError::NotFound(format!("group {group_id}")))?;
        if group.member_ids.remove(&user_id) {
            group.touch(Utc::now());
        }
        Ok(group.clone())
    }

    async fn apply_group_sync(&self, id: Uuid, transition: SyncTransition) -> DbResult<Group> {
        transition.validate()?;
        let mut tables = self.tables.write().await;
        let group = tables
            .groups
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("group {id}")))?;
        group.apply_transition(transition, Utc::now());
        Ok(group.clone())
    }

    async fn insert_role(&self, new: NewRole) -> DbResult<Role> {
        if new.name.trim().is_empty() {
            return Err(DbError::Validation("role name must not be empty".to_string()));
        }
        let mut tables = self.tables.write().await;
        if tables.role_name_taken(&new.name, None) {
            return Err(DbError::Conflict(format!("role {} already exists", new.name)));
        }
        if let Some(value) = new.external_value.as_deref() {
            if tables.external_value_taken(value, None) {
                return Err(DbError::Conflict(format!(
                    "external role value {value} is already mapped"
                )));
            }
        }
        let now = Utc::now();
        let role = Role {
            id: Uuid::new_v4(),
            name: new.name,
            description: new.description,
            external_value: new.external_value,
            active: new.active,
            is_default: new.is_default,
            created_at: now,
            updated_at: now,
        };
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn get_role(&self, id: Uuid) -> DbResult<Option<Role>> {
        Ok(self.tables.read().await.roles.get(&id).cloned())
    }

    async fn get_role_by_name(&self, name: &str) -> DbResult<Option<Role>> {
        let tables = self.tables.read().await;
        Ok(tables.roles.values().find(|r| r.name == name).cloned())
    }

    async fn list_roles(&self) -> DbResult<Vec<Role>> {
        let tables = self.tables.read().await;
        let mut roles: Vec<Role> = tables.roles.values().cloned().collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn update_role(&self, id: Uuid, changes: RoleChanges) -> DbResult<Role> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &changes.name {
            if tables.role_name_taken(name, Some(id)) {
                return Err(DbError::Conflict(format!("role {name} already exists")));
            }
        }
        if let Some(Some(value)) = &changes.external_value {
            if tables.external_value_taken(value, Some(id)) {
                return Err(DbError::Conflict(format!(
                    "external role value {value} is already mapped"
                )));
            }
        }
        let role = tables
            .roles
            .get_mut(&id)
            .ok_or_else(|| DbError::NotFound(format!("role {id}")))?;
        changes.apply(role);
        role.updated_at = Utc::now();
        Ok(role.clone())
    }

    async fn delete_role(&self, id: Uuid) -> DbResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.roles.contains_key(&id) {
            return Err(DbError::NotFound(format!("role {id}")));
        }
        let assigned = tables
            .users
            .values()
            .filter(|u| u.role_ids.contains(&id))
            .count();
        if assigned > 0 {
            return Err(DbError::ReferentialIntegrity(format!(
                "role {id} is assigned to {assigned} user(s)"
            )));
        }
        tables.roles.remove(&id);
        Ok(())
    }

    async fn users_with_role(&self, role_id: Uuid) -> DbResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| u.role_ids.contains(&role_id))
            .cloned()
            .collect())
    }

    async fn upsert_sp_metadata(
        &self,
        metadata: ServiceProviderMetadata,
    ) -> DbResult<ServiceProviderMetadata> {
        let mut tables = self.tables.write().await;
        tables
            .sp_metadata
            .insert(metadata.entity_id.clone(), metadata.clone());
        Ok(metadata)
    }

    async fn get_sp_metadata(&self, entity_id: &str) -> DbResult<Option<ServiceProviderMetadata>> {
        Ok(self.tables.read().await.sp_metadata.get(entity_id).cloned())
    }

    async fn list_sp_metadata(&self) -> DbResult<Vec<ServiceProviderMetadata>> {
        let tables = self.tables.read().await;
        let mut records: Vec<ServiceProviderMetadata> =
            tables.sp_metadata.values().cloned().collect();
        records.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
        Ok(records)
    }

    async fn delete_sp_metadata(&self, entity_id: &str) -> DbResult<bool> {
        Ok(self
            .tables
            .write()
            .await
            .sp_metadata
            .remove(entity_id)
            .is_some())
    }
}
