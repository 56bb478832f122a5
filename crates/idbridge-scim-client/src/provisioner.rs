//! User and group synchronization engine.
//!
//! Each operation brings one local entity to `synced`, or records precisely
//! why not. Remote failures are persisted on the entity through
//! [`SyncTransition`]s and returned as the updated record; only local store
//! failures surface as `Err`.

use crate::client::{MemberPatchOutcome, ScimClient};
use crate::diff::MembershipDiff;
use crate::error::{ScimClientError, ScimClientResult};
use crate::locks::EntityLocks;
use crate::mapper::AttributeMapper;
use crate::models::{PatchOperation, PatchRequest, ScimUser};
use async_trait::async_trait;
use idbridge_db::{
    DbError, DirectoryStore, Group, SyncStatus, SyncTransition, User, UserChanges,
};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Narrow seam used by callers that only need to push a user (JIT login).
#[async_trait]
pub trait UserSync: Send + Sync {
    /// Sync one user and return its updated record.
    async fn sync_user(&self, user_id: Uuid) -> ScimClientResult<User>;
}

/// Local member as seen by the debug read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct LocalMember {
    pub user_id: Uuid,
    pub email: String,
    pub remote_id: Option<String>,
}

/// Remote member as returned by the remote directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RemoteMember {
    pub value: String,
    pub display: Option<String>,
}

/// Side-by-side view of local and remote membership. Never mutates either side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct GroupMembershipDebug {
    pub group_id: Uuid,
    pub remote_id: Option<String>,
    pub local_members: Vec<LocalMember>,
    pub remote_members: Vec<RemoteMember>,
    /// Remote ids of local members absent from the remote group.
    pub missing_remotely: Vec<String>,
    /// Remote members with no local counterpart.
    pub extra_remotely: Vec<String>,
}

/// Orchestrates remote provisioning for users and groups.
///
/// Every single-entity operation holds that entity's lock for its whole
/// duration. Group operations that cascade into a user sync take the user
/// lock inside the group lock, never the reverse.
#[derive(Clone)]
pub struct Provisioner {
    store: Arc<dyn DirectoryStore>,
    client: ScimClient,
    locks: EntityLocks,
}

impl Provisioner {
    #[must_use]
    pub fn new(store: Arc<dyn DirectoryStore>, client: ScimClient) -> Self {
        Self {
            store,
            client,
            locks: EntityLocks::new(),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn DirectoryStore> {
        &self.store
    }

    #[must_use]
    pub fn client(&self) -> &ScimClient {
        &self.client
    }

    // ── Users ─────────────────────────────────────────────────────────

    /// Create or update the user remotely.
    ///
    /// A synced user whose payload fingerprint is unchanged makes no remote call.
    pub async fn sync_user(&self, user_id: Uuid) -> ScimClientResult<User> {
        let _guard = self.locks.lock_user(user_id).await;
        let user = self.load_user(user_id).await?;
        self.sync_user_locked(user).await
    }

    /// Set `active=false` remotely and locally.
    ///
    /// A user never pushed remotely is only deactivated locally. A remote
    /// failure is recorded with the `deactivation_failed` class.
    pub async fn deactivate_user(&self, user_id: Uuid) -> ScimClientResult<User> {
        let _guard = self.locks.lock_user(user_id).await;
        let user = self.load_user(user_id).await?;

        let Some(remote_id) = user.remote_id.clone() else {
            debug!(user_id = %user_id, "User has no remote reference, deactivating locally only");
            return Ok(self
                .store
                .update_user(
                    user_id,
                    UserChanges {
                        active: Some(false),
                        ..Default::default()
                    },
                )
                .await?);
        };

        match self.client.deactivate_user(&remote_id).await {
            Ok(()) => {
                let user = self
                    .store
                    .apply_user_sync(user_id, SyncTransition::Deactivated { remote_id })
                    .await?;
                info!(user_id = %user_id, "User deactivated");
                Ok(user)
            }
            Err(e) => self.fail_user(user_id, &e).await,
        }
    }

    /// Lifecycle delete: deactivate remotely, then remove locally.
    ///
    /// If the remote deactivation fails the local user is kept in `failed`
    /// status and the error is returned.
    pub async fn delete_user(&self, user_id: Uuid) -> ScimClientResult<()> {
        let _guard = self.locks.lock_user(user_id).await;
        let user = self.load_user(user_id).await?;

        if let Some(remote_id) = user.remote_id.clone() {
            if let Err(e) = self.client.deactivate_user(&remote_id).await {
                error!(user_id = %user_id, remote_id = %remote_id, error = %e, "Remote deactivation failed, keeping local user");
                self.fail_user(user_id, &e).await?;
                return Err(e);
            }
        }

        self.store.delete_user(user_id).await?;
        info!(user_id = %user_id, remote_id = ?user.remote_id, "User deleted");
        Ok(())
    }

    async fn sync_user_locked(&self, user: User) -> ScimClientResult<User> {
        let fingerprint = AttributeMapper::user_fingerprint(&user);

        match user.remote_id.clone() {
            Some(remote_id)
                if user.sync_status == SyncStatus::Synced
                    && user.last_synced_hash.as_deref() == Some(fingerprint.as_str()) =>
            {
                debug!(user_id = %user.id, remote_id = %remote_id, "User unchanged since last sync, skipping");
                Ok(user)
            }
            Some(remote_id) => self.update_remote_user(&user, remote_id, fingerprint).await,
            None => self.create_remote_user(&user, fingerprint).await,
        }
    }

    async fn create_remote_user(&self, user: &User, fingerprint: String) -> ScimClientResult<User> {
        let request = AttributeMapper::user_to_create_request(user);

        match self.client.create_user(&request).await {
            Ok(created) => match created.id {
                Some(remote_id) => {
                    let synced = self
                        .store
                        .apply_user_sync(
                            user.id,
                            SyncTransition::Synced {
                                remote_id: remote_id.clone(),
                                fingerprint: Some(fingerprint),
                            },
                        )
                        .await?;
                    info!(user_id = %user.id, remote_id = %remote_id, "User created remotely");
                    Ok(synced)
                }
                None => {
                    let e = ScimClientError::ParseError(
                        "create response carried no user id".to_string(),
                    );
                    self.fail_user(user.id, &e).await
                }
            },
            Err(ScimClientError::Conflict(_)) => {
                warn!(user_id = %user.id, "User create conflict (409), looking up by email");
                match self.client.find_user_by_email(&user.email).await {
                    Ok(Some(found)) => match found.id {
                        Some(remote_id) => {
                            info!(user_id = %user.id, remote_id = %remote_id, "Linked existing remote user after conflict");
                            self.update_remote_user(user, remote_id, fingerprint).await
                        }
                        None => {
                            let e = ScimClientError::ConflictNotDiscoverable(user.email.clone());
                            self.fail_user(user.id, &e).await
                        }
                    },
                    Ok(None) => {
                        let e = ScimClientError::ConflictNotDiscoverable(user.email.clone());
                        self.fail_user(user.id, &e).await
                    }
                    Err(e) => self.fail_user(user.id, &e).await,
                }
            }
            Err(e) if e.is_retryable() || e.is_server_error() => {
                // The create may have landed before the failure; look before
                // leaving it for a later retry.
                warn!(user_id = %user.id, error = %e, "User create failed transiently, checking remote");
                match self.client.find_user_by_email(&user.email).await {
                    Ok(Some(ScimUser {
                        id: Some(remote_id), ..
                    })) => {
                        info!(user_id = %user.id, remote_id = %remote_id, "Create had landed remotely, linking");
                        self.update_remote_user(user, remote_id, fingerprint).await
                    }
                    _ => self.fail_user(user.id, &e).await,
                }
            }
            Err(e) => self.fail_user(user.id, &e).await,
        }
    }

    async fn update_remote_user(
        &self,
        user: &User,
        remote_id: String,
        fingerprint: String,
    ) -> ScimClientResult<User> {
        let patch = AttributeMapper::user_to_patch(user);
        match self.client.update_user(&remote_id, &patch).await {
            Ok(_) => {
                let synced = self
                    .store
                    .apply_user_sync(
                        user.id,
                        SyncTransition::Synced {
                            remote_id: remote_id.clone(),
                            fingerprint: Some(fingerprint),
                        },
                    )
                    .await?;
                info!(user_id = %user.id, remote_id = %remote_id, "User updated remotely");
                Ok(synced)
            }
            // An existing reference is kept; a reference only just found
            // after a conflict is not stored until an update succeeds.
            Err(e) => self.fail_user(user.id, &e).await,
        }
    }

    async fn fail_user(&self, user_id: Uuid, e: &ScimClientError) -> ScimClientResult<User> {
        error!(user_id = %user_id, class = e.class(), error = %e, "User sync failed");
        Ok(self
            .store
            .apply_user_sync(
                user_id,
                SyncTransition::Failed {
                    error: e.status_message(),
                },
            )
            .await?)
    }

    async fn load_user(&self, user_id: Uuid) -> ScimClientResult<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("user {user_id}")).into())
    }

    // ── Groups ────────────────────────────────────────────────────────

    /// Create the group remotely, or reconcile its membership incrementally.
    pub async fn sync_group(&self, group_id: Uuid) -> ScimClientResult<Group> {
        let _guard = self.locks.lock_group(group_id).await;
        let group = self.load_group(group_id).await?;
        self.sync_group_locked(group).await
    }

    async fn sync_group_locked(&self, group: Group) -> ScimClientResult<Group> {
        let (members, mut problems) = self.resolve_remote_members(&group).await?;

        let Some(remote_id) = group.remote_id.clone() else {
            return self.create_remote_group(&group, &members, problems).await;
        };

        // Metadata first: a failure here fails the whole group.
        if group.sync_status != SyncStatus::Synced {
            let metadata = AttributeMapper::group_metadata(&group, &remote_id);
            if let Err(e) = self.client.patch_group_metadata(&remote_id, metadata).await {
                return self.fail_group(group.id, &e).await;
            }
        }

        // Current membership is always read fresh from the remote.
        let remote_group = match self.client.get_group(&remote_id).await {
            Ok(g) => g,
            Err(e) => return self.fail_group(group.id, &e).await,
        };
        let current: BTreeSet<String> = remote_group.members.into_iter().map(|m| m.value).collect();
        let desired: BTreeSet<String> = members.iter().map(|(rid, _)| rid.clone()).collect();
        let diff = MembershipDiff::compute(&current, &desired);

        if !diff.is_empty() {
            debug!(
                group_id = %group.id,
                to_add = diff.to_add.len(),
                to_remove = diff.to_remove.len(),
                "Applying membership diff"
            );
            let full = AttributeMapper::group_to_request(&group, self.client.base_url(), &members);

            let mut replaced = false;
            if !diff.to_remove.is_empty() {
                let patch = PatchRequest::new(
                    diff.to_remove
                        .iter()
                        .map(|rid| PatchOperation::remove_member(rid))
                        .collect(),
                );
                match self
                    .client
                    .patch_group_members_with_fallback(&remote_id, &patch, &full)
                    .await
                {
                    Ok(MemberPatchOutcome::Replaced) => replaced = true,
                    Ok(MemberPatchOutcome::Patched) => {}
                    Err(e) => problems.push(format!(
                        "remove {}: {}",
                        diff.to_remove.join(", "),
                        e.status_message()
                    )),
                }
            }

            if !replaced && !diff.to_add.is_empty() {
                let patch =
                    PatchRequest::new(vec![PatchOperation::add_members(diff.to_add.iter().cloned())]);
                if let Err(e) = self
                    .client
                    .patch_group_members_with_fallback(&remote_id, &patch, &full)
                    .await
                {
                    problems.push(format!(
                        "add {}: {}",
                        diff.to_add.join(", "),
                        e.status_message()
                    ));
                }
            }
        }

        self.finish_group(group.id, remote_id, problems).await
    }

    async fn create_remote_group(
        &self,
        group: &Group,
        members: &[(String, String)],
        problems: Vec<String>,
    ) -> ScimClientResult<Group> {
        let request = AttributeMapper::group_to_request(group, self.client.base_url(), members);
        match self.client.create_group(&request).await {
            Ok(created) => match created.id {
                Some(remote_id) => {
                    info!(
                        group_id = %group.id,
                        remote_id = %remote_id,
                        members = members.len(),
                        "Group created remotely"
                    );
                    self.finish_group(group.id, remote_id, problems).await
                }
                None => {
                    let e = ScimClientError::ParseError(
                        "create response carried no group id".to_string(),
                    );
                    self.fail_group(group.id, &e).await
                }
            },
            Err(e) => self.fail_group(group.id, &e).await,
        }
    }

    /// Remote `(id, display)` of every member, cascading a user sync for
    /// members not yet pushed. Members that still lack a remote reference are
    /// excluded and reported.
    async fn resolve_remote_members(
        &self,
        group: &Group,
    ) -> ScimClientResult<(Vec<(String, String)>, Vec<String>)> {
        let mut members = Vec::new();
        let mut problems = Vec::new();

        for user_id in &group.member_ids {
            let Some(mut user) = self.store.get_user(*user_id).await? else {
                continue;
            };
            if user.remote_id.is_none() {
                let _user_guard = self.locks.lock_user(*user_id).await;
                // A concurrent sync may have pushed the user while we waited.
                let Some(current) = self.store.get_user(*user_id).await? else {
                    continue;
                };
                user = if current.remote_id.is_none() {
                    debug!(group_id = %group.id, user_id = %user_id, "Syncing member before group");
                    self.sync_user_locked(current).await?
                } else {
                    current
                };
            }
            match &user.remote_id {
                Some(rid) => members.push((rid.clone(), user.formatted_name())),
                None => {
                    let reason = user
                        .sync_error
                        .clone()
                        .unwrap_or_else(|| "not synced".to_string());
                    warn!(group_id = %group.id, user_id = %user_id, "Excluding unsynced member from group");
                    problems.push(format!("member {} excluded: {}", user.email, reason));
                }
            }
        }

        Ok((members, problems))
    }

    async fn finish_group(
        &self,
        group_id: Uuid,
        remote_id: String,
        problems: Vec<String>,
    ) -> ScimClientResult<Group> {
        let transition = if problems.is_empty() {
            SyncTransition::Synced {
                remote_id,
                fingerprint: None,
            }
        } else {
            warn!(group_id = %group_id, problems = problems.len(), "Group partially synced");
            SyncTransition::Warning {
                remote_id,
                error: problems.join("; "),
            }
        };
        Ok(self.store.apply_group_sync(group_id, transition).await?)
    }

    async fn fail_group(&self, group_id: Uuid, e: &ScimClientError) -> ScimClientResult<Group> {
        error!(group_id = %group_id, class = e.class(), error = %e, "Group sync failed");
        Ok(self
            .store
            .apply_group_sync(
                group_id,
                SyncTransition::Failed {
                    error: e.status_message(),
                },
            )
            .await?)
    }

    async fn load_group(&self, group_id: Uuid) -> ScimClientResult<Group> {
        self.store
            .get_group(group_id)
            .await?
            .ok_or_else(|| DbError::NotFound(format!("group {group_id}")).into())
    }

    /// Add one member locally and remotely.
    ///
    /// The user is synced first when it has no remote reference. If the
    /// group itself was never pushed, the whole group is synced instead.
    pub async fn sync_group_member(&self, group_id: Uuid, user_id: Uuid) -> ScimClientResult<Group> {
        let _group_guard = self.locks.lock_group(group_id).await;
        let before = self.load_group(group_id).await?;
        let group = self.store.add_group_member(group_id, user_id).await?;

        let Some(group_remote_id) = group.remote_id.clone() else {
            return self.sync_group_locked(group).await;
        };

        let user = {
            let _user_guard = self.locks.lock_user(user_id).await;
            let user = self.load_user(user_id).await?;
            if user.remote_id.is_none() {
                self.sync_user_locked(user).await?
            } else {
                user
            }
        };

        let Some(user_remote_id) = user.remote_id.clone() else {
            let reason = user.sync_error.unwrap_or_else(|| "not synced".to_string());
            return self
                .finish_group(
                    group_id,
                    group_remote_id,
                    vec![format!("member {} excluded: {}", user.email, reason)],
                )
                .await;
        };

        match self
            .client
            .add_group_members(&group_remote_id, &[user_remote_id.clone()])
            .await
        {
            Ok(()) => {
                info!(group_id = %group_id, user_id = %user_id, remote_id = %user_remote_id, "Member added remotely");
                self.settle_member_change(&before, group_remote_id).await
            }
            Err(e) => {
                self.finish_group(
                    group_id,
                    group_remote_id,
                    vec![format!("add {}: {}", user_remote_id, e.status_message())],
                )
                .await
            }
        }
    }

    /// Remove one member locally and remotely.
    pub async fn unsync_group_member(
        &self,
        group_id: Uuid,
        user_id: Uuid,
    ) -> ScimClientResult<Group> {
        let _group_guard = self.locks.lock_group(group_id).await;
        let before = self.load_group(group_id).await?;
        let group = self.store.remove_group_member(group_id, user_id).await?;

        let Some(group_remote_id) = group.remote_id.clone() else {
            return Ok(group);
        };
        let user_remote_id = self
            .store
            .get_user(user_id)
            .await?
            .and_then(|u| u.remote_id);
        let Some(user_remote_id) = user_remote_id else {
            // Never pushed, so nothing to remove remotely.
            return self.settle_member_change(&before, group_remote_id).await;
        };

        match self
            .client
            .remove_group_members(&group_remote_id, &[user_remote_id.clone()])
            .await
        {
            Ok(()) => {
                info!(group_id = %group_id, user_id = %user_id, remote_id = %user_remote_id, "Member removed remotely");
                self.settle_member_change(&before, group_remote_id).await
            }
            Err(e) => {
                self.finish_group(
                    group_id,
                    group_remote_id,
                    vec![format!("remove {}: {}", user_remote_id, e.status_message())],
                )
                .await
            }
        }
    }

    /// After a successful single-member change the group is synced again,
    /// unless it already had other unpushed changes.
    async fn settle_member_change(
        &self,
        before: &Group,
        remote_id: String,
    ) -> ScimClientResult<Group> {
        if before.sync_status == SyncStatus::Synced {
            self.finish_group(before.id, remote_id, Vec::new()).await
        } else {
            self.load_group(before.id).await
        }
    }

    /// Push the group's display name only. Membership is left untouched.
    pub async fn patch_group_metadata(&self, group_id: Uuid) -> ScimClientResult<Group> {
        let _guard = self.locks.lock_group(group_id).await;
        let group = self.load_group(group_id).await?;

        let Some(remote_id) = group.remote_id.clone() else {
            return self.sync_group_locked(group).await;
        };

        let metadata = AttributeMapper::group_metadata(&group, &remote_id);
        match self.client.patch_group_metadata(&remote_id, metadata).await {
            Ok(()) => {
                info!(group_id = %group_id, remote_id = %remote_id, "Group metadata patched");
                self.finish_group(group_id, remote_id, Vec::new()).await
            }
            Err(e) => self.fail_group(group_id, &e).await,
        }
    }

    /// Compare local membership with a fresh read of the remote group.
    pub async fn debug_group_membership(
        &self,
        group_id: Uuid,
    ) -> ScimClientResult<GroupMembershipDebug> {
        let group = self.load_group(group_id).await?;

        let mut local_members = Vec::with_capacity(group.member_ids.len());
        for user_id in &group.member_ids {
            if let Some(user) = self.store.get_user(*user_id).await? {
                local_members.push(LocalMember {
                    user_id: user.id,
                    email: user.email,
                    remote_id: user.remote_id,
                });
            }
        }

        let remote_members: Vec<RemoteMember> = match &group.remote_id {
            Some(rid) => self
                .client
                .get_group(rid)
                .await?
                .members
                .into_iter()
                .map(|m| RemoteMember {
                    value: m.value,
                    display: m.display,
                })
                .collect(),
            None => Vec::new(),
        };

        let local_ids: BTreeSet<String> = local_members
            .iter()
            .filter_map(|m| m.remote_id.clone())
            .collect();
        let remote_ids: BTreeSet<String> = remote_members.iter().map(|m| m.value.clone()).collect();
        let diff = MembershipDiff::compute(&remote_ids, &local_ids);

        Ok(GroupMembershipDebug {
            group_id,
            remote_id: group.remote_id,
            local_members,
            remote_members,
            missing_remotely: diff.to_add,
            extra_remotely: diff.to_remove,
        })
    }
}

#[async_trait]
impl UserSync for Provisioner {
    async fn sync_user(&self, user_id: Uuid) -> ScimClientResult<User> {
        Provisioner::sync_user(self, user_id).await
    }
}
