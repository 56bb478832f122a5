//! Group sync triggers and the membership debug read.

use axum::{
    extract::{Path, State},
    Json,
};
use idbridge_scim_client::GroupMembershipDebug;
use uuid::Uuid;

use crate::error::Result;
use crate::handlers::SyncState;
use crate::models::SyncResult;

/// POST /sync/groups/:id
///
/// Create the group remotely or reconcile its members.
pub async fn sync_group(
    State(state): State<SyncState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<SyncResult>> {
    let group = state.provisioner.sync_group(group_id).await?;
    Ok(Json(group.into()))
}

/// PATCH /sync/groups/:id/metadata
///
/// Push the display name only.
pub async fn patch_group_metadata(
    State(state): State<SyncState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<SyncResult>> {
    let group = state.provisioner.patch_group_metadata(group_id).await?;
    Ok(Json(group.into()))
}

/// POST /sync/groups/:id/members/:user_id
///
/// Add one member.
pub async fn add_group_member(
    State(state): State<SyncState>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SyncResult>> {
    let group = state
        .provisioner
        .sync_group_member(group_id, user_id)
        .await?;
    Ok(Json(group.into()))
}

/// DELETE /sync/groups/:id/members/:user_id
///
/// Remove one member.
pub async fn remove_group_member(
    State(state): State<SyncState>,
    Path((group_id, user_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<SyncResult>> {
    let group = state
        .provisioner
        .unsync_group_member(group_id, user_id)
        .await?;
    Ok(Json(group.into()))
}

/// GET /sync/groups/:id/debug
///
/// Local membership next to a fresh remote read.
///
/// Read-only on both sides.
pub async fn debug_group(
    State(state): State<SyncState>,
    Path(group_id): Path<Uuid>,
) -> Result<Json<GroupMembershipDebug>> {
    Ok(Json(
        state.provisioner.debug_group_membership(group_id).await?,
    ))
}
