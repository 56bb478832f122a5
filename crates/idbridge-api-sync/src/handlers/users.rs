//! User sync triggers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::error::Result;
use crate::handlers::SyncState;
use crate::models::SyncResult;

/// POST /sync/users/:id
///
/// Create or update the user remotely.
///
/// A remote failure is reported in the body as `failed` status, not as an
/// HTTP error.
pub async fn sync_user(
    State(state): State<SyncState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SyncResult>> {
    let user = state.provisioner.sync_user(user_id).await?;
    Ok(Json(user.into()))
}

/// POST /sync/users/:id/deactivate
///
/// Lock the user out remotely.
pub async fn deactivate_user(
    State(state): State<SyncState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<SyncResult>> {
    let user = state.provisioner.deactivate_user(user_id).await?;
    Ok(Json(user.into()))
}

/// DELETE /sync/users/:id
///
/// Deactivate remotely, then delete locally.
///
/// Returns 502 and keeps the local user when the remote deactivation fails.
pub async fn delete_user(
    State(state): State<SyncState>,
    Path(user_id): Path<Uuid>,
) -> Result<StatusCode> {
    state.provisioner.delete_user(user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
