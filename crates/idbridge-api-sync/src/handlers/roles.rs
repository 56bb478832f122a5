//! Role mapping administration.

use axum::{
    extract::{Path, State},
    Json,
};
use idbridge_roles::{BulkMappingReport, UserRoleSync};
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

use crate::error::Result;
use crate::handlers::SyncState;
use crate::models::{BulkMappingsRequest, ExternalRoleValues};

/// POST /roles/mappings/bulk
///
/// Create or update roles keyed by external value.
///
/// Entries fail independently and are listed under `errors`.
pub async fn bulk_upsert_mappings(
    State(state): State<SyncState>,
    Json(request): Json<BulkMappingsRequest>,
) -> Result<Json<BulkMappingReport>> {
    request.validate()?;
    Ok(Json(state.roles.bulk_upsert_mappings(request.mappings).await))
}

/// GET /roles/external-values
///
/// Distinct mapped values, sorted.
pub async fn list_external_values(State(state): State<SyncState>) -> Result<Json<Vec<String>>> {
    Ok(Json(state.roles.list_external_values().await?))
}

/// POST /users/:id/roles/sync
///
/// Replace the user's roles from upstream values.
pub async fn sync_user_roles(
    State(state): State<SyncState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ExternalRoleValues>,
) -> Result<Json<UserRoleSync>> {
    request.validate()?;
    let values: BTreeSet<String> = request
        .values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    Ok(Json(state.roles.sync_user_roles(user_id, &values).await?))
}
