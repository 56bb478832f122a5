//! Provisioning route definitions

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::handlers::{self, SyncState};

/// Sync triggers, bulk sync and role mapping administration.
pub fn sync_router(state: SyncState) -> Router {
    Router::new()
        // Users
        .route(
            "/sync/users/:id",
            post(handlers::sync_user).delete(handlers::delete_user),
        )
        .route("/sync/users/:id/deactivate", post(handlers::deactivate_user))
        // Groups
        .route("/sync/groups/:id", post(handlers::sync_group))
        .route(
            "/sync/groups/:id/metadata",
            patch(handlers::patch_group_metadata),
        )
        .route(
            "/sync/groups/:id/members/:user_id",
            post(handlers::add_group_member).delete(handlers::remove_group_member),
        )
        .route("/sync/groups/:id/debug", get(handlers::debug_group))
        // Bulk
        .route("/sync/bulk", post(handlers::run_bulk_sync))
        .route("/sync/bulk/cancel", post(handlers::cancel_bulk_sync))
        // Roles
        .route(
            "/roles/mappings/bulk",
            post(handlers::bulk_upsert_mappings),
        )
        .route("/roles/external-values", get(handlers::list_external_values))
        .route("/users/:id/roles/sync", post(handlers::sync_user_roles))
        .with_state(state)
}
