//! HTTP handlers for the provisioning API.

pub mod bulk;
pub mod groups;
pub mod roles;
pub mod users;

pub use bulk::{cancel_bulk_sync, run_bulk_sync};
pub use groups::{
    add_group_member, debug_group, patch_group_metadata, remove_group_member, sync_group,
};
pub use roles::{bulk_upsert_mappings, list_external_values, sync_user_roles};
pub use users::{deactivate_user, delete_user, sync_user};

use idbridge_roles::RoleResolver;
use idbridge_scim_client::{BulkSyncer, Provisioner};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Shared state for provisioning handlers.
#[derive(Clone)]
pub struct SyncState {
    pub provisioner: Arc<Provisioner>,
    pub bulk: BulkSyncer,
    pub roles: RoleResolver,
    /// Cancellation handle of the bulk run in progress, if any.
    pub(crate) bulk_run: Arc<Mutex<Option<CancellationToken>>>,
}

impl SyncState {
    #[must_use]
    pub fn new(provisioner: Arc<Provisioner>, max_concurrency: usize) -> Self {
        Self {
            bulk: BulkSyncer::new(provisioner.clone(), max_concurrency),
            roles: RoleResolver::new(provisioner.store().clone()),
            provisioner,
            bulk_run: Arc::new(Mutex::new(None)),
        }
    }
}
