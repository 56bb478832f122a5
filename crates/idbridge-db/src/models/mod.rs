//! Directory domain models.

mod group;
mod role;
mod service_provider;
mod sync_status;
mod user;

pub use group::{Group, GroupChanges, NewGroup};
pub use role::{NewRole, Role, RoleChanges};
pub use service_provider::{ServiceProviderMetadata, SpEndpoint};
pub use sync_status::{SyncStatus, SyncTransition};
pub use user::{NewUser, User, UserChanges};
