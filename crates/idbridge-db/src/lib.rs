//! Domain model and storage for the idbridge directory.
//!
//! The synchronization engine, role resolver and SAML engine all work against
//! the [`DirectoryStore`] trait. Every write that touches a single entity's
//! sync state is applied atomically, so a reader never observes a `synced`
//! status without the matching remote reference.

pub mod error;
pub mod models;
pub mod store;

pub use error::{DbError, DbResult};
pub use models::{
    Group, GroupChanges, NewGroup, NewRole, NewUser, Role, RoleChanges, ServiceProviderMetadata,
    SpEndpoint, SyncStatus, SyncTransition, User, UserChanges,
};
pub use store::{DirectoryStore, InMemoryStore};
