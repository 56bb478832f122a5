//! Provisioning HTTP surface.
//!
//! Thin axum layer over the sync engine and role resolver. Entity triggers
//! answer with the entity's sync status and error string; a failed remote
//! push is a normal `200` carrying `failed`, not an HTTP error.

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;

pub use error::{Result, SyncApiError};
pub use handlers::SyncState;
pub use models::{BulkSyncRequest, BulkSyncResponse, SyncResult};
pub use router::sync_router;
