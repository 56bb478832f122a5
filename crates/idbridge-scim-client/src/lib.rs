//! Remote directory client and synchronization engine.
//!
//! [`client::ScimClient`] speaks the remote `/Users` and `/Groups` API.
//! [`provisioner::Provisioner`] reconciles local users and groups against it,
//! and [`bulk::BulkSyncer`] runs it across every entity that needs a sync.

pub mod auth;
pub mod bulk;
pub mod client;
pub mod diff;
pub mod error;
pub mod locks;
pub mod mapper;
pub mod models;
pub mod provisioner;
pub mod retry;

pub use auth::{ScimAuth, ScimCredentials};
pub use bulk::{BulkSyncOptions, BulkSyncReport, BulkSyncer};
pub use client::{MemberPatchOutcome, ScimClient};
pub use error::{ScimClientError, ScimClientResult};
pub use provisioner::{GroupMembershipDebug, Provisioner, UserSync};
pub use retry::RetryPolicy;
