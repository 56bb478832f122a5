//! Role mapping resolver.
//!
//! Maps the role values an upstream identity source sends onto local roles,
//! and owns the role assignment rules (idempotent assign/unassign, a single
//! default role, no deletion while assigned).

pub mod error;
pub mod resolver;

pub use error::{RoleError, RoleResult};
pub use resolver::{
    BulkMappingReport, MappingError, RoleMapping, RoleResolution, RoleResolver, UserRoleSync,
};
