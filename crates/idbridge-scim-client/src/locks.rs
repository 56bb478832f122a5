//! Per-entity async locks.
//!
//! Two syncs of the same entity never interleave. When both a group and a
//! user lock are needed, the group lock is taken first.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Kind of entity a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    Group,
}

/// Registry of per-entity mutexes.
#[derive(Debug, Clone, Default)]
pub struct EntityLocks {
    inner: Arc<Mutex<HashMap<(EntityKind, Uuid), Arc<tokio::sync::Mutex<()>>>>>,
}

impl EntityLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for and hold the lock of one entity.
    pub async fn lock(&self, kind: EntityKind, id: Uuid) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut map = self
                .inner
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            // Drop entries nobody holds or waits on.
            map.retain(|_, m| Arc::strong_count(m) > 1);
            map.entry((kind, id)).or_default().clone()
        };
        mutex.lock_owned().await
    }

    pub async fn lock_user(&self, id: Uuid) -> OwnedMutexGuard<()> {
        self.lock(EntityKind::User, id).await
    }

    pub async fn lock_group(&self, id: Uuid) -> OwnedMutexGuard<()> {
        self.lock(EntityKind::Group, id).await
    }
}
