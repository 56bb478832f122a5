//! Bulk synchronization of every `pending`/`failed` user and group.
//!
//! Entities are synced concurrently, bounded by a semaphore. One entity's
//! failure never aborts the batch. Cancellation is observed between
//! entities: an entity that has started always finishes.
//!
//! A run lives on its own task. Dropping the future returned by
//! [`BulkSyncer::run`] detaches the run instead of aborting it, so an entity
//! whose remote call is already out still records the outcome locally. Only
//! the [`CancellationToken`] stops a run.

use crate::error::{ScimClientError, ScimClientResult};
use crate::provisioner::Provisioner;
use idbridge_db::SyncStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Bulk sync settings.
#[derive(Debug, Clone)]
pub struct BulkSyncOptions {
    pub users: bool,
    pub groups: bool,
}

impl Default for BulkSyncOptions {
    fn default() -> Self {
        Self {
            users: true,
            groups: true,
        }
    }
}

/// Kind of entity reported in a bulk failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum BulkEntity {
    User,
    Group,
}

/// One entity that did not reach `synced`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BulkFailure {
    pub kind: BulkEntity,
    pub id: Uuid,
    pub error: String,
}

/// Aggregate outcome of a bulk run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BulkSyncReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Entities never started because the run was cancelled.
    pub cancelled: usize,
    pub failures: Vec<BulkFailure>,
}

impl BulkSyncReport {
    #[must_use]
    pub fn message(&self) -> String {
        format!("Synced {}, {} failed", self.succeeded, self.failed)
    }

    fn record(&mut self, kind: BulkEntity, id: Uuid, outcome: Outcome) {
        match outcome {
            Outcome::Succeeded => self.succeeded += 1,
            Outcome::Failed(error) => {
                self.failed += 1;
                self.failures.push(BulkFailure { kind, id, error });
            }
            Outcome::Cancelled => self.cancelled += 1,
        }
    }
}

enum Outcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

/// Runs bulk syncs against a [`Provisioner`].
#[derive(Clone)]
pub struct BulkSyncer {
    provisioner: Arc<Provisioner>,
    max_concurrency: usize,
}

impl BulkSyncer {
    #[must_use]
    pub fn new(provisioner: Arc<Provisioner>, max_concurrency: usize) -> Self {
        Self {
            provisioner,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Sync every entity that needs it and wait for the report.
    pub async fn run(
        &self,
        options: &BulkSyncOptions,
        cancel: CancellationToken,
    ) -> ScimClientResult<BulkSyncReport> {
        self.spawn(options.clone(), cancel)
            .await
            .map_err(|e| ScimClientError::Internal(format!("Bulk sync task failed: {e}")))?
    }

    /// Start a run on a detached task.
    pub fn spawn(
        &self,
        options: BulkSyncOptions,
        cancel: CancellationToken,
    ) -> JoinHandle<ScimClientResult<BulkSyncReport>> {
        let this = self.clone();
        tokio::spawn(async move { this.run_detached(&options, cancel).await })
    }

    /// Users run before groups so group membership can reference freshly
    /// created users.
    async fn run_detached(
        &self,
        options: &BulkSyncOptions,
        cancel: CancellationToken,
    ) -> ScimClientResult<BulkSyncReport> {
        let store = self.provisioner.store();
        let mut report = BulkSyncReport::default();

        if options.users {
            let ids: Vec<Uuid> = store
                .list_users()
                .await?
                .into_iter()
                .filter(|u| u.sync_status.needs_sync())
                .map(|u| u.id)
                .collect();
            self.run_batch(BulkEntity::User, ids, &cancel, &mut report)
                .await;
        }

        if options.groups {
            let ids: Vec<Uuid> = store
                .list_groups()
                .await?
                .into_iter()
                .filter(|g| g.sync_status.needs_sync())
                .map(|g| g.id)
                .collect();
            self.run_batch(BulkEntity::Group, ids, &cancel, &mut report)
                .await;
        }

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed,
            cancelled = report.cancelled,
            "Bulk sync finished"
        );
        Ok(report)
    }

    async fn run_batch(
        &self,
        kind: BulkEntity,
        ids: Vec<Uuid>,
        cancel: &CancellationToken,
        report: &mut BulkSyncReport,
    ) {
        report.total += ids.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut join_set = JoinSet::new();

        for id in ids {
            let provisioner = self.provisioner.clone();
            let semaphore = semaphore.clone();
            let cancel = cancel.clone();
            join_set.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (id, Outcome::Cancelled);
                };
                if cancel.is_cancelled() {
                    return (id, Outcome::Cancelled);
                }
                (id, sync_one(&provisioner, kind, id).await)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((id, outcome)) => report.record(kind, id, outcome),
                Err(e) => {
                    error!(error = %e, "Bulk sync task panicked");
                    report.failed += 1;
                }
            }
        }
    }
}

async fn sync_one(provisioner: &Provisioner, kind: BulkEntity, id: Uuid) -> Outcome {
    let result = match kind {
        BulkEntity::User => provisioner
            .sync_user(id)
            .await
            .map(|u| (u.sync_status, u.sync_error)),
        BulkEntity::Group => provisioner
            .sync_group(id)
            .await
            .map(|g| (g.sync_status, g.sync_error)),
    };

    match result {
        Ok((SyncStatus::Synced, _)) => Outcome::Succeeded,
        Ok((status, error)) => {
            let error = error.unwrap_or_else(|| format!("ended in {status} status"));
            warn!(entity = ?kind, id = %id, error = %error, "Entity did not reach synced");
            Outcome::Failed(error)
        }
        Err(e) => Outcome::Failed(e.status_message()),
    }
}
