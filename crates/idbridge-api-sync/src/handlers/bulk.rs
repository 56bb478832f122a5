//! Bulk sync trigger and cancellation.

use axum::{extract::State, Json};
use idbridge_scim_client::BulkSyncOptions;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{Result, SyncApiError};
use crate::handlers::SyncState;
use crate::models::{BulkSyncRequest, BulkSyncResponse, CancelBulkResponse};

/// Clears the running-bulk slot when the run ends. It travels with the run's
/// task, so a dropped request keeps the slot taken until the run finishes.
struct BulkRunGuard {
    slot: Arc<Mutex<Option<CancellationToken>>>,
}

impl Drop for BulkRunGuard {
    fn drop(&mut self) {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn start_run(state: &SyncState) -> Result<(CancellationToken, BulkRunGuard)> {
    let mut running = state
        .bulk_run
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if running.is_some() {
        return Err(SyncApiError::Conflict(
            "A bulk sync is already running".to_string(),
        ));
    }
    let token = CancellationToken::new();
    *running = Some(token.clone());
    Ok((
        token,
        BulkRunGuard {
            slot: state.bulk_run.clone(),
        },
    ))
}

/// POST /sync/bulk
///
/// Sync every `pending`/`failed` user and group.
///
/// Waits for the run and returns the aggregate report. One run at a time.
/// A client that disconnects does not stop the run; use the cancel endpoint.
pub async fn run_bulk_sync(
    State(state): State<SyncState>,
    body: Option<Json<BulkSyncRequest>>,
) -> Result<Json<BulkSyncResponse>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let options = BulkSyncOptions {
        users: request.users,
        groups: request.groups,
    };

    let (token, guard) = start_run(&state)?;
    info!(users = options.users, groups = options.groups, "Bulk sync started");

    let bulk = state.bulk.clone();
    let run = tokio::spawn(async move {
        let _guard = guard;
        bulk.run(&options, token).await
    });
    let report = run
        .await
        .map_err(|e| SyncApiError::Internal(format!("Bulk sync task failed: {e}")))??;
    Ok(Json(report.into()))
}

/// POST /sync/bulk/cancel
///
/// Stop the running bulk sync between entities.
pub async fn cancel_bulk_sync(State(state): State<SyncState>) -> Json<CancelBulkResponse> {
    let running = state
        .bulk_run
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    let cancelled = match running.as_ref() {
        Some(token) => {
            token.cancel();
            info!("Bulk sync cancellation requested");
            true
        }
        None => false,
    };
    Json(CancelBulkResponse { cancelled })
}

#[cfg(test)]
mod tests {
    use super::*;
    use idbridge_db::InMemoryStore;
    use idbridge_scim_client::{Provisioner, ScimAuth, ScimClient};
    use std::time::Duration;

    fn state() -> SyncState {
        let client = ScimClient::new(
            "http://127.0.0.1:9".to_string(),
            ScimAuth::bearer("t"),
            Duration::from_secs(1),
        )
        .unwrap();
        let provisioner = Provisioner::new(Arc::new(InMemoryStore::new()), client);
        SyncState::new(Arc::new(provisioner), 1)
    }

    #[tokio::test]
    async fn test_second_run_is_rejected_while_first_holds_the_slot() {
        let state = state();
        let (token, guard) = start_run(&state).unwrap();
        assert!(matches!(start_run(&state), Err(SyncApiError::Conflict(_))));

        drop(guard);
        assert!(!token.is_cancelled());
        assert!(start_run(&state).is_ok());
    }

    #[tokio::test]
    async fn test_cancel_reaches_running_token() {
        let state = state();
        let (token, _guard) = start_run(&state).unwrap();

        let Json(response) = cancel_bulk_sync(State(state.clone())).await;
        assert!(response.cancelled);
        assert!(token.is_cancelled());
    }
}
