//! Sync engine tests against a mock remote directory.

mod helpers;

use helpers::mock_remote::{group_response, list_response, user_response, Harness, TOKEN};
use idbridge_db::{DirectoryStore, InMemoryStore, SyncStatus, UserChanges};
use idbridge_scim_client::{
    BulkSyncOptions, BulkSyncer, Provisioner, RetryPolicy, ScimAuth, ScimClient, ScimClientError,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path, path_regex, query_param};
use wiremock::{Mock, ResponseTemplate};

// =============================================================================
// Users
// =============================================================================

#[tokio::test]
async fn test_sync_new_user_creates_remotely() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .and(body_partial_json(json!({
            "userName": "jane@co.com",
            "externalId": jane.id.to_string(),
            "name": {"formatted": "Jane Doe"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .expect(1)
        .mount(&h.server)
        .await;

    let synced = h.provisioner.sync_user(jane.id).await.unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
    assert_eq!(synced.remote_id.as_deref(), Some("R1"));
    assert!(synced.sync_error.is_none());
    assert!(synced.last_synced_at.is_some());
}

#[tokio::test]
async fn test_synced_unchanged_user_makes_no_remote_call() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(jane.id).await.unwrap();
    let again = h.provisioner.sync_user(jane.id).await.unwrap();
    assert_eq!(again.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_changed_user_is_patched() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Users/R1"))
        .and(body_partial_json(json!({
            "Operations": [{"op": "replace", "path": "userName", "value": "jane@co.com"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_response("R1", "jane@co.com")))
        .expect(1)
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(jane.id).await.unwrap();
    let changed = h
        .store
        .update_user(
            jane.id,
            UserChanges {
                title: Some(Some("Staff Engineer".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(changed.sync_status, SyncStatus::Pending);

    let synced = h.provisioner.sync_user(jane.id).await.unwrap();
    assert_eq!(synced.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_conflict_without_discoverable_user_fails() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(409))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_response(vec![])))
        .mount(&h.server)
        .await;

    let user = h.provisioner.sync_user(jane.id).await.unwrap();
    assert_eq!(user.sync_status, SyncStatus::Failed);
    assert!(user.remote_id.is_none());
    assert!(user
        .sync_error
        .unwrap()
        .starts_with("conflict_not_discoverable:"));
}

#[tokio::test]
async fn test_failed_update_keeps_remote_reference() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Users/R1"))
        .respond_with(ResponseTemplate::new(422).set_body_string("bad title"))
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(jane.id).await.unwrap();
    h.store
        .update_user(
            jane.id,
            UserChanges {
                title: Some(Some("x".to_string())),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let user = h.provisioner.sync_user(jane.id).await.unwrap();
    assert_eq!(user.sync_status, SyncStatus::Failed);
    assert_eq!(user.remote_id.as_deref(), Some("R1"));
    assert!(user.sync_error.unwrap().contains("bad title"));
}

#[tokio::test]
async fn test_timeout_is_recorded_as_failed() {
    let server = wiremock::MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(user_response("R1", "jane@co.com"))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    // Lookup after the transient failure finds nothing.
    Mock::given(method("GET"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(200).set_body_json(list_response(vec![])))
        .mount(&server)
        .await;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_millis(50))
        .build()
        .unwrap();
    let client = ScimClient::with_http_client(server.uri(), ScimAuth::bearer(TOKEN), http)
        .with_retry_policy(RetryPolicy::none());
    let store = Arc::new(InMemoryStore::new());
    let provisioner = Provisioner::new(store.clone(), client);
    let jane = store
        .insert_user(idbridge_db::NewUser::with_email("jane@co.com"))
        .await
        .unwrap();

    let user = provisioner.sync_user(jane.id).await.unwrap();
    assert_eq!(user.sync_status, SyncStatus::Failed);
    assert!(user.sync_error.unwrap().starts_with("timeout:"));
}

#[tokio::test]
async fn test_deactivate_user() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Users/R1"))
        .and(body_partial_json(json!({
            "Operations": [{"op": "replace", "path": "active", "value": false}]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(jane.id).await.unwrap();
    let user = h.provisioner.deactivate_user(jane.id).await.unwrap();
    assert!(!user.active);
    assert_eq!(user.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_delete_user_aborts_when_deactivation_fails() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Users/R1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(jane.id).await.unwrap();
    let err = h.provisioner.delete_user(jane.id).await.unwrap_err();
    assert!(matches!(err, ScimClientError::DeactivationFailed { .. }));

    let kept = h.store.get_user(jane.id).await.unwrap().unwrap();
    assert_eq!(kept.sync_status, SyncStatus::Failed);
    assert_eq!(kept.remote_id.as_deref(), Some("R1"));
    assert!(kept
        .sync_error
        .unwrap()
        .starts_with("deactivation_failed:"));
}

#[tokio::test]
async fn test_delete_user_deactivates_then_removes() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Users/R1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(jane.id).await.unwrap();
    h.provisioner.delete_user(jane.id).await.unwrap();
    assert!(h.store.get_user(jane.id).await.unwrap().is_none());
}

// =============================================================================
// Groups
// =============================================================================

/// Conflict adoption, group create, then an incremental member removal.
#[tokio::test]
async fn test_conflict_adoption_and_group_lifecycle() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(409).set_body_string("already exists"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Users"))
        .and(query_param("filter", "emails.value eq \"jane@co.com\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(list_response(vec![user_response("R1", "jane@co.com")])),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Users/R1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_response("R1", "jane@co.com")))
        .expect(1)
        .mount(&h.server)
        .await;

    let user = h.provisioner.sync_user(jane.id).await.unwrap();
    assert_eq!(user.sync_status, SyncStatus::Synced);
    assert_eq!(user.remote_id.as_deref(), Some("R1"));

    let eng = h.group("Eng", &[jane.id]).await;
    Mock::given(method("POST"))
        .and(path("/Groups"))
        .and(body_partial_json(json!({
            "displayName": "Eng",
            "members": [{"value": "R1", "type": "User", "display": "Jane Doe"}]
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_response("G1", "Eng", &["R1"])))
        .expect(1)
        .mount(&h.server)
        .await;

    let group = h.provisioner.sync_group(eng).await.unwrap();
    assert_eq!(group.sync_status, SyncStatus::Synced);
    assert_eq!(group.remote_id.as_deref(), Some("G1"));

    h.store.remove_group_member(eng, jane.id).await.unwrap();

    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({"Operations": [{"path": "None"}]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Groups/G1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(group_response("G1", "Eng", &["R1"])))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({
            "Operations": [{"op": "remove", "path": "members[value eq \"R1\"]", "value": null}]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({"Operations": [{"op": "add"}]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&h.server)
        .await;

    let group = h.provisioner.sync_group(eng).await.unwrap();
    assert_eq!(group.sync_status, SyncStatus::Synced);
    assert!(group.sync_error.is_none());
}

#[tokio::test]
async fn test_group_create_excludes_unsyncable_member_with_warning() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;
    let bob = h.user("bob@co.com", "Bob", "Roe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .and(body_partial_json(json!({"userName": "bob@co.com"})))
        .respond_with(ResponseTemplate::new(400).set_body_string("bob is invalid"))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Users"))
        .and(body_partial_json(json!({"userName": "jane@co.com"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Groups"))
        .and(body_partial_json(json!({"members": [{"value": "R1"}]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_response("G1", "Eng", &["R1"])))
        .expect(1)
        .mount(&h.server)
        .await;

    let eng = h.group("Eng", &[jane.id, bob.id]).await;
    let group = h.provisioner.sync_group(eng).await.unwrap();

    assert_eq!(group.sync_status, SyncStatus::Warning);
    assert_eq!(group.remote_id.as_deref(), Some("G1"));
    assert!(group.sync_error.unwrap().contains("bob@co.com"));

    let bob = h.store.get_user(bob.id).await.unwrap().unwrap();
    assert_eq!(bob.sync_status, SyncStatus::Failed);
}

/// Jane (R1) and Bob (R2) synced, group `Eng` created remotely as G1 with
/// Jane only, then Bob added locally.
async fn group_with_pending_member(h: &Harness) -> uuid::Uuid {
    let jane = h.user("jane@co.com", "Jane", "Doe").await;
    let bob = h.user("bob@co.com", "Bob", "Roe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .and(body_partial_json(json!({"userName": "jane@co.com"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Users"))
        .and(body_partial_json(json!({"userName": "bob@co.com"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R2", "bob@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Groups"))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_response("G1", "Eng", &["R1"])))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({"Operations": [{"path": "None"}]})))
        .respond_with(ResponseTemplate::new(204))
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(bob.id).await.unwrap();
    let eng = h.group("Eng", &[jane.id]).await;
    let group = h.provisioner.sync_group(eng).await.unwrap();
    assert_eq!(group.remote_id.as_deref(), Some("G1"));

    h.store.add_group_member(eng, bob.id).await.unwrap();
    eng
}

#[tokio::test]
async fn test_failed_member_patches_leave_group_in_warning() {
    let h = Harness::new().await;
    let eng = group_with_pending_member(&h).await;

    // Remote drifted: it holds R9, which nobody wants, and lacks R2.
    Mock::given(method("GET"))
        .and(path("/Groups/G1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(group_response("G1", "Eng", &["R1", "R9"])),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({
            "Operations": [{"op": "remove", "path": "members[value eq \"R9\"]"}]
        })))
        .respond_with(ResponseTemplate::new(503).set_body_string("busy"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({
            "Operations": [{"op": "add", "value": [{"value": "R2"}]}]
        })))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/Groups/G1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let group = h.provisioner.sync_group(eng).await.unwrap();

    assert_eq!(group.sync_status, SyncStatus::Warning);
    assert_eq!(group.remote_id.as_deref(), Some("G1"));
    let error = group.sync_error.unwrap();
    assert!(error.contains("remove R9: unavailable"), "{error}");
    assert!(error.contains("add R2: unavailable"), "{error}");
}

#[tokio::test]
async fn test_rejected_member_patch_falls_back_to_replace() {
    let h = Harness::new().await;
    let eng = group_with_pending_member(&h).await;

    Mock::given(method("GET"))
        .and(path("/Groups/G1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(group_response("G1", "Eng", &["R1", "R9"])),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({"Operations": [{"op": "remove"}]})))
        .respond_with(ResponseTemplate::new(400).set_body_string("remove not supported"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({"displayName": "Eng"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(group_response("G1", "Eng", &["R1", "R2"])),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    // The replace already carries R2.
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({"Operations": [{"op": "add"}]})))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&h.server)
        .await;

    let group = h.provisioner.sync_group(eng).await.unwrap();

    assert_eq!(group.sync_status, SyncStatus::Synced);
    assert!(group.sync_error.is_none());

    let put = h
        .server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .find(|r| r.method.as_str() == "PUT")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&put.body).unwrap();
    let mut members: Vec<&str> = body["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["value"].as_str().unwrap())
        .collect();
    members.sort_unstable();
    assert_eq!(members, vec!["R1", "R2"]);
}

#[tokio::test]
async fn test_group_cascade_waits_for_running_user_sync() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;
    let eng = h.group("Eng", &[jane.id]).await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(user_response("R1", "jane@co.com"))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Groups"))
        .and(body_partial_json(json!({"members": [{"value": "R1"}]})))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_response("G1", "Eng", &["R1"])))
        .expect(1)
        .mount(&h.server)
        .await;

    let provisioner = h.provisioner.clone();
    let user_sync = tokio::spawn(async move { provisioner.sync_user(jane.id).await });
    // Let the user sync take its lock and send the create.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let group = h.provisioner.sync_group(eng).await.unwrap();
    let user = user_sync.await.unwrap().unwrap();

    assert_eq!(user.remote_id.as_deref(), Some("R1"));
    assert_eq!(group.sync_status, SyncStatus::Synced);
}

#[tokio::test]
async fn test_group_metadata_failure_fails_group() {
    let h = Harness::new().await;
    let eng = h.group("Eng", &[]).await;

    Mock::given(method("POST"))
        .and(path("/Groups"))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_response("G1", "Eng", &[])))
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad name"))
        .mount(&h.server)
        .await;

    h.provisioner.sync_group(eng).await.unwrap();
    h.store
        .update_group(
            eng,
            idbridge_db::GroupChanges {
                display_name: Some("Platform".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let group = h.provisioner.patch_group_metadata(eng).await.unwrap();
    assert_eq!(group.sync_status, SyncStatus::Failed);
    assert_eq!(group.remote_id.as_deref(), Some("G1"));
}

#[tokio::test]
async fn test_sync_group_member_cascades_user_sync() {
    let h = Harness::new().await;
    let eng = h.group("Eng", &[]).await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Groups"))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_response("G1", "Eng", &[])))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/Groups/G1"))
        .and(body_partial_json(json!({
            "Operations": [{"op": "add", "path": "members", "value": [{"value": "R1"}]}]
        })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&h.server)
        .await;

    h.provisioner.sync_group(eng).await.unwrap();
    let group = h.provisioner.sync_group_member(eng, jane.id).await.unwrap();

    assert_eq!(group.sync_status, SyncStatus::Synced);
    assert!(group.member_ids.contains(&jane.id));
    let jane = h.store.get_user(jane.id).await.unwrap().unwrap();
    assert_eq!(jane.remote_id.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_debug_group_membership_reports_drift() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Groups"))
        .respond_with(ResponseTemplate::new(201).set_body_json(group_response("G1", "Eng", &["R1"])))
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Groups/G1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(group_response("G1", "Eng", &["R9"])),
        )
        .mount(&h.server)
        .await;
    Mock::given(method("PATCH"))
        .and(path_regex("^/Groups/.*$"))
        .respond_with(ResponseTemplate::new(204))
        .expect(0)
        .mount(&h.server)
        .await;

    let eng = h.group("Eng", &[jane.id]).await;
    h.provisioner.sync_group(eng).await.unwrap();

    let before = h.store.get_group(eng).await.unwrap().unwrap();
    let report = h.provisioner.debug_group_membership(eng).await.unwrap();
    assert_eq!(report.missing_remotely, vec!["R1".to_string()]);
    assert_eq!(report.extra_remotely, vec!["R9".to_string()]);
    assert_eq!(report.local_members.len(), 1);
    assert_eq!(h.store.get_group(eng).await.unwrap().unwrap(), before);
}

// =============================================================================
// Bulk
// =============================================================================

#[tokio::test]
async fn test_bulk_sync_isolates_single_failure() {
    let h = Harness::new().await;
    let mut ids = Vec::new();
    for email in ["a@co.com", "b@co.com", "c@co.com", "d@co.com"] {
        ids.push(h.user(email, "A", "B").await.id);
    }

    Mock::given(method("POST"))
        .and(path("/Users"))
        .and(body_partial_json(json!({"userName": "c@co.com"})))
        .respond_with(ResponseTemplate::new(400).set_body_string("rejected"))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("RX", "x@co.com")))
        .expect(3)
        .mount(&h.server)
        .await;

    let syncer = BulkSyncer::new(h.provisioner.clone(), 2);
    let options = BulkSyncOptions {
        groups: false,
        ..Default::default()
    };
    let report = syncer
        .run(&options, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].id, ids[2]);
    assert_eq!(report.message(), "Synced 3, 1 failed");
}

#[tokio::test]
async fn test_bulk_sync_skips_synced_entities() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(ResponseTemplate::new(201).set_body_json(user_response("R1", "jane@co.com")))
        .expect(1)
        .mount(&h.server)
        .await;

    h.provisioner.sync_user(jane.id).await.unwrap();
    let report = BulkSyncer::new(h.provisioner.clone(), 5)
        .run(&BulkSyncOptions::default(), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.total, 0);
}

#[tokio::test]
async fn test_cancelled_bulk_sync_starts_nothing() {
    let h = Harness::new().await;
    for email in ["a@co.com", "b@co.com"] {
        h.user(email, "A", "B").await;
    }
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&h.server)
        .await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = BulkSyncer::new(h.provisioner.clone(), 5)
        .run(&BulkSyncOptions::default(), cancel)
        .await
        .unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.cancelled, 2);
    assert_eq!(report.succeeded, 0);
    for user in h.store.list_users().await.unwrap() {
        assert_eq!(user.sync_status, SyncStatus::Pending);
    }
}

#[tokio::test]
async fn test_dropped_bulk_run_still_records_in_flight_entity() {
    let h = Harness::new().await;
    let jane = h.user("jane@co.com", "Jane", "Doe").await;

    Mock::given(method("POST"))
        .and(path("/Users"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(user_response("R1", "jane@co.com"))
                .set_delay(Duration::from_millis(300)),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let syncer = BulkSyncer::new(h.provisioner.clone(), 2);
    let options = BulkSyncOptions::default();
    let run = syncer.run(&options, CancellationToken::new());
    assert!(tokio::time::timeout(Duration::from_millis(100), run)
        .await
        .is_err());

    tokio::time::sleep(Duration::from_millis(800)).await;

    let jane = h.store.get_user(jane.id).await.unwrap().unwrap();
    assert_eq!(jane.sync_status, SyncStatus::Synced);
    assert_eq!(jane.remote_id.as_deref(), Some("R1"));
}
