//! Provisioning router over an in-memory store and a wiremock remote.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use idbridge_api_sync::{sync_router, SyncState};
use idbridge_db::{DirectoryStore, InMemoryStore, NewGroup, NewUser, User};
use idbridge_scim_client::{Provisioner, RetryPolicy, ScimAuth, ScimClient};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub struct Harness {
    pub server: MockServer,
    pub store: Arc<InMemoryStore>,
    pub state: SyncState,
}

impl Harness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(InMemoryStore::new());
        let client = ScimClient::with_http_client(
            server.uri(),
            ScimAuth::bearer("test-token"),
            reqwest::Client::new(),
        )
        .with_retry_policy(RetryPolicy::new(0, 0));
        let provisioner = Arc::new(Provisioner::new(store.clone(), client));
        Self {
            server,
            store,
            state: SyncState::new(provisioner, 2),
        }
    }

    pub fn app(&self) -> Router {
        sync_router(self.state.clone())
    }

    pub async fn user(&self, email: &str) -> User {
        self.store
            .insert_user(NewUser {
                first_name: Some("Jane".to_string()),
                last_name: Some("Doe".to_string()),
                ..NewUser::with_email(email)
            })
            .await
            .unwrap()
    }

    pub async fn group(&self, name: &str, members: &[Uuid]) -> Uuid {
        self.store
            .insert_group(NewGroup {
                display_name: name.to_string(),
                description: None,
                member_ids: members.iter().copied().collect(),
            })
            .await
            .unwrap()
            .id
    }

    /// Send a request and decode the JSON body (`Value::Null` when empty).
    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

pub fn user_response(id: &str, email: &str) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:User"],
        "id": id,
        "userName": email,
        "active": true,
        "emails": [{"value": email, "type": "work", "primary": true}]
    })
}

pub fn group_response(id: &str, name: &str, member_ids: &[&str]) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:schemas:core:2.0:Group"],
        "id": id,
        "displayName": name,
        "members": member_ids
            .iter()
            .map(|m| json!({"value": m, "display": m}))
            .collect::<Vec<_>>()
    })
}
