//! Wiremock-backed remote directory plus an in-memory local store.

#![allow(dead_code)]

use idbridge_db::{DirectoryStore, InMemoryStore, NewGroup, NewUser, User};
use idbridge_scim_client::{Provisioner, RetryPolicy, ScimAuth, ScimClient};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;
use wiremock::MockServer;

pub const TOKEN: &str = "test-token-123";

/// Client pointing at the mock server, without retry delays.
pub fn client(server: &MockServer) -> ScimClient {
    ScimClient::with_http_client(server.uri(), ScimAuth::bearer(TOKEN), reqwest::Client::new())
        .with_retry_policy(RetryPolicy::new(2, 0))
}

pub struct Harness {
    pub server: MockServer,
    pub store: Arc<InMemoryStore>,
    pub provisioner: Arc<Provisioner>,
}

impl Harness {
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let store = Arc::new(InMemoryStore::new());
        let provisioner = Arc::new(Provisioner::new(store.clone(), client(&server)));
        Self {
            server,
            store,
            provisioner,
        }
    }

    pub async fn user(&self, email: &str, first: &str, last: &str) -> User {
        self.store
            .insert_user(NewUser {
                username: email.split('@').next().unwrap_or(email).to_string(),
                email: email.to_string(),
                first_name: Some(first.to_string()),
                last_name: Some(last.to_string()),
                title: None,
                active: true,
            })
            .await
            .unwrap()
    }

    pub async fn group(&self, name: &str, members: &[Uuid]) -> Uuid {
        self.store
            .insert_group(NewGroup {
                display_name: name.to_string(),
                description: None,
                member_ids: members.iter().copied().collect::<BTreeSet<_>>(),
            })
            .await
            .unwrap()
            .id
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

pub fn list_response(resources: Vec<Value>) -> Value {
    json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:ListResponse"],
        "totalResults": resources.len(),
        "Resources": resources
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
