//! Typed wire payloads for the remote directory API.
//!
//! Request shapes are explicit records so a malformed payload cannot be
//! built. Response shapes are lenient: unknown fields are ignored and
//! missing ones default.

use serde::{Deserialize, Serialize};

pub const USER_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:User";
pub const GROUP_SCHEMA: &str = "urn:ietf:params:scim:schemas:core:2.0:Group";
pub const PATCH_OP_SCHEMA: &str = "urn:ietf:params:scim:api:messages:2.0:PatchOp";

/// `emails[]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScimEmail {
    pub value: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

impl ScimEmail {
    #[must_use]
    pub fn work(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            kind: Some("work".to_string()),
            primary: true,
        }
    }
}

/// `name` complex attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimName {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family_name: Option<String>,
}

/// Body of `POST /Users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub schemas: Vec<String>,
    pub user_name: String,
    pub active: bool,
    pub emails: Vec<ScimEmail>,
    pub name: ScimName,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub external_id: String,
}

/// User resource as returned by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub emails: Vec<ScimEmail>,
    #[serde(default)]
    pub name: Option<ScimName>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

impl ScimUser {
    /// Whether any of the user's addresses (or its userName) matches, ignoring case.
    #[must_use]
    pub fn has_email(&self, email: &str) -> bool {
        let needle = email.trim().to_lowercase();
        self.user_name.to_lowercase() == needle
            || self
                .emails
                .iter()
                .any(|e| e.value.trim().to_lowercase() == needle)
    }
}

/// Group member entry. The remote requires all four fields on add.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScimGroupMember {
    #[serde(rename = "$ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ScimGroupMember {
    /// Fully-populated user member entry.
    #[must_use]
    pub fn user(base_url: &str, remote_id: &str, display: impl Into<String>) -> Self {
        Self {
            reference: Some(format!("{base_url}/Users/{remote_id}")),
            value: remote_id.to_string(),
            display: Some(display.into()),
            kind: Some("User".to_string()),
        }
    }
}

/// Body of `POST /Groups` and `PUT /Groups/:id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub schemas: Vec<String>,
    pub display_name: String,
    pub external_id: String,
    pub members: Vec<ScimGroupMember>,
}

/// Group resource as returned by the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimGroup {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default)]
    pub members: Vec<ScimGroupMember>,
}

/// List response envelope.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScimListResponse<T> {
    #[serde(default)]
    pub total_results: i64,
    #[serde(rename = "Resources", default = "Vec::new")]
    pub resources: Vec<T>,
}

/// PATCH operation verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PatchOp {
    Add,
    Replace,
    Remove,
}

/// Value carried by a PATCH operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PatchValue {
    Members(Vec<MemberValue>),
    Bool(bool),
    Text(String),
    Emails(Vec<ScimEmail>),
    GroupMetadata(GroupMetadataValue),
    /// Explicit `null`. The remote ignores a remove without a value.
    Null,
}

/// Minimal `{ "value": id }` member entry used in add operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberValue {
    pub value: String,
}

/// Value of the vendor's whole-object group metadata replace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMetadataValue {
    pub id: String,
    pub display_name: String,
    pub external_id: String,
}

/// A single PATCH operation. Built only through the constructors below.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    op: PatchOp,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    value: PatchValue,
}

impl PatchOperation {
    /// `add members [{value}]`.
    #[must_use]
    pub fn add_members<I, S>(remote_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            op: PatchOp::Add,
            path: Some("members".to_string()),
            value: PatchValue::Members(
                remote_ids
                    .into_iter()
                    .map(|id| MemberValue { value: id.into() })
                    .collect(),
            ),
        }
    }

    /// `remove members[value eq "<id>"]` with an explicit null value.
    #[must_use]
    pub fn remove_member(remote_id: &str) -> Self {
        Self {
            op: PatchOp::Remove,
            path: Some(format!(
                "members[value eq \"{}\"]",
                escape_filter_value(remote_id)
            )),
            value: PatchValue::Null,
        }
    }

    /// `replace <path>` with a string value.
    #[must_use]
    pub fn replace_text(path: &str, value: impl Into<String>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: Some(path.to_string()),
            value: PatchValue::Text(value.into()),
        }
    }

    /// `replace active`.
    #[must_use]
    pub fn replace_active(active: bool) -> Self {
        Self {
            op: PatchOp::Replace,
            path: Some("active".to_string()),
            value: PatchValue::Bool(active),
        }
    }

    /// `replace emails`.
    #[must_use]
    pub fn replace_emails(emails: Vec<ScimEmail>) -> Self {
        Self {
            op: PatchOp::Replace,
            path: Some("emails".to_string()),
            value: PatchValue::Emails(emails),
        }
    }

    /// Vendor form of a group metadata update: path `"None"` and the whole
    /// `{id, displayName, externalId}` object as value.
    #[must_use]
    pub fn replace_group_metadata(metadata: GroupMetadataValue) -> Self {
        Self {
            op: PatchOp::Replace,
            path: Some("None".to_string()),
            value: PatchValue::GroupMetadata(metadata),
        }
    }

    #[must_use]
    pub fn op(&self) -> PatchOp {
        self.op
    }

    #[must_use]
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }
}

/// PATCH request envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchRequest {
    pub schemas: Vec<String>,
    #[serde(rename = "Operations")]
    pub operations: Vec<PatchOperation>,
}

impl PatchRequest {
    #[must_use]
    pub fn new(operations: Vec<PatchOperation>) -> Self {
        Self {
            schemas: vec![PATCH_OP_SCHEMA.to_string()],
            operations,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

/// Escape a value for use inside a filter string literal.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
