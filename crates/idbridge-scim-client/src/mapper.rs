//! Attribute mapper: local user/group records to remote payloads.
//!
//! The local id is always sent as `externalId` so the remote resource can be
//! correlated back to this directory.

use crate::models::{
    CreateUserRequest, GroupMetadataValue, GroupRequest, PatchOperation, PatchRequest, ScimEmail,
    ScimGroupMember, ScimName, GROUP_SCHEMA, USER_SCHEMA,
};
use idbridge_db::{Group, User};
use sha2::{Digest, Sha256};

/// Maps local records into remote representations.
pub struct AttributeMapper;

impl AttributeMapper {
    /// Full create payload for a user.
    #[must_use]
    pub fn user_to_create_request(user: &User) -> CreateUserRequest {
        CreateUserRequest {
            schemas: vec![USER_SCHEMA.to_string()],
            user_name: user.email.trim().to_string(),
            active: user.active,
            emails: vec![ScimEmail::work(user.email.trim())],
            name: Self::user_name_attr(user),
            title: non_empty(user.title.as_deref()),
            external_id: user.id.to_string(),
        }
    }

    /// Partial-attribute replace operations mirroring the create payload.
    ///
    /// Absent optional attributes are sent as empty strings so a cleared
    /// local value also clears the remote one.
    #[must_use]
    pub fn user_to_patch(user: &User) -> PatchRequest {
        let name = Self::user_name_attr(user);
        PatchRequest::new(vec![
            PatchOperation::replace_text("userName", user.email.trim()),
            PatchOperation::replace_active(user.active),
            PatchOperation::replace_text("name.givenName", name.given_name.unwrap_or_default()),
            PatchOperation::replace_text("name.familyName", name.family_name.unwrap_or_default()),
            PatchOperation::replace_text("name.formatted", name.formatted.unwrap_or_default()),
            PatchOperation::replace_text("title", user.title.clone().unwrap_or_default()),
            PatchOperation::replace_emails(vec![ScimEmail::work(user.email.trim())]),
        ])
    }

    /// Stable fingerprint of what would be pushed for this user.
    #[must_use]
    pub fn user_fingerprint(user: &User) -> String {
        let request = Self::user_to_create_request(user);
        // Serializing a plain struct of strings and bools cannot fail.
        let bytes = serde_json::to_vec(&request).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// Full group payload. `members` are `(remote_id, display)` pairs of
    /// users already present remotely.
    #[must_use]
    pub fn group_to_request(
        group: &Group,
        base_url: &str,
        members: &[(String, String)],
    ) -> GroupRequest {
        GroupRequest {
            schemas: vec![GROUP_SCHEMA.to_string()],
            display_name: group.display_name.clone(),
            external_id: group.id.to_string(),
            members: members
                .iter()
                .map(|(remote_id, display)| {
                    ScimGroupMember::user(base_url, remote_id, display.clone())
                })
                .collect(),
        }
    }

    /// Metadata value for the vendor's group replace; `description` stays local.
    #[must_use]
    pub fn group_metadata(group: &Group, remote_id: &str) -> GroupMetadataValue {
        GroupMetadataValue {
            id: remote_id.to_string(),
            display_name: group.display_name.clone(),
            external_id: group.id.to_string(),
        }
    }

    fn user_name_attr(user: &User) -> ScimName {
        ScimName {
            formatted: Some(user.formatted_name()),
            given_name: non_empty(user.first_name.as_deref()),
            family_name: non_empty(user.last_name.as_deref()),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}
