//! Remote directory HTTP client (reqwest-based).
//!
//! Every call maps the HTTP outcome onto [`ScimClientError`]:
//! 2xx is success, 409 is [`ScimClientError::Conflict`], other 4xx are
//! [`ScimClientError::Rejected`] with the response body kept for diagnostics,
//! 5xx and transport failures are retryable. Only reads (GET) are retried
//! here; mutating calls surface their first failure to the caller.

use crate::auth::ScimAuth;
use crate::error::{ScimClientError, ScimClientResult};
use crate::models::{
    escape_filter_value, CreateUserRequest, GroupMetadataValue, GroupRequest, PatchOperation,
    PatchRequest, ScimGroup, ScimListResponse, ScimUser,
};
use crate::retry::RetryPolicy;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default remote API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.datadoghq.com/api/v2/scim";

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size used by the email fallback scan.
const FALLBACK_SCAN_COUNT: i64 = 100;

/// How a membership change was finally applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberPatchOutcome {
    /// Incremental PATCH accepted.
    Patched,
    /// PATCH rejected; the full member list was written with PUT.
    Replaced,
}

/// Client for the remote identity API (`/Users`, `/Groups`).
#[derive(Debug, Clone)]
pub struct ScimClient {
    /// Base URL without trailing slash.
    base_url: String,
    auth: ScimAuth,
    http_client: Client,
    /// Policy for idempotent reads.
    retry_policy: RetryPolicy,
}

impl ScimClient {
    /// Create a client with its own HTTP connection pool.
    pub fn new(base_url: String, auth: ScimAuth, timeout: Duration) -> ScimClientResult<Self> {
        if !auth.is_configured() {
            return Err(ScimClientError::InvalidConfig(
                "remote directory token is empty".to_string(),
            ));
        }
        url::Url::parse(&base_url).map_err(|e| {
            ScimClientError::InvalidConfig(format!("invalid base URL {base_url}: {e}"))
        })?;

        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("idbridge-scim-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| {
                ScimClientError::InvalidConfig(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self::with_http_client(base_url, auth, http_client))
    }

    /// Create a client with a pre-built `reqwest::Client` (for testing).
    #[must_use]
    pub fn with_http_client(base_url: String, auth: ScimAuth, http_client: Client) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            auth,
            http_client,
            retry_policy: RetryPolicy::default(),
        }
    }

    /// Replace the read retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ── User Operations ───────────────────────────────────────────────

    /// `POST /Users`. A 409 is returned as [`ScimClientError::Conflict`];
    /// resolving it is the caller's job.
    pub async fn create_user(&self, user: &CreateUserRequest) -> ScimClientResult<ScimUser> {
        let url = format!("{}/Users", self.base_url);
        self.post(&url, user).await
    }

    /// `GET /Users/:id`.
    pub async fn get_user(&self, id: &str) -> ScimClientResult<ScimUser> {
        let url = format!("{}/Users/{}", self.base_url, id);
        self.retry_policy
            .execute("get_user", || self.get(&url))
            .await
    }

    /// `PATCH /Users/:id` with a partial-attribute operation list.
    ///
    /// Returns the updated resource when the remote sends one back.
    pub async fn update_user(
        &self,
        id: &str,
        patch: &PatchRequest,
    ) -> ScimClientResult<Option<ScimUser>> {
        let url = format!("{}/Users/{}", self.base_url, id);
        self.patch(&url, patch).await
    }

    /// Set `active=false` on the remote user.
    ///
    /// Any failure is reported as [`ScimClientError::DeactivationFailed`] so a
    /// lock-out failure is never confused with attribute drift.
    pub async fn deactivate_user(&self, id: &str) -> ScimClientResult<()> {
        let url = format!("{}/Users/{}", self.base_url, id);
        let patch = PatchRequest::new(vec![PatchOperation::replace_active(false)]);
        match self.patch::<ScimUser, _>(&url, &patch).await {
            Ok(_) => {
                info!(remote_id = %id, "Remote user deactivated");
                Ok(())
            }
            Err(e) => Err(ScimClientError::DeactivationFailed {
                remote_id: id.to_string(),
                source: Box::new(e),
            }),
        }
    }

    /// `GET /Users` with optional filter and pagination.
    pub async fn list_users(
        &self,
        filter: Option<&str>,
        start_index: Option<i64>,
        count: Option<i64>,
    ) -> ScimClientResult<ScimListResponse<ScimUser>> {
        let url = format!("{}/Users", self.base_url);
        self.retry_policy
            .execute("list_users", || {
                self.get_with_params(&url, filter, start_index, count)
            })
            .await
    }

    /// Find a remote user by email.
    ///
    /// Tries `emails.value`, `emails` and `userName` filters in turn, then
    /// falls back to a case-insensitive scan of the first page. Filters the
    /// remote rejects are skipped; an unavailable remote is an error rather
    /// than "not found".
    pub async fn find_user_by_email(&self, email: &str) -> ScimClientResult<Option<ScimUser>> {
        let escaped = escape_filter_value(email.trim());
        let filters = [
            format!("emails.value eq \"{escaped}\""),
            format!("emails eq \"{escaped}\""),
            format!("userName eq \"{escaped}\""),
        ];

        for filter in &filters {
            match self.list_users(Some(filter), None, Some(1)).await {
                Ok(list) => {
                    if let Some(user) = list.resources.into_iter().find(|u| u.has_email(email)) {
                        debug!(filter = %filter, remote_id = ?user.id, "Found remote user by filter");
                        return Ok(Some(user));
                    }
                }
                Err(
                    e @ (ScimClientError::Rejected { .. }
                    | ScimClientError::NotFound(_)
                    | ScimClientError::ParseError(_)),
                ) => {
                    warn!(filter = %filter, error = %e, "Remote rejected user filter, trying next");
                }
                Err(e) => return Err(e),
            }
        }

        debug!("Filter search found nothing, scanning first page of users");
        let page = self
            .list_users(None, Some(1), Some(FALLBACK_SCAN_COUNT))
            .await?;
        Ok(page.resources.into_iter().find(|u| u.has_email(email)))
    }

    // ── Group Operations ──────────────────────────────────────────────

    /// `POST /Groups`.
    pub async fn create_group(&self, group: &GroupRequest) -> ScimClientResult<ScimGroup> {
        let url = format!("{}/Groups", self.base_url);
        self.post(&url, group).await
    }

    /// `GET /Groups/:id`, including the current member list.
    pub async fn get_group(&self, id: &str) -> ScimClientResult<ScimGroup> {
        let url = format!("{}/Groups/{}", self.base_url, id);
        self.retry_policy
            .execute("get_group", || self.get(&url))
            .await
    }

    /// `PUT /Groups/:id` replacing the whole resource, members included.
    pub async fn replace_group(&self, id: &str, group: &GroupRequest) -> ScimClientResult<ScimGroup> {
        let url = format!("{}/Groups/{}", self.base_url, id);
        self.put(&url, group).await
    }

    /// `PATCH /Groups/:id` with an arbitrary operation list.
    pub async fn patch_group(&self, id: &str, patch: &PatchRequest) -> ScimClientResult<()> {
        if patch.is_empty() {
            return Ok(());
        }
        let url = format!("{}/Groups/{}", self.base_url, id);
        self.patch::<serde_json::Value, _>(&url, patch).await?;
        Ok(())
    }

    /// Add members by remote user id.
    pub async fn add_group_members(&self, id: &str, remote_ids: &[String]) -> ScimClientResult<()> {
        if remote_ids.is_empty() {
            return Ok(());
        }
        let patch = PatchRequest::new(vec![PatchOperation::add_members(remote_ids.iter().cloned())]);
        self.patch_group(id, &patch).await
    }

    /// Remove members by remote user id, one remove operation per member.
    pub async fn remove_group_members(
        &self,
        id: &str,
        remote_ids: &[String],
    ) -> ScimClientResult<()> {
        if remote_ids.is_empty() {
            return Ok(());
        }
        let patch = PatchRequest::new(
            remote_ids
                .iter()
                .map(|rid| PatchOperation::remove_member(rid))
                .collect(),
        );
        self.patch_group(id, &patch).await
    }

    /// Apply a membership PATCH; if the remote rejects it (4xx other than
    /// 409), write `full` with PUT instead.
    pub async fn patch_group_members_with_fallback(
        &self,
        id: &str,
        patch: &PatchRequest,
        full: &GroupRequest,
    ) -> ScimClientResult<MemberPatchOutcome> {
        match self.patch_group(id, patch).await {
            Ok(()) => Ok(MemberPatchOutcome::Patched),
            Err(ScimClientError::Rejected { status, detail }) => {
                warn!(
                    group_remote_id = %id,
                    status,
                    detail = %detail,
                    "Membership PATCH rejected, falling back to full PUT"
                );
                self.replace_group(id, full).await?;
                Ok(MemberPatchOutcome::Replaced)
            }
            Err(e) => Err(e),
        }
    }

    /// Replace the group's display name and external id only.
    pub async fn patch_group_metadata(
        &self,
        id: &str,
        metadata: GroupMetadataValue,
    ) -> ScimClientResult<()> {
        let patch = PatchRequest::new(vec![PatchOperation::replace_group_metadata(metadata)]);
        self.patch_group(id, &patch).await
    }

    // ── Internal HTTP Methods ─────────────────────────────────────────

    async fn get_with_params<T: DeserializeOwned>(
        &self,
        url: &str,
        filter: Option<&str>,
        start_index: Option<i64>,
        count: Option<i64>,
    ) -> ScimClientResult<T> {
        debug!("SCIM GET {} (filter={:?})", url, filter);
        let mut builder = self.http_client.get(url);
        let mut query_params: Vec<(&str, String)> = Vec::new();
        if let Some(f) = filter {
            query_params.push(("filter", f.to_string()));
        }
        if let Some(si) = start_index {
            query_params.push(("startIndex", si.to_string()));
        }
        if let Some(c) = count {
            query_params.push(("count", c.to_string()));
        }
        if !query_params.is_empty() {
            builder = builder.query(&query_params);
        }
        let response = self.auth.apply(builder).send().await?;
        self.handle_response(response).await
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> ScimClientResult<T> {
        debug!("SCIM GET {}", url);
        let response = self.auth.apply(self.http_client.get(url)).send().await?;
        self.handle_response(response).await
    }

    async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> ScimClientResult<T> {
        debug!("SCIM POST {}", url);
        let response = self
            .auth
            .apply(self.http_client.post(url))
            .header("Content-Type", "application/scim+json")
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> ScimClientResult<T> {
        debug!("SCIM PUT {}", url);
        let response = self
            .auth
            .apply(self.http_client.put(url))
            .header("Content-Type", "application/scim+json")
            .json(body)
            .send()
            .await?;
        self.handle_response(response).await
    }

    /// PATCH; a 204 or an empty body yields `None`.
    async fn patch<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
    ) -> ScimClientResult<Option<T>> {
        debug!("SCIM PATCH {}", url);
        let response = self
            .auth
            .apply(self.http_client.patch(url))
            .header("Content-Type", "application/scim+json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Self::handle_error_response(response).await;
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| ScimClientError::ParseError(format!("Failed to parse response: {e}")))
    }

    // ── Response Handling ─────────────────────────────────────────────

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> ScimClientResult<T> {
        if response.status().is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body)
                .map_err(|e| ScimClientError::ParseError(format!("Failed to parse response: {e}")))
        } else {
            Self::handle_error_response(response).await
        }
    }

    async fn handle_error_response<T>(response: reqwest::Response) -> ScimClientResult<T> {
        let status = response.status();

        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        let detail = if body.is_empty() {
            format!("HTTP {status}")
        } else {
            body
        };

        match status {
            StatusCode::NOT_FOUND => Err(ScimClientError::NotFound(detail)),
            StatusCode::CONFLICT => Err(ScimClientError::Conflict(detail)),
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("Remote directory rate limited, retry after {:?}s", retry_after);
                Err(ScimClientError::RateLimited {
                    retry_after_secs: retry_after,
                })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ScimClientError::AuthError(
                format!("Authentication failed ({status}): {detail}"),
            )),
            s if s.is_server_error() => Err(ScimClientError::Unavailable {
                status: s.as_u16(),
                detail,
            }),
            s => Err(ScimClientError::Rejected {
                status: s.as_u16(),
                detail,
            }),
        }
    }
}
