//! Explicit settings for the identity provider. Nothing here reads the environment.

use serde::Serialize;

/// Identity of this IdP.
#[derive(Debug, Clone)]
pub struct IdpSettings {
    /// Entity ID placed in `Issuer` and in the metadata document.
    pub issuer: String,
    /// Public base URL, used for the SSO and SLO endpoint locations.
    pub base_url: String,
}

impl IdpSettings {
    #[must_use]
    pub fn new(issuer: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    #[must_use]
    pub fn sso_url(&self) -> String {
        format!("{}/saml/login", self.base_url)
    }

    #[must_use]
    pub fn slo_url(&self) -> String {
        format!("{}/saml/logout", self.base_url)
    }
}

/// Just-in-time provisioning switches.
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct JitSettings {
    pub enabled: bool,
    /// Push the new user to the remote directory right after creation.
    pub auto_sync: bool,
    /// Role name for new users. `None` falls back to the default role.
    pub default_role: Option<String>,
}

impl Default for JitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            auto_sync: true,
            default_role: None,
        }
    }
}
