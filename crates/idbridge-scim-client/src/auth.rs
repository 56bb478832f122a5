//! Remote directory authentication (static bearer token).

use reqwest::RequestBuilder;

/// Credentials for the remote directory API.
///
/// The [`Debug`] impl redacts the token so it never reaches log output.
#[derive(Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type")]
pub enum ScimCredentials {
    /// Bearer token authentication.
    #[serde(rename = "bearer")]
    Bearer { token: String },
}

impl std::fmt::Debug for ScimCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Authentication handler applied to every outbound request.
#[derive(Debug, Clone)]
pub struct ScimAuth {
    credentials: ScimCredentials,
}

impl ScimAuth {
    #[must_use]
    pub fn new(credentials: ScimCredentials) -> Self {
        Self { credentials }
    }

    /// Shorthand for bearer-token credentials.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::new(ScimCredentials::Bearer {
            token: token.into(),
        })
    }

    /// Whether a usable token is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        match &self.credentials {
            ScimCredentials::Bearer { token } => !token.trim().is_empty(),
        }
    }

    /// Apply authentication to a request builder.
    #[must_use]
    pub fn apply(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.credentials {
            ScimCredentials::Bearer { token } => builder.bearer_auth(token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let auth = ScimAuth::bearer("super-secret");
        let rendered = format!("{auth:?}");
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn test_credentials_deserialize_tagged() {
        let creds: ScimCredentials =
            serde_json::from_str(r#"{"type":"bearer","token":"abc"}"#).unwrap();
        assert!(ScimAuth::new(creds).is_configured());
        assert!(!ScimAuth::bearer("  ").is_configured());
    }
}
