//! Application configuration loaded from environment variables.
//!
//! Loading is fail-fast: a missing required variable or an unparsable value
//! stops startup with a message naming the variable.

use std::env;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors that can occur during environment loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {var}: {message}")]
    InvalidValue { var: String, message: String },

    #[error("Failed to parse port: {0}")]
    InvalidPort(#[from] std::num::ParseIntError),
}

/// Runtime configuration.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub rust_log: String,

    /// Public base URL of this service, used for SSO/SLO endpoint URLs.
    pub backend_base_url: String,

    pub scim_base_url: String,
    pub scim_token: String,
    pub scim_timeout: Duration,

    pub saml_issuer: String,
    /// PEM certificate.
    pub saml_cert: String,
    /// PEM private key.
    pub saml_key: String,

    pub jit_enabled: bool,
    pub jit_auto_sync: bool,
    pub jit_default_role: Option<String>,

    /// Extra redirect hosts on top of the built-in allowlist.
    pub saml_allowed_domains: Vec<String>,

    pub sync_max_concurrency: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("rust_log", &self.rust_log)
            .field("backend_base_url", &self.backend_base_url)
            .field("scim_base_url", &self.scim_base_url)
            .field("scim_token", &"[redacted]")
            .field("scim_timeout", &self.scim_timeout)
            .field("saml_issuer", &self.saml_issuer)
            .field("saml_key", &"[redacted]")
            .field("jit_enabled", &self.jit_enabled)
            .field("jit_auto_sync", &self.jit_auto_sync)
            .field("jit_default_role", &self.jit_default_role)
            .field("saml_allowed_domains", &self.saml_allowed_domains)
            .field("sync_max_concurrency", &self.sync_max_concurrency)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// does not parse.
    ///
    /// # Required Variables
    ///
    /// - `SCIM_TOKEN` - bearer token for the remote directory
    /// - `SAML_CERT` - IdP signing certificate (PEM)
    /// - `SAML_KEY` - IdP signing key (PEM)
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (development only)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let or_default = |var: &str, default: &str| optional(var).unwrap_or_else(|| default.to_string());
        let required = |var: &str| optional(var).ok_or_else(|| ConfigError::MissingVar(var.to_string()));

        let host = or_default("HOST", "0.0.0.0");
        let port: u16 = or_default("PORT", "8000").trim().parse()?;
        if port == 0 {
            return Err(ConfigError::InvalidValue {
                var: "PORT".to_string(),
                message: "Port must be between 1 and 65535".to_string(),
            });
        }

        let saml_cert = pem_from_env(&required("SAML_CERT")?);
        let saml_key = pem_from_env(&required("SAML_KEY")?);
        if !saml_key.contains("-----BEGIN") {
            return Err(ConfigError::InvalidValue {
                var: "SAML_KEY".to_string(),
                message: "Must be PEM format (should contain -----BEGIN)".to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            rust_log: or_default("RUST_LOG", "info"),
            backend_base_url: or_default("BACKEND_BASE_URL", "http://localhost:8000"),
            scim_base_url: or_default("SCIM_BASE_URL", "https://api.datadoghq.com/api/v2/scim"),
            scim_token: required("SCIM_TOKEN")?,
            scim_timeout: Duration::from_secs(parse_number(
                "SCIM_TIMEOUT_SECS",
                &or_default("SCIM_TIMEOUT_SECS", "30"),
            )?),
            saml_issuer: or_default("SAML_ISSUER", "https://my-idp.example.com/saml/metadata"),
            saml_cert,
            saml_key,
            jit_enabled: parse_bool("SAML_JIT_ENABLED", &or_default("SAML_JIT_ENABLED", "false"))?,
            jit_auto_sync: parse_bool(
                "SAML_JIT_AUTO_SYNC",
                &or_default("SAML_JIT_AUTO_SYNC", "true"),
            )?,
            jit_default_role: optional("SAML_JIT_DEFAULT_ROLE").map(|r| r.trim().to_string()),
            saml_allowed_domains: optional("SAML_ALLOWED_DOMAINS")
                .map(|s| {
                    s.split(',')
                        .map(|d| d.trim().to_lowercase())
                        .filter(|d| !d.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            sync_max_concurrency: parse_number(
                "SYNC_MAX_CONCURRENCY",
                &or_default("SYNC_MAX_CONCURRENCY", "5"),
            )?,
        })
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// PEM material often arrives with literal `\n` sequences in env files.
fn pem_from_env(value: &str) -> String {
    value.trim().replace("\\n", "\n")
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}

fn parse_number<T>(var: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
    T::Err: std::fmt::Display,
{
    let parsed: T = value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var: var.to_string(),
        message: e.to_string(),
    })?;
    if parsed < T::from(1u8) {
        return Err(ConfigError::InvalidValue {
            var: var.to_string(),
            message: "must be at least 1".to_string(),
        });
    }
    Ok(parsed)
}
