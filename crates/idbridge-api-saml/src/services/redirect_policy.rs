//! Open-redirect guard for targets the browser is sent to.

use crate::error::{SamlError, SamlResult};
use tracing::warn;
use url::Url;

/// Longest redirect target accepted.
pub const MAX_REDIRECT_LENGTH: usize = 2048;

/// Hosts always trusted. Subdomains of each entry are trusted too.
pub const DEFAULT_ALLOWED_DOMAINS: &[&str] = &[
    "datadoghq.com",
    "datadoghq.eu",
    "us3.datadoghq.com",
    "us5.datadoghq.com",
    "ap1.datadoghq.com",
    "ddog-gov.com",
    "localhost",
    "127.0.0.1",
];

/// Host allowlist for redirect targets.
#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    allowed_domains: Vec<String>,
}

impl Default for RedirectPolicy {
    fn default() -> Self {
        Self {
            allowed_domains: DEFAULT_ALLOWED_DOMAINS
                .iter()
                .map(|d| (*d).to_string())
                .collect(),
        }
    }
}

impl RedirectPolicy {
    /// Default set plus `extra` domains. Blank entries are ignored.
    #[must_use]
    pub fn with_additional_domains<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut policy = Self::default();
        for domain in extra {
            let domain = normalize_host(domain.as_ref());
            if !domain.is_empty() && !policy.allowed_domains.contains(&domain) {
                policy.allowed_domains.push(domain);
            }
        }
        policy
    }

    #[must_use]
    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    /// Accept `target` only if it is a short http(s) URL on an allowed host.
    pub fn validate(&self, target: &str) -> SamlResult<Url> {
        if target.len() > MAX_REDIRECT_LENGTH {
            return self.reject(target, "target too long");
        }

        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(_) => return self.reject(target, "target is not an absolute URL"),
        };

        if !matches!(url.scheme(), "http" | "https") {
            return self.reject(target, "scheme not allowed");
        }

        let host = match url.host_str() {
            Some(host) => normalize_host(host),
            None => return self.reject(target, "target has no host"),
        };

        if !self.is_allowed_host(&host) {
            return self.reject(target, "host not in allowlist");
        }

        Ok(url)
    }

    #[must_use]
    pub fn is_allowed_host(&self, host: &str) -> bool {
        let host = normalize_host(host);
        self.allowed_domains.iter().any(|domain| {
            host == *domain
                || host
                    .strip_suffix(domain.as_str())
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    fn reject(&self, target: &str, reason: &str) -> SamlResult<Url> {
        let shown: String = target.chars().take(128).collect();
        warn!(redirect = %shown, reason, "Redirect target rejected");
        Err(SamlError::RedirectRejected(format!("{reason}: {shown}")))
    }
}

fn normalize_host(host: &str) -> String {
    host.trim().trim_end_matches('.').to_ascii_lowercase()
}
