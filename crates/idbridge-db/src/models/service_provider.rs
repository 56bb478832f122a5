//! Remote Service Provider metadata record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A SAML endpoint advertised by a Service Provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SpEndpoint {
    pub binding: String,
    pub location: String,
    pub index: Option<u32>,
    pub is_default: bool,
}

/// Parsed metadata of a remote Service Provider. One record per entity ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ServiceProviderMetadata {
    /// SP entity identifier (URI).
    pub entity_id: String,

    /// Primary Assertion Consumer Service URL.
    pub acs_url: String,

    /// Binding of the primary ACS endpoint.
    pub acs_binding: String,

    /// Every ACS endpoint in document order.
    pub acs_endpoints: Vec<SpEndpoint>,

    pub slo_url: Option<String>,
    pub slo_binding: Option<String>,

    /// Supported NameID formats.
    pub name_id_formats: Vec<String>,

    /// Source XML document.
    pub raw_xml: String,

    pub updated_at: DateTime<Utc>,
}

impl ServiceProviderMetadata {
    /// All ACS locations, primary first.
    #[must_use]
    pub fn acs_urls(&self) -> Vec<String> {
        let mut urls = vec![self.acs_url.clone()];
        for ep in &self.acs_endpoints {
            if !urls.contains(&ep.location) {
                urls.push(ep.location.clone());
            }
        }
        urls
    }
}
