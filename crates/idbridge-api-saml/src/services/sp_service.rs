//! Service Provider metadata store.

use crate::error::{SamlError, SamlResult};
use crate::services::sp_metadata_parser::parse_sp_metadata;
use idbridge_db::{DirectoryStore, ServiceProviderMetadata};
use std::sync::Arc;
use tracing::info;
use url::Url;

/// Upload, lookup and ACS resolution for SP metadata records.
#[derive(Clone)]
pub struct SpService {
    store: Arc<dyn DirectoryStore>,
}

impl SpService {
    #[must_use]
    pub fn new(store: Arc<dyn DirectoryStore>) -> Self {
        Self { store }
    }

    /// Parse and store a metadata document. Re-uploading an entity ID
    /// replaces the existing record.
    pub async fn upload(&self, xml: &str) -> SamlResult<ServiceProviderMetadata> {
        let parsed = parse_sp_metadata(xml)?;
        let replaced = self.store.get_sp_metadata(&parsed.entity_id).await?.is_some();
        let stored = self.store.upsert_sp_metadata(parsed).await?;

        info!(
            entity_id = %stored.entity_id,
            acs_url = %stored.acs_url,
            acs_endpoints = stored.acs_endpoints.len(),
            replaced,
            "SP metadata stored"
        );
        Ok(stored)
    }

    pub async fn list(&self) -> SamlResult<Vec<ServiceProviderMetadata>> {
        Ok(self.store.list_sp_metadata().await?)
    }

    pub async fn get(&self, entity_id: &str) -> SamlResult<ServiceProviderMetadata> {
        self.store
            .get_sp_metadata(entity_id)
            .await?
            .ok_or_else(|| SamlError::ServiceProviderNotFound(entity_id.to_string()))
    }

    pub async fn delete(&self, entity_id: &str) -> SamlResult<()> {
        if !self.store.delete_sp_metadata(entity_id).await? {
            return Err(SamlError::ServiceProviderNotFound(entity_id.to_string()));
        }
        info!(entity_id = %entity_id, "SP metadata deleted");
        Ok(())
    }

    /// The SP an `AuthnRequest` issuer refers to.
    pub async fn for_issuer(&self, issuer: &str) -> SamlResult<ServiceProviderMetadata> {
        self.store
            .get_sp_metadata(issuer)
            .await?
            .ok_or_else(|| SamlError::UnknownServiceProvider(issuer.to_string()))
    }
}

/// ACS URL to answer on. A requested URL must match a registered one;
/// without one the primary endpoint is used.
pub fn resolve_acs_url(
    sp: &ServiceProviderMetadata,
    requested: Option<&str>,
) -> SamlResult<String> {
    let registered = sp.acs_urls();
    let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(sp.acs_url.clone());
    };

    let wanted = normalize_url(requested);
    registered
        .iter()
        .find(|url| normalize_url(url) == wanted)
        .cloned()
        .ok_or_else(|| SamlError::AcsUrlMismatch {
            expected: registered.clone(),
            actual: requested.to_string(),
        })
}

/// Scheme and host case, default ports and a trailing slash do not matter.
fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => url.as_str().trim_end_matches('/').to_string(),
        Err(_) => raw.trim().trim_end_matches('/').to_ascii_lowercase(),
    }
}
