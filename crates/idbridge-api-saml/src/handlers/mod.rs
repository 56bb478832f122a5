//! HTTP handlers for the SAML surface

pub mod metadata;
pub mod pages;
pub mod sp_metadata;
pub mod sso;

use crate::config::{IdpSettings, JitSettings};
use crate::saml::SigningCredentials;
use crate::services::{AssertionBuilder, RedirectPolicy, SpService, SsoService};
use idbridge_db::DirectoryStore;
use idbridge_scim_client::UserSync;
use std::sync::Arc;

pub use metadata::{get_jit_config, get_metadata};
pub use sp_metadata::{
    delete_sp_metadata, get_sp_metadata, list_sp_metadata, upload_sp_metadata,
    SpMetadataSummary,
};
pub use sso::{login_get, login_post, logout_get, logout_post, validate, LoginParams, ValidateForm};

/// Shared state of the SAML handlers
#[derive(Clone)]
pub struct SamlState {
    pub settings: IdpSettings,
    pub credentials: SigningCredentials,
    pub sso: SsoService,
    pub sp_service: SpService,
}

impl SamlState {
    #[must_use]
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        settings: IdpSettings,
        credentials: SigningCredentials,
        redirect_policy: RedirectPolicy,
        jit: JitSettings,
    ) -> Self {
        let builder = AssertionBuilder::new(settings.issuer.clone(), credentials.clone());
        Self {
            sso: SsoService::new(store.clone(), builder, redirect_policy, jit),
            sp_service: SpService::new(store),
            settings,
            credentials,
        }
    }

    /// Route JIT users through the remote sync.
    #[must_use]
    pub fn with_user_sync(mut self, user_sync: Arc<dyn UserSync>) -> Self {
        self.sso = self.sso.with_user_sync(user_sync);
        self
    }
}
