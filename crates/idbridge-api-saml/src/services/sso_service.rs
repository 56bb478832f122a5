//! One SP-initiated login, from `AuthnRequest` to signed response.
//!
//! The steps run in a fixed order: parse the request, resolve the SP and its
//! ACS URL, check every redirect target, then resolve the user. No user
//! lookup happens for a request whose targets fail the policy.

use crate::config::JitSettings;
use crate::error::{SamlError, SamlResult};
use crate::saml::UserAttributes;
use crate::services::assertion_builder::{AssertionBuilder, ResponseTarget};
use crate::services::redirect_policy::RedirectPolicy;
use crate::services::request_parser::{ParsedAuthnRequest, RequestParser};
use crate::services::sp_service::{resolve_acs_url, SpService};
use idbridge_db::{DirectoryStore, NewUser, SyncStatus, User};
use idbridge_roles::RoleResolver;
use idbridge_scim_client::UserSync;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

/// Fields submitted by the login form.
#[derive(Debug, Clone, Default)]
pub struct LoginAttempt {
    pub email: String,
    pub saml_request: String,
    pub relay_state: Option<String>,
    /// User opted into JIT provisioning on the form.
    pub jit_requested: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
}

/// A successful login, ready to render as an auto-submit form.
#[derive(Debug, Clone)]
pub struct SsoOutcome {
    pub acs_url: String,
    /// Base64 signed `samlp:Response`.
    pub saml_response: String,
    pub relay_state: Option<String>,
    pub user_id: Uuid,
    pub jit_provisioned: bool,
}

/// Runs the login state machine against the local directory.
#[derive(Clone)]
pub struct SsoService {
    store: Arc<dyn DirectoryStore>,
    sp_service: SpService,
    roles: RoleResolver,
    builder: AssertionBuilder,
    redirect_policy: RedirectPolicy,
    jit: JitSettings,
    user_sync: Option<Arc<dyn UserSync>>,
}

impl SsoService {
    #[must_use]
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        builder: AssertionBuilder,
        redirect_policy: RedirectPolicy,
        jit: JitSettings,
    ) -> Self {
        Self {
            sp_service: SpService::new(store.clone()),
            roles: RoleResolver::new(store.clone()),
            store,
            builder,
            redirect_policy,
            jit,
            user_sync: None,
        }
    }

    /// Remote sync used for JIT users when `auto_sync` is on.
    #[must_use]
    pub fn with_user_sync(mut self, user_sync: Arc<dyn UserSync>) -> Self {
        self.user_sync = Some(user_sync);
        self
    }

    #[must_use]
    pub fn jit_settings(&self) -> &JitSettings {
        &self.jit
    }

    /// Validate the encoded request without authenticating anyone.
    pub fn inspect_request(&self, saml_request: &str) -> SamlResult<ParsedAuthnRequest> {
        RequestParser::parse_encoded(saml_request)
    }

    pub async fn authenticate(&self, attempt: &LoginAttempt) -> SamlResult<SsoOutcome> {
        let request = RequestParser::parse_encoded(&attempt.saml_request)?;
        let sp = self.sp_service.for_issuer(&request.issuer).await?;
        let acs_url = resolve_acs_url(&sp, request.assertion_consumer_service_url.as_deref())?;

        let relay_state = attempt
            .relay_state
            .as_deref()
            .map(str::trim)
            .filter(|rs| !rs.is_empty())
            .map(str::to_string);
        self.check_redirects(&acs_url, relay_state.as_deref())?;

        let (user, jit_provisioned) = self.resolve_user(attempt).await?;
        let roles = self.roles.external_values_for(&user).await?;
        let attributes = UserAttributes::from_user(&user, roles);

        let target = ResponseTarget {
            audience: &sp.entity_id,
            acs_url: &acs_url,
            in_response_to: &request.id,
        };
        let saml_response = self.builder.build_response(&target, &attributes)?;

        info!(
            user_id = %user.id,
            sp_entity_id = %sp.entity_id,
            request_id = %request.id,
            roles = attributes.roles.len(),
            jit_provisioned,
            "SAML assertion issued"
        );

        Ok(SsoOutcome {
            acs_url,
            saml_response,
            relay_state,
            user_id: user.id,
            jit_provisioned,
        })
    }

    /// The ACS URL always, and the relay state when it is an absolute URL.
    /// Opaque relay tokens pass through untouched.
    fn check_redirects(&self, acs_url: &str, relay_state: Option<&str>) -> SamlResult<()> {
        self.redirect_policy.validate(acs_url)?;
        if let Some(relay_state) = relay_state {
            if relay_state.len() > crate::services::redirect_policy::MAX_REDIRECT_LENGTH
                || Url::parse(relay_state).is_ok()
            {
                self.redirect_policy.validate(relay_state)?;
            }
        }
        Ok(())
    }

    async fn resolve_user(&self, attempt: &LoginAttempt) -> SamlResult<(User, bool)> {
        let email = attempt.email.trim();
        if email.is_empty() {
            return Err(SamlError::InvalidAuthnRequest("Missing email".to_string()));
        }

        match self.store.find_user_by_email(email).await? {
            Some(user) if user.active => Ok((user, false)),
            Some(user) => {
                warn!(user_id = %user.id, "SAML login for inactive user");
                Err(SamlError::UserInactive(email.to_string()))
            }
            None if self.jit.enabled && attempt.jit_requested => {
                let user = self.provision_jit_user(email, attempt).await?;
                Ok((user, true))
            }
            None => {
                warn!(
                    jit_enabled = self.jit.enabled,
                    jit_requested = attempt.jit_requested,
                    "SAML login for unknown user without JIT"
                );
                Err(SamlError::JitDisallowed(email.to_string()))
            }
        }
    }

    async fn provision_jit_user(&self, email: &str, attempt: &LoginAttempt) -> SamlResult<User> {
        let new_user = jit_user(email, attempt);
        let user = self
            .store
            .insert_user(new_user)
            .await
            .map_err(|e| SamlError::JitProvisioningFailed(e.to_string()))?;
        info!(user_id = %user.id, "JIT user created");

        self.assign_jit_role(&user).await;

        if self.jit.auto_sync {
            if let Some(user_sync) = &self.user_sync {
                match user_sync.sync_user(user.id).await {
                    Ok(synced) if synced.sync_status == SyncStatus::Synced => {
                        info!(user_id = %user.id, "JIT user synced to remote directory");
                    }
                    Ok(synced) => warn!(
                        user_id = %user.id,
                        status = %synced.sync_status,
                        error = synced.sync_error.as_deref().unwrap_or_default(),
                        "JIT remote sync did not complete, login continues"
                    ),
                    Err(e) => warn!(
                        user_id = %user.id,
                        error = %e,
                        "JIT remote sync failed, login continues"
                    ),
                }
            }
        }

        // Reload for the role set and any sync outcome.
        Ok(self.store.get_user(user.id).await?.unwrap_or(user))
    }

    async fn assign_jit_role(&self, user: &User) {
        let role = match self.pick_jit_role().await {
            Ok(Some(role)) => role,
            Ok(None) => {
                warn!(user_id = %user.id, "No default role for JIT user");
                return;
            }
            Err(e) => {
                error!(user_id = %user.id, error = %e, "Default role lookup failed");
                return;
            }
        };

        match self.roles.assign(role.id, user.id).await {
            Ok(_) => info!(user_id = %user.id, role = %role.name, "Default role assigned"),
            Err(e) => error!(
                user_id = %user.id,
                role = %role.name,
                error = %e,
                "Default role assignment failed"
            ),
        }
    }

    async fn pick_jit_role(&self) -> SamlResult<Option<idbridge_db::Role>> {
        if let Some(name) = self.jit.default_role.as_deref() {
            match self.roles.role_by_name(name).await? {
                Some(role) if role.active => return Ok(Some(role)),
                _ => warn!(role = %name, "Configured JIT role missing or inactive, using default role"),
            }
        }
        Ok(self.roles.default_role().await?)
    }
}

fn jit_user(email: &str, attempt: &LoginAttempt) -> NewUser {
    let clean = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    let local_part = email.split('@').next().unwrap_or(email).to_string();

    NewUser {
        username: email.to_string(),
        email: email.to_string(),
        first_name: clean(&attempt.first_name).or(Some(local_part)),
        last_name: clean(&attempt.last_name),
        title: clean(&attempt.title),
        active: true,
    }
}
