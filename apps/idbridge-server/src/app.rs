//! Wiring of store, remote client, engines and routers.

use crate::config::Config;
use crate::health::health_handler;
use axum::{routing::get, Router};
use idbridge_api_saml::{
    saml_router, IdpSettings, JitSettings, RedirectPolicy, SamlError, SamlState,
    SigningCredentials,
};
use idbridge_api_sync::{sync_router, SyncState};
use idbridge_db::{DirectoryStore, InMemoryStore};
use idbridge_scim_client::{Provisioner, ScimAuth, ScimClient, ScimClientError};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Failures that keep the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("SAML signing configuration: {0}")]
    Signing(#[from] SamlError),

    #[error("Remote directory client: {0}")]
    RemoteClient(#[from] ScimClientError),
}

/// Build the full router from configuration.
pub fn build_app(config: &Config) -> Result<Router, StartupError> {
    build_app_with_store(config, Arc::new(InMemoryStore::new()))
}

pub fn build_app_with_store(
    config: &Config,
    store: Arc<dyn DirectoryStore>,
) -> Result<Router, StartupError> {
    let credentials = SigningCredentials::from_pem(&config.saml_cert, &config.saml_key)?;

    let client = ScimClient::new(
        config.scim_base_url.clone(),
        ScimAuth::bearer(config.scim_token.clone()),
        config.scim_timeout,
    )?;
    let provisioner = Arc::new(Provisioner::new(store.clone(), client));

    let redirect_policy = RedirectPolicy::with_additional_domains(&config.saml_allowed_domains);
    info!(
        allowed_domains = ?redirect_policy.allowed_domains(),
        "Redirect allowlist configured"
    );

    let jit = JitSettings {
        enabled: config.jit_enabled,
        auto_sync: config.jit_auto_sync,
        default_role: config.jit_default_role.clone(),
    };
    info!(
        jit_enabled = jit.enabled,
        jit_auto_sync = jit.auto_sync,
        jit_default_role = ?jit.default_role,
        "JIT provisioning configured"
    );

    let saml_state = SamlState::new(
        store,
        IdpSettings::new(config.saml_issuer.clone(), config.backend_base_url.clone()),
        credentials,
        redirect_policy,
        jit,
    )
    .with_user_sync(provisioner.clone());

    let sync_state = SyncState::new(provisioner, config.sync_max_concurrency);

    Ok(Router::new()
        .route("/health", get(health_handler))
        .merge(saml_router(saml_state))
        .merge(sync_router(sync_state)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use openssl::asn1::Asn1Time;
    use openssl::hash::MessageDigest;
    use openssl::pkey::PKey;
    use openssl::rsa::Rsa;
    use openssl::x509::{X509Builder, X509NameBuilder};
    use tower::ServiceExt;

    fn pem_pair() -> (String, String) {
        let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let mut name = X509NameBuilder::new().unwrap();
        name.append_entry_by_text("CN", "idbridge-server-test").unwrap();
        let name = name.build();
        let mut builder = X509Builder::new().unwrap();
        builder.set_version(2).unwrap();
        builder.set_subject_name(&name).unwrap();
        builder.set_issuer_name(&name).unwrap();
        builder.set_pubkey(&pkey).unwrap();
        builder
            .set_not_before(&Asn1Time::days_from_now(0).unwrap())
            .unwrap();
        builder
            .set_not_after(&Asn1Time::days_from_now(1).unwrap())
            .unwrap();
        builder.sign(&pkey, MessageDigest::sha256()).unwrap();
        (
            String::from_utf8(builder.build().to_pem().unwrap()).unwrap(),
            String::from_utf8(pkey.private_key_to_pem_pkcs8().unwrap()).unwrap(),
        )
    }

    fn config(cert: &str, key: &str) -> Config {
        let (cert, key) = (cert.to_string(), key.to_string());
        Config::from_lookup(|var| match var {
            "SCIM_TOKEN" => Some("tok".to_string()),
            "SAML_CERT" => Some(cert.clone()),
            "SAML_KEY" => Some(key.clone()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_routers_are_merged() {
        let (cert, key) = pem_pair();
        let app = build_app(&config(&cert, &key)).unwrap();

        for (method, uri) in [
            ("GET", "/health"),
            ("GET", "/saml/metadata"),
            ("GET", "/saml/jit-config"),
            ("POST", "/sync/bulk/cancel"),
            ("GET", "/roles/external-values"),
        ] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .method(method)
                        .uri(uri)
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{method} {uri}");
        }
    }

    #[test]
    fn test_mismatched_key_refuses_to_start() {
        let (cert, _) = pem_pair();
        let (_, other_key) = pem_pair();
        let err = build_app(&config(&cert, &other_key)).unwrap_err();
        assert!(matches!(err, StartupError::Signing(_)));
    }
}
