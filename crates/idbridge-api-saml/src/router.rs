//! SAML route definitions

use crate::handlers::{
    delete_sp_metadata, get_jit_config, get_metadata, get_sp_metadata, list_sp_metadata,
    login_get, login_post, logout_get, logout_post, upload_sp_metadata, validate, SamlState,
};
use axum::{
    routing::{get, post},
    Router,
};

/// Browser SSO endpoints plus SP metadata management.
pub fn saml_router(state: SamlState) -> Router {
    Router::new()
        .route("/saml/metadata", get(get_metadata))
        .route("/saml/login", get(login_get).post(login_post))
        .route("/saml/validate", post(validate))
        .route("/saml/logout", get(logout_get).post(logout_post))
        .route("/saml/jit-config", get(get_jit_config))
        .route(
            "/saml/sp-metadata",
            get(list_sp_metadata).post(upload_sp_metadata),
        )
        .route(
            "/saml/sp-metadata/:entity_id",
            get(get_sp_metadata).delete(delete_sp_metadata),
        )
        .with_state(state)
}
