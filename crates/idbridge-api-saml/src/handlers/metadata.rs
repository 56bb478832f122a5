//! IdP metadata and JIT configuration handlers

use crate::config::JitSettings;
use crate::handlers::SamlState;
use crate::services::MetadataGenerator;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

/// Return `IdP` metadata XML
pub async fn get_metadata(State(state): State<SamlState>) -> Response {
    match MetadataGenerator::new(&state.settings, &state.credentials).generate() {
        Ok(xml) => {
            tracing::debug!(issuer = %state.settings.issuer, "IdP metadata requested");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/xml; charset=utf-8"),
                    (
                        header::CONTENT_DISPOSITION,
                        "attachment; filename=idp-metadata.xml",
                    ),
                ],
                xml,
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}

/// Current JIT provisioning switches
pub async fn get_jit_config(State(state): State<SamlState>) -> Json<JitSettings> {
    Json(state.sso.jit_settings().clone())
}
