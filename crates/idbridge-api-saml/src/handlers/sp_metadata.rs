//! SP metadata upload and management handlers

use crate::error::SamlError;
use crate::handlers::SamlState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use idbridge_db::{ServiceProviderMetadata, SpEndpoint};
use serde::Serialize;

/// Stored SP metadata without the source document.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SpMetadataSummary {
    pub entity_id: String,
    pub acs_url: String,
    pub acs_binding: String,
    pub acs_endpoints: Vec<SpEndpoint>,
    pub slo_url: Option<String>,
    pub slo_binding: Option<String>,
    pub name_id_formats: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<ServiceProviderMetadata> for SpMetadataSummary {
    fn from(md: ServiceProviderMetadata) -> Self {
        Self {
            entity_id: md.entity_id,
            acs_url: md.acs_url,
            acs_binding: md.acs_binding,
            acs_endpoints: md.acs_endpoints,
            slo_url: md.slo_url,
            slo_binding: md.slo_binding,
            name_id_formats: md.name_id_formats,
            updated_at: md.updated_at,
        }
    }
}

/// Upload SP metadata XML (raw request body)
pub async fn upload_sp_metadata(State(state): State<SamlState>, body: String) -> Response {
    if body.trim().is_empty() {
        return SamlError::InvalidMetadata("Metadata document is empty".to_string())
            .into_response();
    }
    match state.sp_service.upload(&body).await {
        Ok(md) => (StatusCode::OK, Json(SpMetadataSummary::from(md))).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "SP metadata upload rejected");
            e.into_response()
        }
    }
}

pub async fn list_sp_metadata(State(state): State<SamlState>) -> Response {
    match state.sp_service.list().await {
        Ok(records) => Json(
            records
                .into_iter()
                .map(SpMetadataSummary::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn get_sp_metadata(
    State(state): State<SamlState>,
    Path(entity_id): Path<String>,
) -> Response {
    match state.sp_service.get(&entity_id).await {
        Ok(md) => Json(SpMetadataSummary::from(md)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_sp_metadata(
    State(state): State<SamlState>,
    Path(entity_id): Path<String>,
) -> Response {
    match state.sp_service.delete(&entity_id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
