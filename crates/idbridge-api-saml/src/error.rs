//! SAML-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use idbridge_db::DbError;
use idbridge_roles::RoleError;
use serde::Serialize;
use thiserror::Error;

/// Result type for SAML operations
pub type SamlResult<T> = Result<T, SamlError>;

/// SAML-specific errors
#[derive(Debug, Error)]
pub enum SamlError {
    /// Invalid or malformed `AuthnRequest`
    #[error("Invalid AuthnRequest: {0}")]
    InvalidAuthnRequest(String),

    /// The request issuer has no uploaded metadata
    #[error("Unknown Service Provider: {0}")]
    UnknownServiceProvider(String),

    /// ACS URL mismatch
    #[error("ACS URL mismatch: expected one of {expected:?}, got {actual}")]
    AcsUrlMismatch {
        expected: Vec<String>,
        actual: String,
    },

    /// Redirect target failed the security policy
    #[error("Redirect target rejected: {0}")]
    RedirectRejected(String),

    /// Missing or invalid signing key material. Fatal at startup.
    #[error("Signature configuration error: {0}")]
    SignatureConfiguration(String),

    /// Unknown user while JIT provisioning is off
    #[error("User {0} not found and JIT provisioning is disabled")]
    JitDisallowed(String),

    /// Known user with `active = false`
    #[error("User {0} is inactive")]
    UserInactive(String),

    /// Local JIT user creation failed
    #[error("JIT provisioning failed: {0}")]
    JitProvisioningFailed(String),

    /// Assertion generation failed
    #[error("Assertion generation failed: {0}")]
    AssertionGenerationFailed(String),

    /// Metadata generation failed
    #[error("Metadata generation failed: {0}")]
    MetadataGenerationFailed(String),

    /// Uploaded SP metadata could not be parsed
    #[error("Invalid SP metadata: {0}")]
    InvalidMetadata(String),

    /// No stored metadata for the entity ID
    #[error("Service Provider not found: {0}")]
    ServiceProviderNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] DbError),

    #[error("Role error: {0}")]
    Role(#[from] RoleError),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl SamlError {
    /// Whether this failure ends an authentication attempt. Those render the
    /// opaque failure page instead of a JSON body.
    #[must_use]
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            Self::RedirectRejected(_)
                | Self::JitDisallowed(_)
                | Self::UserInactive(_)
                | Self::JitProvisioningFailed(_)
                | Self::UnknownServiceProvider(_)
                | Self::AcsUrlMismatch { .. }
                | Self::InvalidAuthnRequest(_)
        )
    }

    /// HTTP status, stable error code and SAML status URN.
    #[must_use]
    pub fn classify(&self) -> (StatusCode, &'static str, Option<&'static str>) {
        match self {
            SamlError::InvalidAuthnRequest(_) => (
                StatusCode::BAD_REQUEST,
                "invalid_request",
                Some("urn:oasis:names:tc:SAML:2.0:status:Requester"),
            ),
            SamlError::UnknownServiceProvider(_) => (StatusCode::NOT_FOUND, "unknown_sp", None),
            SamlError::AcsUrlMismatch { .. } => (
                StatusCode::BAD_REQUEST,
                "acs_url_mismatch",
                Some("urn:oasis:names:tc:SAML:2.0:status:Requester"),
            ),
            SamlError::RedirectRejected(_) => {
                (StatusCode::BAD_REQUEST, "redirect_rejected", None)
            }
            SamlError::SignatureConfiguration(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "signature_configuration_error",
                Some("urn:oasis:names:tc:SAML:2.0:status:Responder"),
            ),
            SamlError::JitDisallowed(_) | SamlError::UserInactive(_) => (
                StatusCode::UNAUTHORIZED,
                "authentication_failed",
                Some("urn:oasis:names:tc:SAML:2.0:status:AuthnFailed"),
            ),
            SamlError::JitProvisioningFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "jit_provisioning_failed",
                Some("urn:oasis:names:tc:SAML:2.0:status:Responder"),
            ),
            SamlError::AssertionGenerationFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "assertion_generation_failed",
                Some("urn:oasis:names:tc:SAML:2.0:status:Responder"),
            ),
            SamlError::MetadataGenerationFailed(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "metadata_generation_failed",
                None,
            ),
            SamlError::InvalidMetadata(_) => (StatusCode::BAD_REQUEST, "invalid_metadata", None),
            SamlError::ServiceProviderNotFound(_) => (StatusCode::NOT_FOUND, "sp_not_found", None),
            SamlError::Store(DbError::NotFound(_)) => (StatusCode::NOT_FOUND, "not_found", None),
            SamlError::Store(DbError::Conflict(_)) => (StatusCode::CONFLICT, "conflict", None),
            SamlError::Store(DbError::Validation(_)) => {
                (StatusCode::BAD_REQUEST, "validation_error", None)
            }
            SamlError::Store(_) | SamlError::Role(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            SamlError::InternalError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        }
    }

    /// Message safe to show to a client. Internal detail is logged instead.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            SamlError::Store(DbError::NotFound(_) | DbError::Conflict(_) | DbError::Validation(_))
            | SamlError::InvalidMetadata(_)
            | SamlError::ServiceProviderNotFound(_)
            | SamlError::UnknownServiceProvider(_) => self.to_string(),
            SamlError::Store(e) => {
                tracing::error!(error = %e, "SAML store error");
                "A storage error occurred".to_string()
            }
            SamlError::Role(e) => {
                tracing::error!(error = %e, "SAML role error");
                "A storage error occurred".to_string()
            }
            SamlError::InternalError(msg) => {
                tracing::error!("SAML internal error: {}", msg);
                "An internal error occurred".to_string()
            }
            SamlError::SignatureConfiguration(msg) => {
                tracing::error!("SAML signing configuration error: {}", msg);
                "Signing is not configured".to_string()
            }
            SamlError::AssertionGenerationFailed(msg) => {
                tracing::error!("SAML assertion generation failed: {}", msg);
                "Assertion generation failed".to_string()
            }
            SamlError::MetadataGenerationFailed(msg) => {
                tracing::error!("SAML metadata generation failed: {}", msg);
                "Metadata generation failed".to_string()
            }
            SamlError::InvalidAuthnRequest(_) => "Invalid SAML authentication request".to_string(),
            SamlError::AcsUrlMismatch { .. } => {
                "ACS URL does not match any registered URL".to_string()
            }
            SamlError::RedirectRejected(_)
            | SamlError::JitDisallowed(_)
            | SamlError::UserInactive(_)
            | SamlError::JitProvisioningFailed(_) => "Authentication failed".to_string(),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saml_status: Option<String>,
}

impl IntoResponse for SamlError {
    fn into_response(self) -> Response {
        let (status, error_code, saml_status) = self.classify();

        let body = ErrorResponse {
            error: error_code.to_string(),
            message: self.public_message(),
            saml_status: saml_status.map(String::from),
        };

        (status, Json(body)).into_response()
    }
}
