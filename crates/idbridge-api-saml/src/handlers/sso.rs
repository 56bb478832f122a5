//! Browser login flow: email form, then signed response.

use crate::error::SamlError;
use crate::handlers::pages::{
    auto_submit_form, failure_page, login_form, logout_page, missing_request_page,
};
use crate::handlers::SamlState;
use crate::services::LoginAttempt;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    Form,
};
use serde::Deserialize;

/// `SAMLRequest` and `RelayState` as sent by the SP.
#[derive(Debug, Default, Deserialize)]
pub struct LoginParams {
    #[serde(rename = "SAMLRequest")]
    pub saml_request: Option<String>,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Fields posted by the login form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidateForm {
    pub email: String,
    #[serde(rename = "SAMLRequest")]
    pub saml_request: String,
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
    /// Checkbox value; any of `true`, `on`, `1` opts in.
    pub jit: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub title: Option<String>,
}

impl ValidateForm {
    fn jit_requested(&self) -> bool {
        self.jit
            .as_deref()
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "on" | "1"))
            .unwrap_or(false)
    }

    fn into_attempt(self) -> LoginAttempt {
        let jit_requested = self.jit_requested();
        LoginAttempt {
            email: self.email,
            saml_request: self.saml_request,
            relay_state: self.relay_state,
            jit_requested,
            first_name: self.first_name,
            last_name: self.last_name,
            title: self.title,
        }
    }
}

/// SP-initiated login via HTTP-Redirect binding
pub async fn login_get(State(state): State<SamlState>, Query(params): Query<LoginParams>) -> Response {
    render_login(&state, params)
}

/// SP-initiated login via HTTP-POST binding
pub async fn login_post(State(state): State<SamlState>, Form(params): Form<LoginParams>) -> Response {
    render_login(&state, params)
}

fn render_login(state: &SamlState, params: LoginParams) -> Response {
    let Some(saml_request) = params.saml_request.filter(|r| !r.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, Html(missing_request_page())).into_response();
    };

    match state.sso.inspect_request(&saml_request) {
        Ok(request) => {
            tracing::info!(
                request_id = %request.id,
                issuer = %request.issuer,
                has_relay_state = params.relay_state.is_some(),
                "SAML login initiated"
            );
            Html(login_form(
                &saml_request,
                params.relay_state.as_deref(),
                state.sso.jit_settings().enabled,
            ))
            .into_response()
        }
        Err(e) => failure_response(&e),
    }
}

/// Authenticate the submitted email and post the signed response to the SP
pub async fn validate(State(state): State<SamlState>, Form(form): Form<ValidateForm>) -> Response {
    let attempt = form.into_attempt();
    match state.sso.authenticate(&attempt).await {
        Ok(outcome) => Html(auto_submit_form(
            &outcome.acs_url,
            &outcome.saml_response,
            outcome.relay_state.as_deref(),
        ))
        .into_response(),
        Err(e) => failure_response(&e),
    }
}

/// Opaque failure page. Every authentication failure answers 401, whatever
/// the cause; only server-side faults keep their own status.
fn failure_response(err: &SamlError) -> Response {
    let (status, code, _) = err.classify();
    let status = if err.is_authentication_failure() {
        tracing::warn!(error = %err, code, "SAML authentication failed");
        StatusCode::UNAUTHORIZED
    } else {
        tracing::error!(error = %err, code, "SAML authentication error");
        status
    };
    (status, Html(failure_page())).into_response()
}

/// Single logout via HTTP-Redirect binding
pub async fn logout_get(Query(params): Query<LoginParams>) -> Html<String> {
    render_logout(&params)
}

/// Single logout via HTTP-POST binding
pub async fn logout_post(Form(params): Form<LoginParams>) -> Html<String> {
    render_logout(&params)
}

// No IdP session is kept, so there is nothing to terminate server-side.
fn render_logout(params: &LoginParams) -> Html<String> {
    tracing::info!(
        has_saml_request = params.saml_request.is_some(),
        has_relay_state = params.relay_state.is_some(),
        "SAML logout"
    );
    Html(logout_page())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jit_checkbox_values() {
        let form = |v: Option<&str>| ValidateForm {
            jit: v.map(String::from),
            ..ValidateForm::default()
        };
        assert!(form(Some("on")).jit_requested());
        assert!(form(Some("TRUE")).jit_requested());
        assert!(!form(Some("false")).jit_requested());
        assert!(!form(None).jit_requested());
    }

    #[test]
    fn test_authentication_failures_share_one_status() {
        for err in [
            SamlError::RedirectRejected("javascript:alert(1)".into()),
            SamlError::JitDisallowed("nobody@co.com".into()),
            SamlError::UnknownServiceProvider("https://unknown.example.com".into()),
            SamlError::InvalidAuthnRequest("truncated".into()),
        ] {
            assert_eq!(failure_response(&err).status(), StatusCode::UNAUTHORIZED, "{err}");
        }
        let fault = SamlError::SignatureConfiguration("bad key".into());
        assert_eq!(
            failure_response(&fault).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
