//! HTML pages of the browser flow.

use crate::services::assertion_builder::xml_escape;

/// Email form shown after the SP redirects the browser here.
#[must_use]
pub fn login_form(saml_request: &str, relay_state: Option<&str>, jit_enabled: bool) -> String {
    let jit_option = if jit_enabled {
        r#"
        <label class="jit"><input type="checkbox" name="jit" value="true"/> Create my account if it does not exist</label>"#
    } else {
        ""
    };

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>SAML Login</title>
</head>
<body>
    <h2>Sign in</h2>
    <form method="POST" action="/saml/validate">
        <input type="hidden" name="SAMLRequest" value="{}"/>
        <input type="hidden" name="RelayState" value="{}"/>
        <label for="email">Email address</label>
        <input type="email" id="email" name="email" required/>{}
        <input type="submit" value="Continue"/>
    </form>
</body>
</html>"#,
        xml_escape(saml_request),
        xml_escape(relay_state.unwrap_or_default()),
        jit_option
    )
}

/// Form that posts the signed response to the SP on load.
#[must_use]
pub fn auto_submit_form(acs_url: &str, saml_response: &str, relay_state: Option<&str>) -> String {
    let relay_input = relay_state
        .map(|rs| {
            format!(
                r#"<input type="hidden" name="RelayState" value="{}"/>"#,
                xml_escape(rs)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>SAML SSO</title>
</head>
<body onload="document.forms[0].submit()">
    <noscript>
        <p>JavaScript is disabled. Click the button below to continue.</p>
    </noscript>
    <form method="POST" action="{}">
        <input type="hidden" name="SAMLResponse" value="{}"/>
        {}
        <noscript>
            <input type="submit" value="Continue"/>
        </noscript>
    </form>
</body>
</html>"#,
        xml_escape(acs_url),
        xml_escape(saml_response),
        relay_input
    )
}

/// The one page every failed login sees.
#[must_use]
pub fn failure_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Sign-in failed</title>
</head>
<body>
    <h2>Sign-in failed</h2>
    <p>We could not sign you in. Contact your administrator if this keeps happening.</p>
</body>
</html>"#
        .to_string()
}

/// Direct visit to the login URL without a `SAMLRequest`.
#[must_use]
pub fn missing_request_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>SAML Error</title>
</head>
<body>
    <h2>SAML Authentication Error</h2>
    <p>This endpoint requires a SAML request from the Service Provider.</p>
    <p>Start the login from the application's single sign-on link.</p>
</body>
</html>"#
        .to_string()
}

/// Confirmation shown after single logout.
#[must_use]
pub fn logout_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>SAML Logout</title>
</head>
<body>
    <h2>Logout Successful</h2>
    <p>You have been signed out of the identity provider.</p>
</body>
</html>"#
        .to_string()
}
