//! IdP metadata document.

use crate::config::IdpSettings;
use crate::error::SamlResult;
use crate::saml::{SigningCredentials, NAMEID_FORMAT_EMAIL};
use crate::services::assertion_builder::xml_escape;

const BINDING_POST: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";
const BINDING_REDIRECT: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect";

/// Renders the `EntityDescriptor` an SP imports to trust this IdP.
pub struct MetadataGenerator<'a> {
    settings: &'a IdpSettings,
    credentials: &'a SigningCredentials,
}

impl<'a> MetadataGenerator<'a> {
    #[must_use]
    pub fn new(settings: &'a IdpSettings, credentials: &'a SigningCredentials) -> Self {
        Self {
            settings,
            credentials,
        }
    }

    pub fn generate(&self) -> SamlResult<String> {
        let certificate = self.credentials.certificate_base64_der()?;
        let sso_url = xml_escape(&self.settings.sso_url());
        let slo_url = xml_escape(&self.settings.slo_url());

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<md:EntityDescriptor xmlns:md=\"urn:oasis:names:tc:SAML:2.0:metadata\" entityID=\"");
        xml.push_str(&xml_escape(&self.settings.issuer));
        xml.push_str("\">\n");
        xml.push_str("    <md:IDPSSODescriptor WantAuthnRequestsSigned=\"false\" protocolSupportEnumeration=\"urn:oasis:names:tc:SAML:2.0:protocol\">\n");
        xml.push_str("        <md:KeyDescriptor use=\"signing\">\n            <ds:KeyInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\n                <ds:X509Data>\n                    <ds:X509Certificate>");
        xml.push_str(&certificate);
        xml.push_str("</ds:X509Certificate>\n                </ds:X509Data>\n            </ds:KeyInfo>\n        </md:KeyDescriptor>\n");
        xml.push_str("        <md:SingleLogoutService Binding=\"");
        xml.push_str(BINDING_POST);
        xml.push_str("\" Location=\"");
        xml.push_str(&slo_url);
        xml.push_str("\"/>\n");
        xml.push_str("        <md:NameIDFormat>");
        xml.push_str(NAMEID_FORMAT_EMAIL);
        xml.push_str("</md:NameIDFormat>\n");
        for binding in [BINDING_POST, BINDING_REDIRECT] {
            xml.push_str("        <md:SingleSignOnService Binding=\"");
            xml.push_str(binding);
            xml.push_str("\" Location=\"");
            xml.push_str(&sso_url);
            xml.push_str("\"/>\n");
        }
        xml.push_str("    </md:IDPSSODescriptor>\n</md:EntityDescriptor>\n");
        Ok(xml)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::signing::test_support::self_signed_pem;

    #[test]
    fn test_metadata_lists_endpoints_and_certificate() {
        let (cert, key) = self_signed_pem();
        let creds = SigningCredentials::from_pem(&cert, &key).unwrap();
        let settings = IdpSettings::new("https://idp.example.com/saml/metadata", "http://localhost:8000");
        let xml = MetadataGenerator::new(&settings, &creds).generate().unwrap();

        assert!(xml.contains("entityID=\"https://idp.example.com/saml/metadata\""));
        assert!(xml.contains("WantAuthnRequestsSigned=\"false\""));
        assert_eq!(
            xml.matches("Location=\"http://localhost:8000/saml/login\"").count(),
            2
        );
        assert!(xml.contains(BINDING_REDIRECT));
        assert!(xml.contains("Location=\"http://localhost:8000/saml/logout\""));
        assert!(xml.contains(NAMEID_FORMAT_EMAIL));

        let der = creds.certificate_base64_der().unwrap();
        assert!(xml.contains(&der));
        assert!(!xml.contains("BEGIN CERTIFICATE"));
    }
}
