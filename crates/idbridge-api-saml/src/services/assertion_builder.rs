//! Signed SAML Response construction.

use crate::error::{SamlError, SamlResult};
use crate::saml::{
    assertion_attributes, ResolvedAttribute, SigningCredentials, UserAttributes,
    NAMEID_FORMAT_EMAIL,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;
use xml_canonicalization::Canonicalizer;

/// How long an assertion stays valid after issue.
pub const ASSERTION_VALIDITY_MINUTES: i64 = 5;

/// Backdating of `NotBefore` to absorb SP clock drift.
const NOT_BEFORE_SKEW_MINUTES: i64 = 2;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Where and to whom the response is addressed.
#[derive(Debug, Clone)]
pub struct ResponseTarget<'a> {
    /// SP entity ID, used as the audience.
    pub audience: &'a str,
    /// ACS URL the browser posts the response to.
    pub acs_url: &'a str,
    /// `AuthnRequest` ID being answered.
    pub in_response_to: &'a str,
}

/// Builds and signs SAML Responses for one IdP identity.
#[derive(Debug, Clone)]
pub struct AssertionBuilder {
    idp_entity_id: String,
    credentials: SigningCredentials,
}

impl AssertionBuilder {
    #[must_use]
    pub fn new(idp_entity_id: impl Into<String>, credentials: SigningCredentials) -> Self {
        Self {
            idp_entity_id: idp_entity_id.into(),
            credentials,
        }
    }

    /// Signed response, base64 encoded for the `SAMLResponse` form field.
    pub fn build_response(
        &self,
        target: &ResponseTarget<'_>,
        user: &UserAttributes,
    ) -> SamlResult<String> {
        let xml = self.build_signed_xml(target, user, Utc::now())?;
        Ok(STANDARD.encode(xml.as_bytes()))
    }

    /// Signed response XML, before transport encoding.
    pub fn build_signed_xml(
        &self,
        target: &ResponseTarget<'_>,
        user: &UserAttributes,
        now: DateTime<Utc>,
    ) -> SamlResult<String> {
        if user.email.trim().is_empty() {
            return Err(SamlError::AssertionGenerationFailed(
                "Cannot determine NameID".to_string(),
            ));
        }

        let ids = ResponseIds {
            response: format!("_resp_{}", Uuid::new_v4()),
            assertion: format!("_assert_{}", Uuid::new_v4()),
            session: format!("_session_{}", Uuid::new_v4()),
        };
        let attributes = assertion_attributes(user);
        let xml = self.build_response_xml(&ids, target, &user.email, &attributes, now);
        self.sign_assertion(&xml, &ids.assertion)
    }

    fn build_response_xml(
        &self,
        ids: &ResponseIds,
        target: &ResponseTarget<'_>,
        name_id: &str,
        attributes: &[ResolvedAttribute],
        now: DateTime<Utc>,
    ) -> String {
        let issue_instant = now.format(TIME_FORMAT).to_string();
        let not_before = (now - Duration::minutes(NOT_BEFORE_SKEW_MINUTES))
            .format(TIME_FORMAT)
            .to_string();
        let not_on_or_after = (now + Duration::minutes(ASSERTION_VALIDITY_MINUTES))
            .format(TIME_FORMAT)
            .to_string();
        let in_response_to = xml_escape(target.in_response_to);
        let acs_url = xml_escape(target.acs_url);
        let issuer = xml_escape(&self.idp_entity_id);

        let mut xml = String::new();
        xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        xml.push_str("<samlp:Response xmlns:samlp=\"urn:oasis:names:tc:SAML:2.0:protocol\"\n");
        xml.push_str("    xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"\n");
        xml.push_str("    ID=\"");
        xml.push_str(&ids.response);
        xml.push_str("\"\n    Version=\"2.0\"\n    IssueInstant=\"");
        xml.push_str(&issue_instant);
        xml.push_str("\"\n    Destination=\"");
        xml.push_str(&acs_url);
        xml.push_str("\"\n    InResponseTo=\"");
        xml.push_str(&in_response_to);
        xml.push_str("\">\n    <saml:Issuer>");
        xml.push_str(&issuer);
        xml.push_str("</saml:Issuer>\n");
        xml.push_str("    <samlp:Status>\n        <samlp:StatusCode Value=\"urn:oasis:names:tc:SAML:2.0:status:Success\"/>\n    </samlp:Status>\n");

        xml.push_str("    <saml:Assertion xmlns:saml=\"urn:oasis:names:tc:SAML:2.0:assertion\"\n        ID=\"");
        xml.push_str(&ids.assertion);
        xml.push_str("\"\n        Version=\"2.0\"\n        IssueInstant=\"");
        xml.push_str(&issue_instant);
        xml.push_str("\">\n        <saml:Issuer>");
        xml.push_str(&issuer);
        xml.push_str("</saml:Issuer>\n");

        xml.push_str("        <saml:Subject>\n            <saml:NameID Format=\"");
        xml.push_str(NAMEID_FORMAT_EMAIL);
        xml.push_str("\">");
        xml.push_str(&xml_escape(name_id));
        xml.push_str("</saml:NameID>\n            <saml:SubjectConfirmation Method=\"urn:oasis:names:tc:SAML:2.0:cm:bearer\">\n                <saml:SubjectConfirmationData NotOnOrAfter=\"");
        xml.push_str(&not_on_or_after);
        xml.push_str("\" Recipient=\"");
        xml.push_str(&acs_url);
        xml.push_str("\" InResponseTo=\"");
        xml.push_str(&in_response_to);
        xml.push_str("\"/>\n            </saml:SubjectConfirmation>\n        </saml:Subject>\n");

        xml.push_str("        <saml:Conditions NotBefore=\"");
        xml.push_str(&not_before);
        xml.push_str("\" NotOnOrAfter=\"");
        xml.push_str(&not_on_or_after);
        xml.push_str("\">\n            <saml:AudienceRestriction>\n                <saml:Audience>");
        xml.push_str(&xml_escape(target.audience));
        xml.push_str("</saml:Audience>\n            </saml:AudienceRestriction>\n        </saml:Conditions>\n");

        xml.push_str("        <saml:AuthnStatement AuthnInstant=\"");
        xml.push_str(&issue_instant);
        xml.push_str("\" SessionIndex=\"");
        xml.push_str(&ids.session);
        xml.push_str("\">\n            <saml:AuthnContext>\n                <saml:AuthnContextClassRef>urn:oasis:names:tc:SAML:2.0:ac:classes:PasswordProtectedTransport</saml:AuthnContextClassRef>\n            </saml:AuthnContext>\n        </saml:AuthnStatement>\n");

        xml.push_str(&attributes_xml(attributes));
        xml.push_str("\n    </saml:Assertion>\n</samlp:Response>");
        xml
    }

    /// Enveloped signature over the assertion, inserted after its Issuer.
    fn sign_assertion(&self, response_xml: &str, assertion_id: &str) -> SamlResult<String> {
        let id_attr = format!("ID=\"{assertion_id}\"");
        let id_pos = response_xml.find(&id_attr).ok_or_else(|| {
            SamlError::AssertionGenerationFailed("Cannot find Assertion".to_string())
        })?;
        let assertion_start = response_xml[..id_pos].rfind('<').ok_or_else(|| {
            SamlError::AssertionGenerationFailed("Cannot find Assertion start".to_string())
        })?;
        let assertion_end = response_xml
            .rfind("</saml:Assertion>")
            .map(|pos| pos + "</saml:Assertion>".len())
            .ok_or_else(|| {
                SamlError::AssertionGenerationFailed("Cannot find Assertion end".to_string())
            })?;
        let after_issuer = response_xml[id_pos..]
            .find("</saml:Issuer>")
            .map(|pos| id_pos + pos + "</saml:Issuer>".len())
            .ok_or_else(|| {
                SamlError::AssertionGenerationFailed("Cannot find Issuer".to_string())
            })?;

        let canonical_assertion = canonicalize_xml(&response_xml[assertion_start..assertion_end])?;
        let digest = openssl::hash::hash(
            openssl::hash::MessageDigest::sha256(),
            canonical_assertion.as_bytes(),
        )
        .map_err(|e| SamlError::AssertionGenerationFailed(format!("Digest failed: {e}")))?;

        let signed_info = signed_info_xml(assertion_id, &STANDARD.encode(digest));
        let canonical_signed_info = canonicalize_xml(&signed_info)?;
        let signature = self
            .credentials
            .sign_sha256(canonical_signed_info.as_bytes())?;
        let certificate = self.credentials.certificate_base64_der()?;

        let mut signature_xml = String::new();
        signature_xml.push_str("\n        <ds:Signature xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">\n            ");
        signature_xml.push_str(&signed_info);
        signature_xml.push_str("\n            <ds:SignatureValue>");
        signature_xml.push_str(&STANDARD.encode(signature));
        signature_xml.push_str("</ds:SignatureValue>\n            <ds:KeyInfo>\n                <ds:X509Data>\n                    <ds:X509Certificate>");
        signature_xml.push_str(&certificate);
        signature_xml.push_str("</ds:X509Certificate>\n                </ds:X509Data>\n            </ds:KeyInfo>\n        </ds:Signature>");

        let mut signed = String::with_capacity(response_xml.len() + signature_xml.len());
        signed.push_str(&response_xml[..after_issuer]);
        signed.push_str(&signature_xml);
        signed.push_str(&response_xml[after_issuer..]);
        Ok(signed)
    }
}

struct ResponseIds {
    response: String,
    assertion: String,
    session: String,
}

fn signed_info_xml(reference_id: &str, digest_b64: &str) -> String {
    let mut s = String::new();
    s.push_str("<ds:SignedInfo xmlns:ds=\"http://www.w3.org/2000/09/xmldsig#\">");
    s.push_str("<ds:CanonicalizationMethod Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/>");
    s.push_str("<ds:SignatureMethod Algorithm=\"http://www.w3.org/2001/04/xmldsig-more#rsa-sha256\"/>");
    s.push_str("<ds:Reference URI=\"#");
    s.push_str(reference_id);
    s.push_str("\"><ds:Transforms>");
    s.push_str("<ds:Transform Algorithm=\"http://www.w3.org/2000/09/xmldsig#enveloped-signature\"/>");
    s.push_str("<ds:Transform Algorithm=\"http://www.w3.org/2001/10/xml-exc-c14n#\"/>");
    s.push_str("</ds:Transforms>");
    s.push_str("<ds:DigestMethod Algorithm=\"http://www.w3.org/2001/04/xmlenc#sha256\"/>");
    s.push_str("<ds:DigestValue>");
    s.push_str(digest_b64);
    s.push_str("</ds:DigestValue></ds:Reference></ds:SignedInfo>");
    s
}

fn attributes_xml(attributes: &[ResolvedAttribute]) -> String {
    if attributes.is_empty() {
        return String::new();
    }

    let mut attrs = String::from("        <saml:AttributeStatement>\n");
    for attr in attributes {
        attrs.push_str("            <saml:Attribute Name=\"");
        attrs.push_str(&xml_escape(&attr.name));
        attrs.push('"');
        if let Some(friendly) = &attr.friendly_name {
            attrs.push_str(" FriendlyName=\"");
            attrs.push_str(&xml_escape(friendly));
            attrs.push('"');
        }
        if let Some(format) = &attr.format {
            attrs.push_str(" NameFormat=\"");
            attrs.push_str(&xml_escape(format));
            attrs.push('"');
        }
        attrs.push_str(">\n");
        for value in &attr.values {
            attrs.push_str("                <saml:AttributeValue xmlns:xs=\"http://www.w3.org/2001/XMLSchema\" xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\" xsi:type=\"xs:string\">");
            attrs.push_str(&xml_escape(value));
            attrs.push_str("</saml:AttributeValue>\n");
        }
        attrs.push_str("            </saml:Attribute>\n");
    }
    attrs.push_str("        </saml:AttributeStatement>");
    attrs
}

/// Exclusive C14N without comments.
pub(crate) fn canonicalize_xml(xml: &str) -> SamlResult<String> {
    let mut output = Vec::new();
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| {
            SamlError::AssertionGenerationFailed(format!("XML canonicalization failed: {e}"))
        })?;

    String::from_utf8(output).map_err(|e| {
        SamlError::AssertionGenerationFailed(format!("Canonicalized XML is not valid UTF-8: {e}"))
    })
}

/// Escape text for XML content and attribute values. Also safe for HTML.
pub(crate) fn xml_escape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&apos;"),
            _ => result.push(c),
        }
    }
    result
}
