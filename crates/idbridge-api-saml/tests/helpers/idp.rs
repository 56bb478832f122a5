//! Throwaway IdP: self-signed credentials, in-memory directory, registered SP.

#![allow(dead_code)]

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use idbridge_api_saml::{
    IdpSettings, JitSettings, RedirectPolicy, SamlState, SigningCredentials, SpService,
};
use idbridge_db::{DirectoryStore, InMemoryStore, NewUser, User};
use openssl::asn1::Asn1Time;
use openssl::bn::BigNum;
use openssl::hash::MessageDigest;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509Builder, X509NameBuilder};
use std::sync::Arc;

pub const SP_ENTITY_ID: &str = "https://app.datadoghq.com/account/saml/metadata.xml";
pub const ACS_URL: &str = "https://app.datadoghq.com/account/saml/assertion";

pub fn self_signed_pem() -> (String, String) {
    let pkey = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();

    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", "idbridge-test-idp").unwrap();
    let name = name.build();

    let mut builder = X509Builder::new().unwrap();
    builder.set_version(2).unwrap();
    builder
        .set_serial_number(&BigNum::from_u32(7).unwrap().to_asn1_integer().unwrap())
        .unwrap();
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

pub fn credentials() -> SigningCredentials {
    let (cert, key) = self_signed_pem();
    SigningCredentials::from_pem(&cert, &key).unwrap()
}

pub fn sp_metadata_xml() -> String {
    format!(
        r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="{SP_ENTITY_ID}">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress</md:NameIDFormat>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="{ACS_URL}" index="0" isDefault="true"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#
    )
}

/// POST-binding `SAMLRequest` from the registered SP.
pub fn authn_request(id: &str) -> String {
    authn_request_from(SP_ENTITY_ID, id, Some(ACS_URL))
}

pub fn authn_request_from(issuer: &str, id: &str, acs_url: Option<&str>) -> String {
    let acs_attr = acs_url
        .map(|url| format!(" AssertionConsumerServiceURL=\"{url}\""))
        .unwrap_or_default();
    let xml = format!(
        r#"<samlp:AuthnRequest xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" xmlns:saml="urn:oasis:names:tc:SAML:2.0:assertion" ID="{id}" Version="2.0" IssueInstant="{}"{acs_attr}>
  <saml:Issuer>{issuer}</saml:Issuer>
</samlp:AuthnRequest>"#,
        Utc::now().format("%Y-%m-%dT%H:%M:%SZ")
    );
    STANDARD.encode(xml)
}

/// Decoded response XML from the auto-submit page or a base64 value.
pub fn decode_response(saml_response: &str) -> String {
    String::from_utf8(STANDARD.decode(saml_response).unwrap()).unwrap()
}

pub struct Idp {
    pub store: Arc<InMemoryStore>,
    pub state: SamlState,
}

impl Idp {
    pub async fn new(jit: JitSettings) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let state = SamlState::new(
            store.clone(),
            IdpSettings::new(
                "https://my-idp.example.com/saml/metadata",
                "http://localhost:8000",
            ),
            credentials(),
            RedirectPolicy::default(),
            jit,
        );
        SpService::new(store.clone())
            .upload(&sp_metadata_xml())
            .await
            .unwrap();
        Self { store, state }
    }

    pub async fn user(&self, email: &str) -> User {
        self.store
            .insert_user(NewUser {
                username: email.to_string(),
                email: email.to_string(),
                first_name: Some("Jane".to_string()),
                last_name: Some("Doe".to_string()),
                title: None,
                active: true,
            })
            .await
            .unwrap()
    }
}

pub fn jit_on() -> JitSettings {
    JitSettings {
        enabled: true,
        auto_sync: true,
        default_role: None,
    }
}
