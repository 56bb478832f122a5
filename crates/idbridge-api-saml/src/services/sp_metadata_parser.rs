//! Service Provider metadata parsing.
//!
//! Each way a document can be unusable has its own diagnostic, so an operator
//! uploading the wrong file learns what is missing.

use crate::error::{SamlError, SamlResult};
use chrono::Utc;
use idbridge_db::{ServiceProviderMetadata, SpEndpoint};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const DEFAULT_BINDING: &str = "urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST";

/// Parse SP metadata into a storable record.
///
/// An `EntitiesDescriptor` wrapper is accepted; its first entity is used.
pub fn parse_sp_metadata(xml: &str) -> SamlResult<ServiceProviderMetadata> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::default();
    let mut depth: usize = 0;
    let mut saw_root = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| malformed(format!("{e} at position {}", reader.buffer_position())))?;
        match event {
            Event::Start(e) => {
                saw_root = true;
                depth += 1;
                state.open(&e, false)?;
            }
            Event::Empty(e) => {
                saw_root = true;
                state.open(&e, true)?;
            }
            Event::Text(t) if state.in_name_id_format => {
                let text = t
                    .unescape()
                    .map_err(|e| malformed(format!("invalid text: {e}")))?;
                let text = text.trim();
                if !text.is_empty() {
                    state.name_id_formats.push(text.to_string());
                }
            }
            Event::End(e) => {
                depth = depth.saturating_sub(1);
                state.close(e.local_name().as_ref());
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(malformed("document is empty".to_string()));
    }
    if depth != 0 {
        return Err(malformed("document ends inside an element".to_string()));
    }

    state.finish(xml)
}

fn malformed(detail: String) -> SamlError {
    SamlError::InvalidMetadata(format!("Metadata is not well-formed XML: {detail}"))
}

#[derive(Default)]
struct ParseState {
    entity_seen: bool,
    in_entity: bool,
    entity_id: Option<String>,
    sp_seen: bool,
    in_sp: bool,
    in_name_id_format: bool,
    acs: Vec<SpEndpoint>,
    slo: Vec<(String, String)>,
    name_id_formats: Vec<String>,
}

impl ParseState {
    fn open(&mut self, e: &BytesStart<'_>, empty: bool) -> SamlResult<()> {
        match e.local_name().as_ref() {
            b"EntityDescriptor" if !self.entity_seen => {
                self.entity_seen = true;
                self.entity_id = attribute(e, b"entityID").filter(|id| !id.trim().is_empty());
                self.in_entity = !empty;
            }
            b"SPSSODescriptor" if self.in_entity && !self.sp_seen => {
                self.sp_seen = true;
                self.in_sp = !empty;
            }
            b"AssertionConsumerService" if self.in_sp => {
                let location = attribute(e, b"Location")
                    .filter(|l| !l.trim().is_empty())
                    .ok_or_else(|| {
                        SamlError::InvalidMetadata(
                            "AssertionConsumerService is missing Location".to_string(),
                        )
                    })?;
                self.acs.push(SpEndpoint {
                    binding: attribute(e, b"Binding")
                        .unwrap_or_else(|| DEFAULT_BINDING.to_string()),
                    location: location.trim().to_string(),
                    index: attribute(e, b"index").and_then(|i| i.trim().parse().ok()),
                    is_default: attribute(e, b"isDefault")
                        .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
                });
            }
            b"SingleLogoutService" if self.in_sp => {
                if let Some(location) = attribute(e, b"Location") {
                    let binding =
                        attribute(e, b"Binding").unwrap_or_else(|| DEFAULT_BINDING.to_string());
                    self.slo.push((binding, location.trim().to_string()));
                }
            }
            b"NameIDFormat" if self.in_sp && !empty => self.in_name_id_format = true,
            _ => {}
        }
        Ok(())
    }

    fn close(&mut self, local_name: &[u8]) {
        match local_name {
            b"NameIDFormat" => self.in_name_id_format = false,
            b"SPSSODescriptor" => self.in_sp = false,
            b"EntityDescriptor" if self.in_entity => {
                self.in_entity = false;
                self.in_sp = false;
            }
            _ => {}
        }
    }

    fn finish(self, raw_xml: &str) -> SamlResult<ServiceProviderMetadata> {
        if !self.entity_seen {
            return Err(SamlError::InvalidMetadata(
                "No EntityDescriptor found".to_string(),
            ));
        }
        let entity_id = self.entity_id.ok_or_else(|| {
            SamlError::InvalidMetadata("EntityDescriptor is missing entityID".to_string())
        })?;
        if !self.sp_seen {
            return Err(SamlError::InvalidMetadata(
                "No SPSSODescriptor found".to_string(),
            ));
        }

        let primary = self
            .acs
            .iter()
            .find(|ep| ep.is_default)
            .or_else(|| self.acs.first())
            .cloned()
            .ok_or_else(|| {
                SamlError::InvalidMetadata(
                    "SPSSODescriptor has no AssertionConsumerService".to_string(),
                )
            })?;

        let (slo_binding, slo_url) = match self.slo.into_iter().next() {
            Some((binding, url)) => (Some(binding), Some(url)),
            None => (None, None),
        };

        Ok(ServiceProviderMetadata {
            entity_id: entity_id.trim().to_string(),
            acs_url: primary.location,
            acs_binding: primary.binding,
            acs_endpoints: self.acs,
            slo_url,
            slo_binding,
            name_id_formats: self.name_id_formats,
            raw_xml: raw_xml.to_string(),
            updated_at: Utc::now(),
        })
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATADOG_SP: &str = r#"<?xml version="1.0"?>
<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://app.datadoghq.com/account/saml/metadata.xml">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:SingleLogoutService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-Redirect" Location="https://app.datadoghq.com/account/saml/logout"/>
    <md:NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress</md:NameIDFormat>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://app.datadoghq.com/account/saml/assertion" index="0"/>
    <md:AssertionConsumerService Binding="urn:oasis:names:tc:SAML:2.0:bindings:HTTP-POST" Location="https://app.datadoghq.com/account/saml/assertion/alt" index="1" isDefault="true"/>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#;

    fn message(xml: &str) -> String {
        match parse_sp_metadata(xml).unwrap_err() {
            SamlError::InvalidMetadata(msg) => msg,
            other => panic!("expected InvalidMetadata, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_full_document() {
        let md = parse_sp_metadata(DATADOG_SP).unwrap();
        assert_eq!(
            md.entity_id,
            "https://app.datadoghq.com/account/saml/metadata.xml"
        );
        assert_eq!(md.acs_endpoints.len(), 2);
        assert_eq!(
            md.acs_url,
            "https://app.datadoghq.com/account/saml/assertion/alt"
        );
        assert_eq!(md.acs_endpoints[0].index, Some(0));
        assert_eq!(
            md.slo_url.as_deref(),
            Some("https://app.datadoghq.com/account/saml/logout")
        );
        assert_eq!(
            md.name_id_formats,
            vec!["urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress"]
        );
        assert_eq!(md.raw_xml, DATADOG_SP);
    }

    #[test]
    fn test_first_acs_is_primary_without_default() {
        let xml = DATADOG_SP.replace(" isDefault=\"true\"", "");
        let md = parse_sp_metadata(&xml).unwrap();
        assert_eq!(md.acs_url, "https://app.datadoghq.com/account/saml/assertion");
    }

    #[test]
    fn test_entities_descriptor_uses_first_entity() {
        let inner = DATADOG_SP.trim_start_matches("<?xml version=\"1.0\"?>\n");
        let second = inner.replace(
            "https://app.datadoghq.com/account/saml/metadata.xml",
            "https://other.example.com",
        );
        let xml = format!(
            "<md:EntitiesDescriptor xmlns:md=\"urn:oasis:names:tc:SAML:2.0:metadata\">{inner}{second}</md:EntitiesDescriptor>"
        );
        let md = parse_sp_metadata(&xml).unwrap();
        assert_eq!(
            md.entity_id,
            "https://app.datadoghq.com/account/saml/metadata.xml"
        );
        assert_eq!(md.acs_endpoints.len(), 2);
    }

    #[test]
    fn test_not_well_formed() {
        assert!(message("<md:EntityDescriptor entityID=\"x\"><md:SPSSODescriptor></md:EntityDescriptor>")
            .starts_with("Metadata is not well-formed XML"));
        assert!(message("").starts_with("Metadata is not well-formed XML"));
    }

    #[test]
    fn test_no_entity_descriptor() {
        assert_eq!(message("<root><child/></root>"), "No EntityDescriptor found");
    }

    #[test]
    fn test_missing_entity_id() {
        let xml = DATADOG_SP.replace(
            " entityID=\"https://app.datadoghq.com/account/saml/metadata.xml\"",
            "",
        );
        assert_eq!(message(&xml), "EntityDescriptor is missing entityID");
    }

    #[test]
    fn test_idp_metadata_has_no_sp_descriptor() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://idp">
  <md:IDPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol"/>
</md:EntityDescriptor>"#;
        assert_eq!(message(xml), "No SPSSODescriptor found");
    }

    #[test]
    fn test_missing_acs() {
        let xml = r#"<md:EntityDescriptor xmlns:md="urn:oasis:names:tc:SAML:2.0:metadata" entityID="https://sp">
  <md:SPSSODescriptor protocolSupportEnumeration="urn:oasis:names:tc:SAML:2.0:protocol">
    <md:NameIDFormat>urn:oasis:names:tc:SAML:1.1:nameid-format:emailAddress</md:NameIDFormat>
  </md:SPSSODescriptor>
</md:EntityDescriptor>"#;
        assert_eq!(message(xml), "SPSSODescriptor has no AssertionConsumerService");
    }

    #[test]
    fn test_acs_missing_location() {
        let xml = DATADOG_SP.replace(
            " Location=\"https://app.datadoghq.com/account/saml/assertion\"",
            "",
        );
        assert_eq!(message(&xml), "AssertionConsumerService is missing Location");
    }
}
