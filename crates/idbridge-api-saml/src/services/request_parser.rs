//! Inbound `AuthnRequest` decoding.
//!
//! A `SAMLRequest` arrives base64 encoded. The HTTP-Redirect binding also
//! deflates it; the HTTP-POST binding does not. The login form round-trips
//! whatever the SP sent, so [`RequestParser::parse_encoded`] accepts both.

use crate::error::{SamlError, SamlResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use flate2::read::DeflateDecoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::io::Read;

/// Tolerated clock difference for `IssueInstant` in either direction.
const MAX_CLOCK_SKEW_SECS: i64 = 300;

/// Upper bound on the encoded `SAMLRequest`, checked before decoding.
const MAX_ENCODED_SIZE: usize = 512 * 1024;

/// Upper bound on the inflated XML.
const MAX_INFLATED_SIZE: u64 = 64 * 1024;

const MAX_REQUEST_ID_LENGTH: usize = 256;
const MAX_ISSUER_LENGTH: usize = 1024;

/// Fields of an `AuthnRequest` that drive the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAuthnRequest {
    pub id: String,
    pub issuer: String,
    pub assertion_consumer_service_url: Option<String>,
    pub protocol_binding: Option<String>,
    pub name_id_policy_format: Option<String>,
    pub issue_instant: DateTime<Utc>,
}

/// Stateless `AuthnRequest` parser.
pub struct RequestParser;

impl RequestParser {
    /// Decode either binding. Inflation is attempted when the decoded bytes
    /// are not already XML.
    pub fn parse_encoded(encoded: &str) -> SamlResult<ParsedAuthnRequest> {
        let decoded = Self::decode_base64(encoded)?;
        let looks_like_xml = decoded
            .iter()
            .find(|b| !b.is_ascii_whitespace())
            .is_some_and(|b| *b == b'<');

        let xml = if looks_like_xml {
            String::from_utf8(decoded)
                .map_err(|e| SamlError::InvalidAuthnRequest(format!("Invalid UTF-8: {e}")))?
        } else {
            Self::inflate(&decoded)?
        };
        Self::parse_xml(&xml)
    }

    /// HTTP-Redirect binding: deflate then base64.
    pub fn parse_redirect(encoded: &str) -> SamlResult<ParsedAuthnRequest> {
        let decoded = Self::decode_base64(encoded)?;
        let xml = Self::inflate(&decoded)?;
        Self::parse_xml(&xml)
    }

    /// HTTP-POST binding: base64 only.
    pub fn parse_post(encoded: &str) -> SamlResult<ParsedAuthnRequest> {
        let decoded = Self::decode_base64(encoded)?;
        let xml = String::from_utf8(decoded)
            .map_err(|e| SamlError::InvalidAuthnRequest(format!("Invalid UTF-8: {e}")))?;
        Self::parse_xml(&xml)
    }

    fn decode_base64(encoded: &str) -> SamlResult<Vec<u8>> {
        if encoded.len() > MAX_ENCODED_SIZE {
            return Err(SamlError::InvalidAuthnRequest(format!(
                "Encoded SAMLRequest exceeds maximum size ({} > {MAX_ENCODED_SIZE} bytes)",
                encoded.len()
            )));
        }
        // Form posts sometimes carry line breaks inside the base64 text.
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        STANDARD
            .decode(compact)
            .map_err(|e| SamlError::InvalidAuthnRequest(format!("Base64 decode failed: {e}")))
    }

    fn inflate(compressed: &[u8]) -> SamlResult<String> {
        let mut xml = String::new();
        DeflateDecoder::new(compressed)
            .take(MAX_INFLATED_SIZE)
            .read_to_string(&mut xml)
            .map_err(|e| SamlError::InvalidAuthnRequest(format!("Deflate decode failed: {e}")))?;

        if xml.len() as u64 >= MAX_INFLATED_SIZE {
            return Err(SamlError::InvalidAuthnRequest(
                "Inflated AuthnRequest exceeds maximum size (64 KiB)".to_string(),
            ));
        }
        Ok(xml)
    }

    fn parse_xml(xml: &str) -> SamlResult<ParsedAuthnRequest> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut root: Option<RootAttributes> = None;
        let mut issuer = None;
        let mut name_id_format = None;
        let mut in_issuer = false;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) | Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                    b"AuthnRequest" => root = Some(RootAttributes::read(&e)),
                    b"Issuer" if issuer.is_none() => in_issuer = true,
                    b"NameIDPolicy" => name_id_format = attribute(&e, b"Format"),
                    _ => {}
                },
                Ok(Event::Text(e)) if in_issuer => {
                    let text = e.unescape().map_err(|err| {
                        SamlError::InvalidAuthnRequest(format!("Invalid Issuer text: {err}"))
                    })?;
                    issuer = Some(text.trim().to_string());
                }
                Ok(Event::End(e)) if e.local_name().as_ref() == b"Issuer" => in_issuer = false,
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(SamlError::InvalidAuthnRequest(format!(
                        "XML parse error: {e}"
                    )));
                }
                _ => {}
            }
        }

        let root = root.ok_or_else(|| {
            SamlError::InvalidAuthnRequest("No AuthnRequest element".to_string())
        })?;

        let id = root
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| SamlError::InvalidAuthnRequest("Missing ID attribute".to_string()))?;
        if id.len() > MAX_REQUEST_ID_LENGTH {
            return Err(SamlError::InvalidAuthnRequest(format!(
                "ID attribute exceeds maximum length of {MAX_REQUEST_ID_LENGTH} characters"
            )));
        }

        let issuer = issuer
            .filter(|i| !i.is_empty())
            .ok_or_else(|| SamlError::InvalidAuthnRequest("Missing Issuer element".to_string()))?;
        if issuer.len() > MAX_ISSUER_LENGTH {
            return Err(SamlError::InvalidAuthnRequest(format!(
                "Issuer exceeds maximum length of {MAX_ISSUER_LENGTH} characters"
            )));
        }

        let raw_instant = root.issue_instant.ok_or_else(|| {
            SamlError::InvalidAuthnRequest("Missing IssueInstant attribute".to_string())
        })?;
        let issue_instant = check_issue_instant(&raw_instant, Utc::now())?;

        Ok(ParsedAuthnRequest {
            id,
            issuer,
            assertion_consumer_service_url: root.acs_url,
            protocol_binding: root.protocol_binding,
            name_id_policy_format: name_id_format,
            issue_instant,
        })
    }
}

#[derive(Default)]
struct RootAttributes {
    id: Option<String>,
    issue_instant: Option<String>,
    acs_url: Option<String>,
    protocol_binding: Option<String>,
}

impl RootAttributes {
    fn read(e: &BytesStart<'_>) -> Self {
        Self {
            id: attribute(e, b"ID"),
            issue_instant: attribute(e, b"IssueInstant"),
            acs_url: attribute(e, b"AssertionConsumerServiceURL"),
            protocol_binding: attribute(e, b"ProtocolBinding"),
        }
    }
}

fn attribute(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.to_string()))
}

fn check_issue_instant(raw: &str, now: DateTime<Utc>) -> SamlResult<DateTime<Utc>> {
    let instant = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SamlError::InvalidAuthnRequest(format!("Invalid IssueInstant format: {e}")))?;

    let age_secs = (now - instant).num_seconds();
    if age_secs < -MAX_CLOCK_SKEW_SECS {
        return Err(SamlError::InvalidAuthnRequest(format!(
            "IssueInstant is in the future (skew: {}s exceeds {MAX_CLOCK_SKEW_SECS}s tolerance)",
            -age_secs
        )));
    }
    if age_secs > MAX_CLOCK_SKEW_SECS {
        return Err(SamlError::InvalidAuthnRequest(format!(
            "IssueInstant is too old (age: {age_secs}s exceeds {MAX_CLOCK_SKEW_SECS}s maximum)"
        )));
    }
    Ok(instant)
}
