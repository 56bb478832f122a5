//! IdP signing key and certificate.

use crate::error::{SamlError, SamlResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer;
use openssl::x509::X509;
use std::fmt;

/// RSA key pair used to sign assertions.
///
/// Construction checks that the key belongs to the certificate, so a server
/// holding a `SigningCredentials` can always sign.
#[derive(Clone)]
pub struct SigningCredentials {
    private_key: PKey<Private>,
    certificate: X509,
}

impl SigningCredentials {
    /// Load from PEM text. The certificate may also be bare base64 DER.
    pub fn from_pem(certificate_pem: &str, private_key_pem: &str) -> SamlResult<Self> {
        if certificate_pem.trim().is_empty() {
            return Err(SamlError::SignatureConfiguration(
                "Signing certificate is empty".to_string(),
            ));
        }
        if private_key_pem.trim().is_empty() {
            return Err(SamlError::SignatureConfiguration(
                "Signing private key is empty".to_string(),
            ));
        }

        let certificate = parse_certificate(certificate_pem)?;
        let private_key = PKey::private_key_from_pem(private_key_pem.trim().as_bytes())
            .map_err(|e| SamlError::SignatureConfiguration(format!("Invalid private key: {e}")))?;

        let public_key = certificate.public_key().map_err(|e| {
            SamlError::SignatureConfiguration(format!("Certificate has no public key: {e}"))
        })?;
        if !public_key.public_eq(&private_key) {
            return Err(SamlError::SignatureConfiguration(
                "Private key does not match certificate".to_string(),
            ));
        }

        Ok(Self {
            private_key,
            certificate,
        })
    }

    /// Certificate as base64 DER without PEM armor, for `X509Certificate` elements.
    pub fn certificate_base64_der(&self) -> SamlResult<String> {
        let der = self.certificate.to_der().map_err(|e| {
            SamlError::SignatureConfiguration(format!("Certificate DER encoding failed: {e}"))
        })?;
        Ok(STANDARD.encode(der))
    }

    /// RSA-SHA256 signature over `data`.
    pub fn sign_sha256(&self, data: &[u8]) -> SamlResult<Vec<u8>> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.private_key)
            .map_err(|e| SamlError::AssertionGenerationFailed(format!("Signer init: {e}")))?;
        signer
            .update(data)
            .map_err(|e| SamlError::AssertionGenerationFailed(format!("Signer update: {e}")))?;
        signer
            .sign_to_vec()
            .map_err(|e| SamlError::AssertionGenerationFailed(format!("Signing failed: {e}")))
    }

    #[must_use]
    pub fn certificate(&self) -> &X509 {
        &self.certificate
    }
}

impl fmt::Debug for SigningCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningCredentials")
            .field("certificate", &self.certificate.subject_name())
            .field("private_key", &"[REDACTED]")
            .finish()
    }
}

fn parse_certificate(cert: &str) -> SamlResult<X509> {
    let cert = cert.trim();
    let pem = if cert.contains("-----BEGIN CERTIFICATE-----") {
        cert.to_string()
    } else {
        format!("-----BEGIN CERTIFICATE-----\n{cert}\n-----END CERTIFICATE-----")
    };

    X509::from_pem(pem.as_bytes())
        .map_err(|e| SamlError::SignatureConfiguration(format!("Invalid certificate: {e}")))
}


#[cfg(test)]
mod tests {
    use super::test_support::self_signed_pem;
    use super::*;
    use openssl::sign::Verifier;

    #[test]
    fn test_sign_and_verify() {
        let (cert, key) = self_signed_pem();
        let creds = SigningCredentials::from_pem(&cert, &key).unwrap();
        let sig = creds.sign_sha256(b"payload").unwrap();

        let public = creds.certificate().public_key().unwrap();
        let mut verifier = Verifier::new(MessageDigest::sha256(), &public).unwrap();
        verifier.update(b"payload").unwrap();
        assert!(verifier.verify(&sig).unwrap());
    }

    #[test]
    fn test_bare_base64_certificate_accepted() {
        let (cert, key) = self_signed_pem();
        let bare: String = cert
            .lines()
            .filter(|l| !l.starts_with("-----"))
            .collect();
        assert!(SigningCredentials::from_pem(&bare, &key).is_ok());
    }

    #[test]
    fn test_mismatched_key_is_configuration_error() {
        let (cert, _) = self_signed_pem();
        let (_, other_key) = self_signed_pem();
        let err = SigningCredentials::from_pem(&cert, &other_key).unwrap_err();
        assert!(matches!(err, SamlError::SignatureConfiguration(_)));
    }

    #[test]
    fn test_missing_material_is_configuration_error() {
        let err = SigningCredentials::from_pem("", "").unwrap_err();
        assert!(matches!(err, SamlError::SignatureConfiguration(_)));
        let err = SigningCredentials::from_pem("not a cert", "not a key").unwrap_err();
        assert!(matches!(err, SamlError::SignatureConfiguration(_)));
    }

    #[test]
    fn test_debug_redacts_key() {
        let (cert, key) = self_signed_pem();
        let creds = SigningCredentials::from_pem(&cert, &key).unwrap();
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("[REDACTED]"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }
}
