//! Webhook signature verification
//!
//! Deliveries are signed with RSA PKCS#1 v1.5 over SHA-256. The signed
//! content is the byte concatenation `event_id "." timestamp "." raw_body`;
//! the body must be the exact bytes received, before any JSON parsing.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::RsaPublicKey;
use sha2::Sha256;
use tracing::{debug, error, info, warn};

use super::envelope::{
    WebhookEnvelope, EVENT_ID_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER,
};
use crate::error::{Result, VerificationError};

/// Kick's published webhook verifying key
pub const KICK_PUBLIC_KEY_PEM: &str = "-----BEGIN PUBLIC KEY-----
MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAq/+l1WnlRrGSolDMA+A8
6rAhMbQGmQ2SapVcGM3zq8ANXjnhDWocMqfWcTd95btDydITa10kDvHzw9WQOqp2
MZI7ZyrfzJuz5nhTPCiJwTwnEtWft7nV14BYRDHvlfqPUaZ+1KR4OCaO/wWIk/rQ
L/TjY0M70gse8rlBkbo2a8rKhu69RQTRsoaf4DVhDPEeSeI5jVrRDGAMGL3cGuyY
6CLKGdjVEM78g3JfYOvDU/RvfqD7L89TZ3iN94jrmWdGz34JNlEI5hqK8dd7C5EF
BEbZ5jgB8s8ReQV8H+MkuffjdAj3ajDDX3DOJMIut1lBrUVD1AaSrGCKHooWoL2e
twIDAQAB
-----END PUBLIC KEY-----";

/// Verifies webhook envelopes against one public key.
///
/// The key is loaded once. A verifier whose key failed to load still
/// exists, but rejects everything.
#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: Option<VerifyingKey<Sha256>>,
}

impl SignatureVerifier {
    /// Verifier for the built-in Kick key
    pub fn kick() -> Self {
        Self::from_pem(KICK_PUBLIC_KEY_PEM)
    }

    /// Verifier for a PEM-encoded SubjectPublicKeyInfo key.
    ///
    /// A key that does not parse is logged and leaves the verifier without a
    /// key.
    pub fn from_pem(pem: &str) -> Self {
        match RsaPublicKey::from_public_key_pem(pem.trim()) {
            Ok(key) => {
                info!("Webhook public key loaded");
                Self {
                    key: Some(VerifyingKey::<Sha256>::new(key)),
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to load webhook public key");
                Self { key: None }
            }
        }
    }

    /// Verifier from an optional PEM file, falling back to the built-in key
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let pem = std::fs::read_to_string(path)?;
                debug!(path = %path.display(), "Read webhook public key file");
                Ok(Self::from_pem(&pem))
            }
            None => Ok(Self::kick()),
        }
    }

    /// A verifier with no key; every envelope is rejected
    pub fn without_key() -> Self {
        Self { key: None }
    }

    /// Whether a key is loaded
    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    /// `true` only if the envelope carries a valid signature
    pub fn verify(&self, envelope: &WebhookEnvelope) -> bool {
        match self.try_verify(envelope) {
            Ok(()) => true,
            Err(VerificationError::KeyUnavailable) => {
                warn!("Public key not loaded, cannot verify webhook signature");
                false
            }
            Err(e) => {
                debug!(reason = %e, "Webhook signature rejected");
                false
            }
        }
    }

    /// Verify and report why an envelope was rejected
    pub fn try_verify(
        &self,
        envelope: &WebhookEnvelope,
    ) -> std::result::Result<(), VerificationError> {
        let key = self.key.as_ref().ok_or(VerificationError::KeyUnavailable)?;

        let event_id = required(envelope.event_id.as_deref(), EVENT_ID_HEADER)?;
        let timestamp = required(envelope.timestamp.as_deref(), TIMESTAMP_HEADER)?;
        let signature_b64 = required(envelope.signature_b64.as_deref(), SIGNATURE_HEADER)?;

        let raw_signature = STANDARD
            .decode(signature_b64.trim())
            .map_err(|e| VerificationError::MalformedSignature(e.to_string()))?;
        let signature = Signature::try_from(raw_signature.as_slice())
            .map_err(|e| VerificationError::MalformedSignature(e.to_string()))?;

        let content = signed_content(event_id, timestamp, &envelope.raw_body);
        key.verify(&content, &signature)
            .map_err(|_| VerificationError::Mismatch)
    }
}

/// Bytes covered by the signature
pub fn signed_content(event_id: &str, timestamp: &str, raw_body: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(event_id.len() + timestamp.len() + raw_body.len() + 2);
    content.extend_from_slice(event_id.as_bytes());
    content.push(b'.');
    content.extend_from_slice(timestamp.as_bytes());
    content.push(b'.');
    content.extend_from_slice(raw_body);
    content
}

fn required<'a>(
    value: Option<&'a str>,
    header: &'static str,
) -> std::result::Result<&'a str, VerificationError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(VerificationError::MissingHeader(header))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::DecodePrivateKey;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::RsaPrivateKey;

    const PRIVATE_PEM: &str = include_str!("../../tests/fixtures/test_private_key.pem");
    const PUBLIC_PEM: &str = include_str!("../../tests/fixtures/test_public_key.pem");

    fn sign(id: &str, ts: &str, body: &[u8]) -> String {
        let key = RsaPrivateKey::from_pkcs8_pem(PRIVATE_PEM).unwrap();
        let signer = SigningKey::<Sha256>::new(key);
        let sig = signer.sign(&signed_content(id, ts, body));
        STANDARD.encode(sig.to_bytes())
    }

    fn envelope(sig: Option<String>, body: &'static [u8]) -> WebhookEnvelope {
        WebhookEnvelope {
            event_id: Some("evt-1".to_string()),
            event_type: Some("chat.message.sent".to_string()),
            timestamp: Some("2026-01-01T00:00:00Z".to_string()),
            signature_b64: sig,
            raw_body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_signed_content_layout() {
        assert_eq!(signed_content("a", "b", b"{}"), b"a.b.{}".to_vec());
    }

    #[test]
    fn test_builtin_key_loads() {
        assert!(SignatureVerifier::kick().has_key());
    }

    #[test]
    fn test_valid_signature() {
        let body = br#"{"content":"hi"}"#;
        let verifier = SignatureVerifier::from_pem(PUBLIC_PEM);
        let env = envelope(Some(sign("evt-1", "2026-01-01T00:00:00Z", body)), body);
        assert_eq!(verifier.try_verify(&env), Ok(()));
        assert!(verifier.verify(&env));
    }

    #[test]
    fn test_body_tamper_rejected() {
        let verifier = SignatureVerifier::from_pem(PUBLIC_PEM);
        let sig = sign("evt-1", "2026-01-01T00:00:00Z", br#"{"content":"hi"}"#);
        let env = envelope(Some(sig), br#"{"content":"hI"}"#);
        assert_eq!(verifier.try_verify(&env), Err(VerificationError::Mismatch));
    }

    #[test]
    fn test_missing_signature_header() {
        let verifier = SignatureVerifier::from_pem(PUBLIC_PEM);
        let env = envelope(None, b"{}");
        assert_eq!(
            verifier.try_verify(&env),
            Err(VerificationError::MissingHeader(SIGNATURE_HEADER))
        );
        assert!(!verifier.verify(&env));
    }

    #[test]
    fn test_malformed_base64() {
        let verifier = SignatureVerifier::from_pem(PUBLIC_PEM);
        let env = envelope(Some("not base64!!".to_string()), b"{}");
        assert!(matches!(
            verifier.try_verify(&env),
            Err(VerificationError::MalformedSignature(_))
        ));
    }

    #[test]
    fn test_wrong_length_signature() {
        let verifier = SignatureVerifier::from_pem(PUBLIC_PEM);
        let env = envelope(Some(STANDARD.encode([7u8; 16])), b"{}");
        assert!(!verifier.verify(&env));
    }

    #[test]
    fn test_other_key_rejected() {
        let body = b"{}";
        let env = envelope(Some(sign("evt-1", "2026-01-01T00:00:00Z", body)), body);
        assert_eq!(
            SignatureVerifier::kick().try_verify(&env),
            Err(VerificationError::Mismatch)
        );
    }

    #[test]
    fn test_without_key() {
        let body = b"{}";
        let env = envelope(Some(sign("evt-1", "2026-01-01T00:00:00Z", body)), body);
        let verifier = SignatureVerifier::without_key();
        assert_eq!(
            verifier.try_verify(&env),
            Err(VerificationError::KeyUnavailable)
        );
        assert!(!verifier.verify(&env));
        assert!(!SignatureVerifier::from_pem("garbage").has_key());
    }
}
