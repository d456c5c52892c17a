//! HTTP message signing and verification
//!
//! Outbound deliveries carry a draft-cavage `Signature` header: an Ed25519
//! signature by the sending actor's key over `(request-target)`, `host`,
//! `date`, and `digest`. Inbound inbox posts are verified symmetrically
//! against the sender's published public key. Keypairs are PKCS#8 PEM at
//! rest and never leave the actor row except as the public half.

use base64::prelude::*;
use chrono::{DateTime, Utc};
use ed25519_dalek::pkcs8::spki::der::pem::LineEnding;
use ed25519_dalek::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::{LaurelError, Result};

/// Header subset covered by the signature, in signing order
pub const SIGNED_HEADERS: &str = "(request-target) host date digest";

/// A freshly generated Ed25519 keypair, PEM encoded
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_pem: String,
    pub private_pem: String,
}

/// Generate an actor keypair
pub fn generate_keypair() -> Result<KeyPair> {
    let mut csprng = rand::rngs::OsRng;
    let signing_key = SigningKey::generate(&mut csprng);

    let private_pem = signing_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| LaurelError::Keys(format!("Failed to encode private key: {}", e)))?
        .to_string();

    let public_pem = signing_key
        .verifying_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| LaurelError::Keys(format!("Failed to encode public key: {}", e)))?;

    Ok(KeyPair {
        public_pem,
        private_pem,
    })
}

fn load_signing_key(private_key_pem: &str) -> Result<SigningKey> {
    SigningKey::from_pkcs8_pem(private_key_pem)
        .map_err(|e| LaurelError::Keys(format!("Failed to parse private key: {}", e)))
}

fn load_verifying_key(public_key_pem: &str) -> Result<VerifyingKey> {
    VerifyingKey::from_public_key_pem(public_key_pem)
        .map_err(|e| LaurelError::Keys(format!("Failed to parse public key: {}", e)))
}

/// RFC 7231 date header value
pub fn http_date(when: DateTime<Utc>) -> String {
    when.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// `Digest` header value over a request body
pub fn body_digest(body: &[u8]) -> String {
    format!("SHA-256={}", BASE64_STANDARD.encode(Sha256::digest(body)))
}

/// Check a `Digest` header against the delivered body
pub fn verify_digest(digest_header: &str, body: &[u8]) -> Result<()> {
    let expected = body_digest(body);
    if digest_header != expected {
        return Err(LaurelError::Signature(format!(
            "Digest mismatch: header {}, body {}",
            digest_header, expected
        )));
    }
    Ok(())
}

fn build_signing_string(request_target: &str, host: &str, date: &str, digest: &str) -> String {
    format!(
        "(request-target): {}\nhost: {}\ndate: {}\ndigest: {}",
        request_target, host, date, digest
    )
}

/// Headers to attach to a signed outbound request
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub date: String,
    pub digest: String,
    pub signature: String,
}

/// Sign an outbound request for delivery to `target`
pub fn sign_request(
    key_id: &str,
    private_key_pem: &str,
    method: &str,
    target: &url::Url,
    body: &[u8],
) -> Result<SignedHeaders> {
    let host_str = target
        .host_str()
        .ok_or_else(|| LaurelError::Delivery(format!("Target has no host: {}", target)))?;
    let host = match target.port() {
        Some(port) => format!("{}:{}", host_str, port),
        None => host_str.to_string(),
    };

    let mut request_target = format!("{} {}", method.to_lowercase(), target.path());
    if let Some(query) = target.query() {
        request_target.push('?');
        request_target.push_str(query);
    }

    let date = http_date(Utc::now());
    let digest = body_digest(body);
    let signing_string = build_signing_string(&request_target, &host, &date, &digest);

    let signing_key = load_signing_key(private_key_pem)?;
    let signature = signing_key.sign(signing_string.as_bytes());
    let signature_b64 = BASE64_STANDARD.encode(signature.to_bytes());

    let signature_header = format!(
        r#"keyId="{}",algorithm="hs2019",headers="{}",signature="{}""#,
        key_id, SIGNED_HEADERS, signature_b64
    );

    Ok(SignedHeaders {
        date,
        digest,
        signature: signature_header,
    })
}

/// Parsed `Signature` header from an inbound request
#[derive(Debug, Clone)]
pub struct SignatureHeader {
    pub key_id: String,
    pub algorithm: Option<String>,
    pub headers: Vec<String>,
    pub signature: String,
}

impl SignatureHeader {
    /// The actor URI the key belongs to (key id minus its fragment)
    pub fn key_owner(&self) -> &str {
        self.key_id
            .split('#')
            .next()
            .unwrap_or(&self.key_id)
    }
}

/// Parse a `Signature` header of the form `k1="v1",k2="v2",...`
pub fn parse_signature_header(value: &str) -> Result<SignatureHeader> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;

    for part in value.split(',') {
        let (name, raw) = part
            .split_once('=')
            .ok_or_else(|| LaurelError::Signature(format!("Malformed signature field: {}", part)))?;
        let field = raw.trim().trim_matches('"').to_string();

        match name.trim() {
            "keyId" => key_id = Some(field),
            "algorithm" => algorithm = Some(field),
            "headers" => headers = Some(field),
            "signature" => signature = Some(field),
            _ => {}
        }
    }

    let key_id =
        key_id.ok_or_else(|| LaurelError::Signature("Signature header missing keyId".to_string()))?;
    let signature = signature
        .ok_or_else(|| LaurelError::Signature("Signature header missing signature".to_string()))?;
    let headers = headers
        .unwrap_or_else(|| SIGNED_HEADERS.to_string())
        .split_whitespace()
        .map(|h| h.to_string())
        .collect();

    Ok(SignatureHeader {
        key_id,
        algorithm,
        headers,
        signature,
    })
}

/// Verify an inbound request signature against the sender's public key
///
/// `header_value` resolves a (lowercase) header name to the value the
/// request actually carried. The declared header list must cover at least
/// the canonical `(request-target) host date digest` subset; the signing
/// string is then reconstructed from that list exactly as declared.
pub fn verify_request<F>(
    public_key_pem: &str,
    signature: &SignatureHeader,
    method: &str,
    path: &str,
    header_value: F,
) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    for required in SIGNED_HEADERS.split_whitespace() {
        if !signature.headers.iter().any(|h| h.as_str() == required) {
            return Err(LaurelError::Signature(format!(
                "Signature does not cover required header: {}",
                required
            )));
        }
    }

    let mut lines = Vec::with_capacity(signature.headers.len());

    for name in &signature.headers {
        if name == "(request-target)" {
            lines.push(format!("(request-target): {} {}", method.to_lowercase(), path));
        } else {
            let value = header_value(name).ok_or_else(|| {
                LaurelError::Signature(format!("Signed header missing from request: {}", name))
            })?;
            lines.push(format!("{}: {}", name, value));
        }
    }

    let signing_string = lines.join("\n");

    let signature_bytes = BASE64_STANDARD
        .decode(&signature.signature)
        .map_err(|e| LaurelError::Signature(format!("Signature is not valid base64: {}", e)))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| LaurelError::Signature(format!("Signature has wrong length: {}", e)))?;

    let key = load_verifying_key(public_key_pem)?;
    key.verify_strict(signing_string.as_bytes(), &signature)
        .map_err(|_| LaurelError::Signature("Signature verification failed".to_string()))
}

/// Sign a serialized document, returning the base64 signature value
///
/// Used for the detached `signature` object on Create activities.
pub fn sign_document(private_key_pem: &str, document: &[u8]) -> Result<String> {
    let signing_key = load_signing_key(private_key_pem)?;
    let signature = signing_key.sign(document);
    Ok(BASE64_STANDARD.encode(signature.to_bytes()))
}

/// Verify a detached document signature
pub fn verify_document(public_key_pem: &str, document: &[u8], signature_b64: &str) -> Result<()> {
    let signature_bytes = BASE64_STANDARD
        .decode(signature_b64)
        .map_err(|e| LaurelError::Signature(format!("Signature is not valid base64: {}", e)))?;
    let signature = Signature::from_slice(&signature_bytes)
        .map_err(|e| LaurelError::Signature(format!("Signature has wrong length: {}", e)))?;

    let key = load_verifying_key(public_key_pem)?;
    key.verify_strict(document, &signature)
        .map_err(|_| LaurelError::Signature("Document signature verification failed".to_string()))
}
