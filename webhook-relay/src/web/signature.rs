//! WhatsApp Cloud API webhook signature verification.
//!
//! Meta signs every delivery with HMAC-SHA256 over the raw request body using
//! the app secret, and sends the result as `X-Hub-Signature-256: sha256=<hex>`.
//! Reference: https://developers.facebook.com/docs/graph-api/webhooks/getting-started#event-notifications

use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;
use tracing::warn;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Why a signature was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("app secret not configured")]
    SecretNotConfigured,

    #[error("signature header missing")]
    Missing,

    #[error("signature header malformed")]
    Malformed,

    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("signature digest is not valid hex")]
    InvalidHex,

    #[error("signature mismatch")]
    Mismatch,

    #[error("signing key rejected")]
    InvalidKey,
}

/// Sign a body the way the provider does.
///
/// Returns the full header value, e.g. `sha256=5d41...`.
pub fn sign(body: &[u8], secret: &str) -> Result<String, SignatureError> {
    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify a `sha256=<hex>` signature header against the raw body.
///
/// The header must have exactly two `=`-separated parts, the algorithm must be
/// `sha256`, and the digest must be valid hex. The digest comparison runs in
/// constant time.
pub fn verify_signature(body: &[u8], header: &str, secret: &str) -> Result<(), SignatureError> {
    let parts: Vec<&str> = header.trim().split('=').collect();
    if parts.len() != 2 {
        return Err(SignatureError::Malformed);
    }

    let (algorithm, digest_hex) = (parts[0], parts[1]);
    if algorithm != "sha256" {
        return Err(SignatureError::UnsupportedAlgorithm(algorithm.to_string()));
    }

    let provided = hex::decode(digest_hex).map_err(|_| SignatureError::InvalidHex)?;

    let mut mac = <HmacSha256 as KeyInit>::new_from_slice(secret.as_bytes())
        .map_err(|_| SignatureError::InvalidKey)?;
    mac.update(body);

    mac.verify_slice(&provided)
        .map_err(|_| SignatureError::Mismatch)
}

/// Constant-time string comparison to prevent timing attacks.
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

/// Signature checking policy for inbound deliveries.
#[derive(Clone)]
pub struct SignaturePolicy {
    secret: Option<String>,
    fail_open: bool,
}

impl SignaturePolicy {
    /// Build a policy. Blank secrets count as unconfigured.
    pub fn new(secret: Option<String>, fail_open: bool) -> Self {
        Self {
            secret: secret.filter(|s| !s.trim().is_empty()),
            fail_open,
        }
    }

    /// Check a delivery.
    ///
    /// Fail-closed unless `fail_open` was explicitly enabled. Even in fail-open
    /// mode a signature that is present and wrong is rejected.
    pub fn check(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.filter(|h| !h.trim().is_empty());

        match (self.secret.as_deref(), header) {
            (Some(secret), Some(header)) => {
                let result = verify_signature(body, header, secret);
                if let Err(ref e) = result {
                    warn!(
                        reason = %e,
                        header_length = header.len(),
                        "whatsapp_signature_rejected"
                    );
                }
                result
            }
            (secret, header) if self.fail_open => {
                warn!(
                    has_secret = secret.is_some(),
                    has_signature = header.is_some(),
                    "whatsapp_signature_skipped_fail_open"
                );
                Ok(())
            }
            (None, _) => {
                warn!("whatsapp_signature_secret_not_configured");
                Err(SignatureError::SecretNotConfigured)
            }
            (Some(_), None) => {
                warn!("whatsapp_signature_missing");
                Err(SignatureError::Missing)
            }
        }
    }
}
