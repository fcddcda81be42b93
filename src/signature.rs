//! Webhook signature verification.
//!
//! GitHub signs each delivery with HMAC-SHA256 over the raw body and sends
//! it as `X-Hub-Signature-256: sha256=<hex>`. Comparison is constant time.

use hmac::Hmac;
use hmac::Mac;
use sha2::Sha256;
use snafu::Snafu;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

const SIGNATURE_PREFIX: &str = "sha256=";

/// Why a delivery's signature was refused.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum SignatureError {
    #[snafu(display("signature header is missing"))]
    Missing,

    #[snafu(display("signature header is malformed: {reason}"))]
    Malformed { reason: String },

    #[snafu(display("signature does not match the payload"))]
    Mismatch,
}

/// Verifies deliveries against the shared webhook secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    /// Create a verifier, or `None` for an empty secret.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        // HMAC accepts keys of any length.
        let mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
        Some(Self { mac })
    }

    /// Signature header value for `body`.
    pub fn sign(&self, body: &[u8]) -> String {
        format!("{SIGNATURE_PREFIX}{}", hex::encode(self.digest(body)))
    }

    /// Check `header` against `body`.
    pub fn verify(&self, body: &[u8], header: Option<&str>) -> Result<(), SignatureError> {
        let header = header.ok_or(SignatureError::Missing)?;
        let signature_hex = header.strip_prefix(SIGNATURE_PREFIX).ok_or_else(|| SignatureError::Malformed {
            reason: "missing sha256= prefix".to_string(),
        })?;
        let expected = hex::decode(signature_hex).map_err(|e| SignatureError::Malformed {
            reason: format!("invalid hex: {e}"),
        })?;

        if self.digest(body).ct_eq(&expected).into() {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    fn digest(&self, body: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}
