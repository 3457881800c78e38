//! `X-Signature` verification: hex-encoded HMAC-SHA1 of the raw body keyed
//! with the webhook secret.

use crate::error::WebhookError;
use crate::Result;
use hmac::{Hmac, Mac};
use sha1::Sha1;

type HmacSha1 = Hmac<Sha1>;

/// Hex HMAC-SHA1 of `body`.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature("unusable secret"))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` against `body`. GitHub's `sha1=` prefix is accepted.
/// The comparison runs in constant time.
pub fn verify(secret: &str, body: &[u8], signature: Option<&str>) -> Result<()> {
    let signature = signature
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or(WebhookError::InvalidSignature("missing X-Signature header"))?;
    let signature = signature.strip_prefix("sha1=").unwrap_or(signature);
    let expected = hex::decode(signature)
        .map_err(|_| WebhookError::InvalidSignature("X-Signature is not hex"))?;

    let mut mac = HmacSha1::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookError::InvalidSignature("unusable secret"))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| WebhookError::InvalidSignature("X-Signature is wrong"))
}
