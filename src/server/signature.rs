//! Webhook signature verification using HMAC-SHA256.
//!
//! GitHub signs each delivery with a shared secret and sends the result in
//! the `X-Hub-Signature-256` header as `sha256=<hex>`. Verification happens
//! before the payload is parsed or routed anywhere.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Parses a signature header (`sha256=<hex>`) into raw bytes.
///
/// Returns `None` for malformed headers: missing or wrong algorithm prefix,
/// invalid hex.
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    let hex_sig = header.strip_prefix("sha256=")?;
    hex::decode(hex_sig).ok()
}

/// Computes the HMAC-SHA256 signature of a payload with the given secret.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC can take key of any size");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a signature as a header value, `sha256=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Verifies a delivery signature against the payload and secret.
///
/// Uses the MAC library's constant-time comparison. Malformed headers verify
/// as false, never panic.
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
