//! HMAC-SHA256 digests for Alphabot webhooks.
//!
//! Alphabot signs the canonical string `{event}\n{timestamp}` (not the body) with the shared
//! webhook secret and sends the lowercase hex digest in the payload's `hash` field.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Build the string that gets signed.
pub fn canonical_string(event: &str, timestamp: &str) -> String {
    format!("{event}\n{timestamp}")
}

/// Compute the lowercase hex HMAC-SHA256 digest for an event.
pub fn compute_digest(secret: &str, event: &str, timestamp: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(canonical_string(event, timestamp).as_bytes());
    Some(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a digest received from Alphabot.
///
/// Comparison is on the hex text, so an upper-cased digest is rejected.
pub fn verify_digest(secret: &str, event: &str, timestamp: &str, digest: &str) -> bool {
    let Some(expected) = compute_digest(secret, event, timestamp) else {
        return false;
    };
    constant_time_eq(digest.as_bytes(), expected.as_bytes())
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
