//! Callback authenticity checks.

use super::WebhookError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Maximum allowed skew between the callback timestamp and now (300 s).
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(300);

/// Scheme prefix carried on the signature header.
const SIGNATURE_PREFIX: &str = "sha256=";

/// Verifies the signature header against the raw request body.
///
/// The header format is `sha256=<hex digest>` where the digest is
/// HMAC-SHA256 over the exact body bytes. Comparison is constant time via
/// [`Mac::verify_slice`]; a mismatch, a bad prefix, and undecodable hex
/// all collapse to the same rejection.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> Result<(), WebhookError> {
    let hex_digest = header
        .strip_prefix(SIGNATURE_PREFIX)
        .ok_or(WebhookError::Unauthorized("bad signature scheme"))?;
    let claimed = hex::decode(hex_digest)
        .map_err(|_| WebhookError::Unauthorized("undecodable signature"))?;

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|_| WebhookError::Unauthorized("unusable secret"))?;
    mac.update(body);
    mac.verify_slice(&claimed)
        .map_err(|_| WebhookError::Unauthorized("signature mismatch"))
}

/// Verifies the callback timestamp is within the freshness window.
///
/// `timestamp_header` is Unix seconds; `now_unix` is injected so tests
/// control the clock. Skew is checked in both directions.
pub fn verify_freshness(
    timestamp_header: &str,
    now_unix: i64,
    window: Duration,
) -> Result<(), WebhookError> {
    let timestamp: i64 = timestamp_header
        .trim()
        .parse()
        .map_err(|_| WebhookError::Unauthorized("unparseable timestamp"))?;
    let skew = (now_unix - timestamp).unsigned_abs();
    if skew > window.as_secs() {
        return Err(WebhookError::Unauthorized("stale timestamp"));
    }
    Ok(())
}

/// Computes the signature header value for a body.
///
/// Used by tests and by any outbound delivery tooling that must sign the
/// way the provider does.
pub fn sign_body(secret: &[u8], body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(body);
    format!("{SIGNATURE_PREFIX}{}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"shared-webhook-secret";

    #[test]
    fn test_round_trip_verifies() {
        let body = br#"{"external_ref":"ext-1","status":"success"}"#;
        let header = sign_body(SECRET, body);
        verify_signature(SECRET, body, &header).unwrap();
    }

    #[test]
    fn test_tampered_body_rejected() {
        let body = br#"{"external_ref":"ext-1","status":"success"}"#;
        let header = sign_body(SECRET, body);
        let tampered = br#"{"external_ref":"ext-1","status":"failure"}"#;
        assert!(verify_signature(SECRET, tampered, &header).is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let body = b"payload";
        let header = sign_body(b"other-secret", body);
        assert!(verify_signature(SECRET, body, &header).is_err());
    }

    #[test]
    fn test_missing_prefix_rejected() {
        let body = b"payload";
        let header = sign_body(SECRET, body);
        let bare = header.trim_start_matches("sha256=");
        assert!(verify_signature(SECRET, body, bare).is_err());
    }

    #[test]
    fn test_garbage_hex_rejected() {
        assert!(verify_signature(SECRET, b"payload", "sha256=zzzz").is_err());
    }

    #[test]
    fn test_fresh_timestamp_accepted() {
        let now = 1_700_000_000;
        verify_freshness(&now.to_string(), now, DEFAULT_FRESHNESS_WINDOW).unwrap();
        verify_freshness(&(now - 299).to_string(), now, DEFAULT_FRESHNESS_WINDOW).unwrap();
        verify_freshness(&(now - 300).to_string(), now, DEFAULT_FRESHNESS_WINDOW).unwrap();
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let now = 1_700_000_000;
        // 301 seconds old: one past the window.
        let err =
            verify_freshness(&(now - 301).to_string(), now, DEFAULT_FRESHNESS_WINDOW).unwrap_err();
        assert!(matches!(err, WebhookError::Unauthorized(_)));
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let now = 1_700_000_000;
        let err =
            verify_freshness(&(now + 301).to_string(), now, DEFAULT_FRESHNESS_WINDOW).unwrap_err();
        assert!(matches!(err, WebhookError::Unauthorized(_)));
    }

    #[test]
    fn test_unparseable_timestamp_rejected() {
        assert!(verify_freshness("yesterday", 0, DEFAULT_FRESHNESS_WINDOW).is_err());
    }
}
