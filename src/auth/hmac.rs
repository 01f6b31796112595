//! HMAC-SHA256 helpers for webhook signature verification.
//!
//! Shopify signs webhook deliveries with HMAC-SHA256 over the raw request
//! body, base64-encoded in the `X-Shopify-Hmac-Sha256` header. All
//! comparisons here are constant-time to prevent timing attacks.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes an HMAC-SHA256 signature over raw bytes, base64-encoded.
///
/// This matches the encoding Shopify uses for the webhook signature header.
///
/// # Example
///
/// ```rust
/// use urgify_core::auth::hmac::compute_signature_base64;
///
/// let sig = compute_signature_base64(b"webhook payload", "secret-key");
/// assert_eq!(sig.len(), 44); // 32 bytes of SHA256 -> 44 base64 chars
/// ```
#[must_use]
#[allow(clippy::missing_panics_doc)] // HMAC accepts any key size, so this never panics
pub fn compute_signature_base64(message: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Performs constant-time comparison of two strings.
///
/// Used for HMAC verification so the comparison time does not leak how many
/// leading characters matched.
#[must_use]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_is_deterministic() {
        let a = compute_signature_base64(b"body", "secret");
        let b = compute_signature_base64(b"body", "secret");
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_changes_with_secret_and_body() {
        let base = compute_signature_base64(b"body", "secret");
        assert_ne!(base, compute_signature_base64(b"body", "other"));
        assert_ne!(base, compute_signature_base64(b"other", "secret"));
    }

    #[test]
    fn test_signature_length() {
        assert_eq!(compute_signature_base64(b"", "secret").len(), 44);
    }

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare("abc", "abc"));
        assert!(!constant_time_compare("abc", "abd"));
        assert!(!constant_time_compare("abc", "abcd"));
        assert!(constant_time_compare("", ""));
    }
}
