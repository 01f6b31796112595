//! Session-token (JWT) claims for embedded apps.
//!
//! App Bridge issues a short-lived JWT per browser session (empirically
//! ~60 seconds). The server-side [`validator`](crate::auth::validator) only
//! checks the bearer header syntactically; this module performs the actual
//! cryptographic validation when the token is about to be exchanged for an
//! Admin access token.
//!
//! # Claims
//!
//! - `iss`: issuing admin URL (`https://shop.myshopify.com/admin`)
//! - `dest`: destination shop (`https://shop.myshopify.com`)
//! - `aud`: the app's API key
//! - `sub`: user id (online contexts)
//! - `exp` / `nbf` / `iat`: standard time claims, validated with 10 s leeway
//! - `jti`: unique token id
//! - `sid`: Shopify session id
//!
//! # Key Rotation
//!
//! Decoding tries the primary API secret first, then the old secret if one
//! is configured, so embeds keep working while a rotation is in flight.

use crate::config::{ShopDomain, UrgifyConfig};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use thiserror::Error;

/// Leeway for JWT time-based claims validation.
const JWT_LEEWAY_SECS: u64 = 10;

/// Error produced while decoding or validating a session token JWT.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    /// The token could not be decoded or failed a claim check.
    #[error("Invalid session token: {reason}")]
    InvalidSessionToken {
        /// Why the token was rejected.
        reason: String,
    },
}

/// Decoded claims of an App Bridge session token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionTokenPayload {
    /// Issuer - the admin URL that issued the token.
    pub iss: String,

    /// Destination - the target shop URL.
    pub dest: String,

    /// Audience - must match the app's API key.
    pub aud: String,

    /// Subject - the user id, present in online contexts.
    pub sub: Option<String>,

    /// Expiration (Unix timestamp).
    pub exp: i64,

    /// Not-before (Unix timestamp).
    pub nbf: i64,

    /// Issued-at (Unix timestamp).
    pub iat: i64,

    /// Unique token id.
    pub jti: String,

    /// Shopify session id.
    pub sid: Option<String>,
}

impl SessionTokenPayload {
    /// Decodes and validates a session token.
    ///
    /// Tries the primary API secret key, falls back to the old key when one
    /// is configured, then checks that `aud` matches the app's API key.
    ///
    /// # Errors
    ///
    /// Returns [`JwtError::InvalidSessionToken`] if the token cannot be
    /// decoded with either key or the audience does not match.
    pub fn decode(token: &str, config: &UrgifyConfig) -> Result<Self, JwtError> {
        let payload = match Self::decode_with_key(token, config.api_secret_key().as_ref()) {
            Ok(payload) => payload,
            Err(primary_err) => {
                if let Some(old_key) = config.old_api_secret_key() {
                    Self::decode_with_key(token, old_key.as_ref()).map_err(|_| {
                        // Report the primary-key error when both fail
                        JwtError::InvalidSessionToken {
                            reason: format!("Error decoding session token: {primary_err}"),
                        }
                    })?
                } else {
                    return Err(JwtError::InvalidSessionToken {
                        reason: format!("Error decoding session token: {primary_err}"),
                    });
                }
            }
        };

        if payload.aud != config.api_key().as_ref() {
            return Err(JwtError::InvalidSessionToken {
                reason: "Session token had invalid API key".to_string(),
            });
        }

        Ok(payload)
    }

    fn decode_with_key(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = JWT_LEEWAY_SECS;
        validation.validate_nbf = true;
        // `aud` is checked against the API key explicitly in `decode`
        validation.validate_aud = false;

        let key = DecodingKey::from_secret(secret.as_bytes());
        decode::<Self>(token, &key, &validation).map(|data| data.claims)
    }

    /// Returns the shop domain from the `dest` claim.
    ///
    /// # Errors
    ///
    /// Returns [`JwtError::InvalidSessionToken`] if `dest` is not a valid
    /// `https://shop.myshopify.com` URL.
    pub fn shop_domain(&self) -> Result<ShopDomain, JwtError> {
        let host = self
            .dest
            .strip_prefix("https://")
            .ok_or_else(|| JwtError::InvalidSessionToken {
                reason: format!("Session token had invalid destination: {}", self.dest),
            })?;

        ShopDomain::new(host).map_err(|_| JwtError::InvalidSessionToken {
            reason: format!("Session token had invalid destination: {}", self.dest),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, ApiSecretKey};
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde::Serialize;
    use std::time::{SystemTime, UNIX_EPOCH};

    #[derive(Serialize)]
    struct TestClaims {
        iss: String,
        dest: String,
        aud: String,
        sub: Option<String>,
        exp: i64,
        nbf: i64,
        iat: i64,
        jti: String,
        sid: Option<String>,
    }

    fn now() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn mint(shop: &str, aud: &str, secret: &str, exp_offset: i64) -> String {
        let ts = now();
        let claims = TestClaims {
            iss: format!("https://{shop}/admin"),
            dest: format!("https://{shop}"),
            aud: aud.to_string(),
            sub: Some("1".to_string()),
            exp: ts + exp_offset,
            nbf: ts - 5,
            iat: ts,
            jti: format!("jti-{ts}"),
            sid: Some("sid".to_string()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn config(secret: &str, old_secret: Option<&str>) -> UrgifyConfig {
        let mut builder = UrgifyConfig::builder()
            .api_key(ApiKey::new("test-key").unwrap())
            .api_secret_key(ApiSecretKey::new(secret).unwrap());
        if let Some(old) = old_secret {
            builder = builder.old_api_secret_key(ApiSecretKey::new(old).unwrap());
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_decode_valid_token() {
        let token = mint("my-store.myshopify.com", "test-key", "secret", 300);
        let payload = SessionTokenPayload::decode(&token, &config("secret", None)).unwrap();
        assert_eq!(payload.aud, "test-key");
        assert_eq!(
            payload.shop_domain().unwrap().as_ref(),
            "my-store.myshopify.com"
        );
    }

    #[test]
    fn test_decode_with_old_key_after_rotation() {
        let token = mint("my-store.myshopify.com", "test-key", "old-secret", 300);
        let payload =
            SessionTokenPayload::decode(&token, &config("new-secret", Some("old-secret")))
                .unwrap();
        assert_eq!(payload.aud, "test-key");
    }

    #[test]
    fn test_decode_rejects_wrong_secret() {
        let token = mint("my-store.myshopify.com", "test-key", "wrong", 300);
        let err = SessionTokenPayload::decode(&token, &config("secret", None)).unwrap_err();
        assert!(matches!(err, JwtError::InvalidSessionToken { .. }));
    }

    #[test]
    fn test_decode_rejects_wrong_audience() {
        let token = mint("my-store.myshopify.com", "someone-else", "secret", 300);
        let err = SessionTokenPayload::decode(&token, &config("secret", None)).unwrap_err();
        assert!(err.to_string().contains("invalid API key"));
    }

    #[test]
    fn test_decode_rejects_expired_token() {
        // Past the 10s leeway
        let token = mint("my-store.myshopify.com", "test-key", "secret", -60);
        assert!(SessionTokenPayload::decode(&token, &config("secret", None)).is_err());
    }

    #[test]
    fn test_shop_domain_rejects_http_dest() {
        let token = mint("my-store.myshopify.com", "test-key", "secret", 300);
        let mut payload = SessionTokenPayload::decode(&token, &config("secret", None)).unwrap();
        payload.dest = "http://my-store.myshopify.com".to_string();
        assert!(payload.shop_domain().is_err());
    }
}
