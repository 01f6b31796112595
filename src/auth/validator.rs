//! Syntactic bearer-token validation for inbound requests.
//!
//! This is the cheap pre-check in front of token exchange: it only verifies
//! that an `Authorization` header is present with a well-formed `Bearer `
//! prefix and extracts the candidate token. No cryptographic verification
//! happens here; that belongs to [`crate::auth::jwt`] and the downstream
//! token exchange. The point is to answer `401 Session token required`
//! before spending a round trip on obviously unauthenticated requests.

use serde::Serialize;
use thiserror::Error;

/// The required bearer prefix, including the trailing space.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Errors that cross the HTTP boundary with a structured envelope.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The `Authorization` header is missing or malformed.
    ///
    /// Recoverable: the client should re-acquire a token and retry once.
    #[error("Session token required")]
    SessionTokenRequired,
}

impl AuthError {
    /// The HTTP status this error renders as.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::SessionTokenRequired => 401,
        }
    }

    /// The JSON body this error renders as.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: self.to_string(),
        }
    }
}

/// The `{"error": "..."}` body returned for auth and rate-limit failures.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorEnvelope {
    /// Human-readable error message.
    pub error: String,
}

/// Extracts the candidate session token from an `Authorization` header.
///
/// Requires the exact `Bearer ` prefix and a non-empty remainder; anything
/// else (missing header, `Bear <token>`, bare `Bearer`) yields `None`,
/// never a partially parsed value.
///
/// # Example
///
/// ```rust
/// use urgify_core::auth::validator::extract_bearer_token;
///
/// assert_eq!(extract_bearer_token(Some("Bearer abc")), Some("abc"));
/// assert_eq!(extract_bearer_token(Some("Bear abc")), None);
/// assert_eq!(extract_bearer_token(None), None);
/// ```
#[must_use]
pub fn extract_bearer_token(header: Option<&str>) -> Option<&str> {
    let token = header?.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() {
        return None;
    }
    Some(token)
}

/// Like [`extract_bearer_token`], but maps a miss to the 401 error.
///
/// # Errors
///
/// Returns [`AuthError::SessionTokenRequired`] when no well-formed bearer
/// token is present.
pub fn require_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    extract_bearer_token(header).ok_or(AuthError::SessionTokenRequired)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_well_formed_token() {
        assert_eq!(extract_bearer_token(Some("Bearer tok123")), Some("tok123"));
    }

    #[test]
    fn test_rejects_missing_header() {
        assert_eq!(extract_bearer_token(None), None);
    }

    #[test]
    fn test_rejects_malformed_prefix() {
        assert_eq!(extract_bearer_token(Some("Bear tok123")), None);
        assert_eq!(extract_bearer_token(Some("bearer tok123")), None);
        assert_eq!(extract_bearer_token(Some("Token tok123")), None);
    }

    #[test]
    fn test_rejects_empty_token() {
        assert_eq!(extract_bearer_token(Some("Bearer ")), None);
        assert_eq!(extract_bearer_token(Some("Bearer")), None);
    }

    #[test]
    fn test_require_maps_to_401_envelope() {
        let err = require_bearer_token(None).unwrap_err();
        assert_eq!(err.status(), 401);
        assert_eq!(err.envelope().error, "Session token required");
        let json = serde_json::to_string(&err.envelope()).unwrap();
        assert_eq!(json, r#"{"error":"Session token required"}"#);
    }

    #[test]
    fn test_token_survives_verbatim() {
        let token = "eyJhbGciOiJIUzI1NiJ9.payload.sig";
        let header = format!("Bearer {token}");
        assert_eq!(require_bearer_token(Some(&header)).unwrap(), token);
    }
}
