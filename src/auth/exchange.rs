//! Token exchange: App Bridge session token → Admin access token.
//!
//! Implements the OAuth 2.0 Token Exchange grant (RFC 8693) used by
//! embedded apps. The session token the client acquired and attached as a
//! bearer header is validated (see [`crate::auth::jwt`]) and then exchanged
//! at the shop's token endpoint for an access token, producing a
//! [`Session`] for upstream Admin API calls.
//!
//! - [`exchange_offline_token`]: app-level token, used by webhooks and
//!   background reconciliation.
//! - [`exchange_online_token`]: user-specific token that expires with the
//!   admin session.

use crate::auth::jwt::{JwtError, SessionTokenPayload};
use crate::auth::Session;
use crate::config::{ShopDomain, UrgifyConfig};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Grant type for token exchange (RFC 8693).
const TOKEN_EXCHANGE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:token-exchange";

/// Subject token type for App Bridge id tokens.
const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";

/// Errors produced during token exchange.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// Token exchange is only available to embedded apps.
    #[error("Token exchange requires an embedded app configuration")]
    NotEmbeddedApp,

    /// The session token failed validation.
    #[error(transparent)]
    InvalidSessionToken(#[from] JwtError),

    /// The token endpoint rejected the exchange or could not be reached.
    #[error("Token exchange failed (status {status}): {message}")]
    ExchangeFailed {
        /// HTTP status of the response, or 0 for transport errors.
        status: u16,
        /// Error body or transport error description.
        message: String,
    },
}

/// The kind of access token requested from the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestedTokenType {
    OnlineAccessToken,
    OfflineAccessToken,
}

impl RequestedTokenType {
    const fn as_urn(self) -> &'static str {
        match self {
            Self::OnlineAccessToken => "urn:shopify:params:oauth:token-type:online-access-token",
            Self::OfflineAccessToken => "urn:shopify:params:oauth:token-type:offline-access-token",
        }
    }
}

/// Request body for the token endpoint.
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
    subject_token: &'a str,
    subject_token_type: &'a str,
    requested_token_type: &'a str,
}

/// Successful response from the token endpoint.
#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
    scope: Option<String>,
    expires_in: Option<i64>,
    associated_user_id: Option<i64>,
}

/// Error response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenExchangeErrorResponse {
    error: Option<String>,
}

/// Exchanges a session token for an offline (app-level) access token.
///
/// # Errors
///
/// - [`ExchangeError::NotEmbeddedApp`] if the config is not embedded
/// - [`ExchangeError::InvalidSessionToken`] if the session token fails
///   JWT validation or is rejected by the token endpoint
/// - [`ExchangeError::ExchangeFailed`] for transport or endpoint errors
pub async fn exchange_offline_token(
    config: &UrgifyConfig,
    shop: &ShopDomain,
    session_token: &str,
) -> Result<Session, ExchangeError> {
    let token_url = format!("https://{}/admin/oauth/access_token", shop.as_ref());
    exchange_token(
        config,
        shop,
        session_token,
        RequestedTokenType::OfflineAccessToken,
        &token_url,
    )
    .await
}

/// Exchanges a session token for an online (user-specific) access token.
///
/// Online tokens expire; the returned [`Session`] carries the expiration
/// reported by the endpoint.
///
/// # Errors
///
/// Same as [`exchange_offline_token`].
pub async fn exchange_online_token(
    config: &UrgifyConfig,
    shop: &ShopDomain,
    session_token: &str,
) -> Result<Session, ExchangeError> {
    let token_url = format!("https://{}/admin/oauth/access_token", shop.as_ref());
    exchange_token(
        config,
        shop,
        session_token,
        RequestedTokenType::OnlineAccessToken,
        &token_url,
    )
    .await
}

async fn exchange_token(
    config: &UrgifyConfig,
    shop: &ShopDomain,
    session_token: &str,
    requested_token_type: RequestedTokenType,
    token_url: &str,
) -> Result<Session, ExchangeError> {
    if !config.is_embedded() {
        return Err(ExchangeError::NotEmbeddedApp);
    }

    // Validate the JWT locally before spending a round trip on it
    SessionTokenPayload::decode(session_token, config)?;

    let request_body = TokenExchangeRequest {
        client_id: config.api_key().as_ref(),
        client_secret: config.api_secret_key().as_ref(),
        grant_type: TOKEN_EXCHANGE_GRANT_TYPE,
        subject_token: session_token,
        subject_token_type: ID_TOKEN_TYPE,
        requested_token_type: requested_token_type.as_urn(),
    };

    let client = reqwest::Client::new();
    let response = client
        .post(token_url)
        .json(&request_body)
        .send()
        .await
        .map_err(|e| ExchangeError::ExchangeFailed {
            status: 0,
            message: format!("Network error: {e}"),
        })?;

    let status = response.status().as_u16();

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();

        if status == 400 {
            if let Ok(error_response) =
                serde_json::from_str::<TokenExchangeErrorResponse>(&error_body)
            {
                if error_response.error.as_deref() == Some("invalid_subject_token") {
                    return Err(ExchangeError::InvalidSessionToken(
                        JwtError::InvalidSessionToken {
                            reason: "Session token was rejected by token exchange".to_string(),
                        },
                    ));
                }
            }
        }

        return Err(ExchangeError::ExchangeFailed {
            status,
            message: error_body,
        });
    }

    let token_response: AccessTokenResponse =
        response
            .json()
            .await
            .map_err(|e| ExchangeError::ExchangeFailed {
                status,
                message: format!("Failed to parse token response: {e}"),
            })?;

    let is_online = requested_token_type == RequestedTokenType::OnlineAccessToken;
    let expires = token_response
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs));
    let id = if is_online {
        let user = token_response
            .associated_user_id
            .map_or_else(|| "unknown".to_string(), |id| id.to_string());
        format!("{}_{user}", shop.as_ref())
    } else {
        Session::offline_id(shop)
    };

    Ok(Session::new(
        id,
        shop.clone(),
        token_response.access_token,
        token_response.scope,
        is_online,
        expires,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiKey, ApiSecretKey};
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde::Serialize;
    use serde_json::json;
    use std::time::{SystemTime, UNIX_EPOCH};
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

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

    fn mint_session_token(shop: &str, api_key: &str, secret: &str) -> String {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64;
        let claims = TestClaims {
            iss: format!("https://{shop}/admin"),
            dest: format!("https://{shop}"),
            aud: api_key.to_string(),
            sub: None,
            exp: ts + 60,
            nbf: ts - 5,
            iat: ts,
            jti: format!("jti-{ts}"),
            sid: None,
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn embedded_config() -> UrgifyConfig {
        UrgifyConfig::builder()
            .api_key(ApiKey::new("test-key").unwrap())
            .api_secret_key(ApiSecretKey::new("test-secret").unwrap())
            .is_embedded(true)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_non_embedded_config() {
        let config = UrgifyConfig::builder()
            .api_key(ApiKey::new("test-key").unwrap())
            .api_secret_key(ApiSecretKey::new("test-secret").unwrap())
            .is_embedded(false)
            .build()
            .unwrap();
        let shop = ShopDomain::new("my-store").unwrap();

        let result = exchange_offline_token(&config, &shop, "whatever").await;
        assert!(matches!(result, Err(ExchangeError::NotEmbeddedApp)));
    }

    #[tokio::test]
    async fn test_rejects_invalid_session_token_before_network() {
        let config = embedded_config();
        let shop = ShopDomain::new("my-store").unwrap();

        let result = exchange_offline_token(&config, &shop, "not-a-jwt").await;
        assert!(matches!(
            result,
            Err(ExchangeError::InvalidSessionToken(_))
        ));
    }

    #[tokio::test]
    async fn test_successful_offline_exchange() {
        let config = embedded_config();
        let shop = ShopDomain::new("my-store").unwrap();
        let session_token =
            mint_session_token("my-store.myshopify.com", "test-key", "test-secret");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/oauth/access_token"))
            .and(body_partial_json(json!({
                "grant_type": TOKEN_EXCHANGE_GRANT_TYPE,
                "subject_token_type": ID_TOKEN_TYPE,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "shpat_abc123",
                "scope": "write_products",
            })))
            .mount(&server)
            .await;

        let token_url = format!("{}/admin/oauth/access_token", server.uri());
        let session = exchange_token(
            &config,
            &shop,
            &session_token,
            RequestedTokenType::OfflineAccessToken,
            &token_url,
        )
        .await
        .unwrap();

        assert_eq!(session.access_token, "shpat_abc123");
        assert_eq!(session.scope.as_deref(), Some("write_products"));
        assert!(!session.is_online);
        assert!(session.expires.is_none());
        assert_eq!(session.id, "offline_my-store.myshopify.com");
    }

    #[tokio::test]
    async fn test_online_exchange_carries_expiry() {
        let config = embedded_config();
        let shop = ShopDomain::new("my-store").unwrap();
        let session_token =
            mint_session_token("my-store.myshopify.com", "test-key", "test-secret");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/oauth/access_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "shpat_online",
                "scope": "write_products",
                "expires_in": 86_400,
                "associated_user_id": 42,
            })))
            .mount(&server)
            .await;

        let token_url = format!("{}/admin/oauth/access_token", server.uri());
        let session = exchange_token(
            &config,
            &shop,
            &session_token,
            RequestedTokenType::OnlineAccessToken,
            &token_url,
        )
        .await
        .unwrap();

        assert!(session.is_online);
        assert!(session.expires.is_some());
        assert_eq!(session.id, "my-store.myshopify.com_42");
    }

    #[tokio::test]
    async fn test_invalid_subject_token_maps_to_jwt_error() {
        let config = embedded_config();
        let shop = ShopDomain::new("my-store").unwrap();
        let session_token =
            mint_session_token("my-store.myshopify.com", "test-key", "test-secret");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/oauth/access_token"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "error": "invalid_subject_token" })),
            )
            .mount(&server)
            .await;

        let token_url = format!("{}/admin/oauth/access_token", server.uri());
        let result = exchange_token(
            &config,
            &shop,
            &session_token,
            RequestedTokenType::OfflineAccessToken,
            &token_url,
        )
        .await;

        assert!(matches!(
            result,
            Err(ExchangeError::InvalidSessionToken(_))
        ));
    }

    #[tokio::test]
    async fn test_endpoint_error_is_surfaced() {
        let config = embedded_config();
        let shop = ShopDomain::new("my-store").unwrap();
        let session_token =
            mint_session_token("my-store.myshopify.com", "test-key", "test-secret");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/oauth/access_token"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let token_url = format!("{}/admin/oauth/access_token", server.uri());
        let result = exchange_token(
            &config,
            &shop,
            &session_token,
            RequestedTokenType::OfflineAccessToken,
            &token_url,
        )
        .await;

        match result {
            Err(ExchangeError::ExchangeFailed { status, message }) => {
                assert_eq!(status, 500);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
