//! Webhook signature verification.
//!
//! Shopify signs each delivery with HMAC-SHA256 over the raw body, base64
//! encoded in the `X-Shopify-Hmac-Sha256` header. Verification supports
//! key rotation (primary secret first, then the old secret) and uses
//! constant-time comparison throughout.
//!
//! A delivery *without* the signature header is treated as a test ping:
//! the route answers 200 immediately and the reconciliation processor is
//! never invoked. See [`classify_delivery`].

use crate::auth::hmac::{compute_signature_base64, constant_time_compare};
use crate::config::UrgifyConfig;
use crate::webhooks::topic::WebhookTopic;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// HTTP header carrying the base64 HMAC-SHA256 signature of the body.
pub const HEADER_HMAC: &str = "X-Shopify-Hmac-Sha256";

/// HTTP header carrying the topic string (e.g. `app_subscriptions/update`).
pub const HEADER_TOPIC: &str = "X-Shopify-Topic";

/// HTTP header carrying the shop's myshopify.com domain.
pub const HEADER_SHOP_DOMAIN: &str = "X-Shopify-Shop-Domain";

/// HTTP header carrying the API version of the payload format.
pub const HEADER_API_VERSION: &str = "X-Shopify-API-Version";

/// HTTP header carrying the unique delivery id, used for idempotency.
pub const HEADER_WEBHOOK_ID: &str = "X-Shopify-Webhook-Id";

/// HTTP header carrying the event timestamp (RFC 3339), used for ordering.
pub const HEADER_TRIGGERED_AT: &str = "X-Shopify-Triggered-At";

/// Errors produced while verifying or parsing a webhook delivery.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// The signature did not match with any configured secret.
    #[error("Webhook HMAC verification failed")]
    InvalidSignature,

    /// The delivery body was not valid JSON.
    #[error("Webhook payload was not valid JSON: {reason}")]
    InvalidPayload {
        /// Parse error description.
        reason: String,
    },

    /// The delivery carried no shop domain header where one is required.
    #[error("Webhook delivery is missing the shop domain header")]
    MissingShopDomain,
}

/// An inbound webhook delivery: raw body plus the `X-Shopify-*` headers.
///
/// The body is kept as raw bytes so the HMAC is computed over exactly what
/// was received, with no UTF-8 or JSON round trip in between.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    body: Vec<u8>,
    hmac_header: Option<String>,
    topic: Option<String>,
    shop_domain: Option<String>,
    api_version: Option<String>,
    webhook_id: Option<String>,
    triggered_at: Option<String>,
}

impl WebhookRequest {
    /// Creates a request from the raw body and header values.
    #[must_use]
    pub const fn new(
        body: Vec<u8>,
        hmac_header: Option<String>,
        topic: Option<String>,
        shop_domain: Option<String>,
        api_version: Option<String>,
        webhook_id: Option<String>,
        triggered_at: Option<String>,
    ) -> Self {
        Self {
            body,
            hmac_header,
            topic,
            shop_domain,
            api_version,
            webhook_id,
            triggered_at,
        }
    }

    /// The raw request body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// The signature header value, if present.
    #[must_use]
    pub fn hmac_header(&self) -> Option<&str> {
        self.hmac_header.as_deref()
    }

    /// The topic header value, if present.
    #[must_use]
    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// The shop domain header value, if present.
    #[must_use]
    pub fn shop_domain(&self) -> Option<&str> {
        self.shop_domain.as_deref()
    }
}

/// A verified webhook delivery, ready for routing.
#[derive(Debug, Clone)]
pub struct WebhookContext {
    topic: WebhookTopic,
    shop_domain: Option<String>,
    api_version: Option<String>,
    webhook_id: Option<String>,
    triggered_at: Option<DateTime<Utc>>,
    body: Vec<u8>,
}

impl WebhookContext {
    /// The parsed topic.
    #[must_use]
    pub const fn topic(&self) -> &WebhookTopic {
        &self.topic
    }

    /// The shop domain header value.
    #[must_use]
    pub fn shop_domain(&self) -> Option<&str> {
        self.shop_domain.as_deref()
    }

    /// The payload API version.
    #[must_use]
    pub fn api_version(&self) -> Option<&str> {
        self.api_version.as_deref()
    }

    /// The unique delivery id.
    #[must_use]
    pub fn webhook_id(&self) -> Option<&str> {
        self.webhook_id.as_deref()
    }

    /// The event timestamp, when the header parsed as RFC 3339.
    #[must_use]
    pub const fn triggered_at(&self) -> Option<DateTime<Utc>> {
        self.triggered_at
    }

    /// The raw body.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookError::InvalidPayload`] for malformed bodies.
    pub fn payload(&self) -> Result<serde_json::Value, WebhookError> {
        serde_json::from_slice(&self.body).map_err(|e| WebhookError::InvalidPayload {
            reason: e.to_string(),
        })
    }
}

/// Result of classifying an inbound delivery.
#[derive(Debug, Clone)]
pub enum Delivery {
    /// No signature header: a test ping. Acknowledge with 200, do not
    /// invoke the processor.
    TestPing,
    /// Signature verified; route to the processor.
    Verified(WebhookContext),
}

/// Low-level HMAC verification for custom integrations.
///
/// Computes HMAC-SHA256 over `body` with `secret` and compares it to the
/// base64 `signature` in constant time.
#[must_use]
pub fn verify_hmac(body: &[u8], signature: &str, secret: &str) -> bool {
    let computed = compute_signature_base64(body, secret);
    constant_time_compare(&computed, signature)
}

/// Verifies a webhook delivery that carries a signature header.
///
/// Tries the primary API secret, then the old secret when configured.
///
/// # Errors
///
/// Returns [`WebhookError::InvalidSignature`] when no configured secret
/// produces a matching signature (including when the header is absent;
/// use [`classify_delivery`] if test pings should be tolerated).
pub fn verify_webhook(
    config: &UrgifyConfig,
    request: &WebhookRequest,
) -> Result<WebhookContext, WebhookError> {
    let signature = request
        .hmac_header()
        .ok_or(WebhookError::InvalidSignature)?;

    let mut verified = verify_hmac(request.body(), signature, config.api_secret_key().as_ref());
    if !verified {
        if let Some(old_secret) = config.old_api_secret_key() {
            verified = verify_hmac(request.body(), signature, old_secret.as_ref());
        }
    }
    if !verified {
        return Err(WebhookError::InvalidSignature);
    }

    let topic = request
        .topic
        .as_deref()
        .map_or(WebhookTopic::Unknown(String::new()), WebhookTopic::from_header);

    let triggered_at = request
        .triggered_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(WebhookContext {
        topic,
        shop_domain: request.shop_domain.clone(),
        api_version: request.api_version.clone(),
        webhook_id: request.webhook_id.clone(),
        triggered_at,
        body: request.body.clone(),
    })
}

/// Classifies an inbound delivery: test ping or verified webhook.
///
/// The strictness of authentication is gated on the presence of the
/// signature header. Absent header = test ping, always acknowledged;
/// present header = full verification is required.
///
/// # Errors
///
/// Returns [`WebhookError::InvalidSignature`] when a signature header is
/// present but does not verify.
pub fn classify_delivery(
    config: &UrgifyConfig,
    request: &WebhookRequest,
) -> Result<Delivery, WebhookError> {
    if request.hmac_header().is_none() {
        return Ok(Delivery::TestPing);
    }
    verify_webhook(config, request).map(Delivery::Verified)
}
