//! End-to-end webhook pipeline tests.
//!
//! Exercise the full path a real delivery takes: HMAC classification,
//! context parsing, processing through the registered handler, and the
//! billing state the admin UI would read afterwards.

use std::sync::Arc;
use urgify_core::auth::hmac::compute_signature_base64;
use urgify_core::billing::{BillingGate, InMemorySubscriptionStore, Plan};
use urgify_core::webhooks::{
    classify_delivery, Delivery, SubscriptionUpdateHandler, WebhookDelivery, WebhookError,
    WebhookProcessor, WebhookRequest, WebhookTopic,
};
use urgify_core::{ApiKey, ApiSecretKey, UrgifyConfig};

const SECRET: &str = "webhook-secret";

fn config() -> UrgifyConfig {
    UrgifyConfig::builder()
        .api_key(ApiKey::new("key").unwrap())
        .api_secret_key(ApiSecretKey::new(SECRET).unwrap())
        .build()
        .unwrap()
}

fn signed_request(body: &[u8], topic: &str, webhook_id: &str) -> WebhookRequest {
    WebhookRequest::new(
        body.to_vec(),
        Some(compute_signature_base64(body, SECRET)),
        Some(topic.to_string()),
        Some("scenario-shop.myshopify.com".to_string()),
        Some("2025-07".to_string()),
        Some(webhook_id.to_string()),
        Some("2026-08-25T12:00:00Z".to_string()),
    )
}

#[tokio::test]
async fn test_subscription_update_flows_through_to_billing_gate() {
    // A signed app_subscriptions/update delivery reporting an active Pro
    // plan must become visible through the billing gate.
    let store = Arc::new(InMemorySubscriptionStore::new());
    let processor = WebhookProcessor::builder()
        .handler(
            WebhookTopic::AppSubscriptionsUpdate,
            Arc::new(SubscriptionUpdateHandler::new(store.clone())),
        )
        .build();

    let body = serde_json::to_vec(&serde_json::json!({
        "app_subscription": {
            "name": "Pro Plan",
            "status": "ACTIVE",
        }
    }))
    .unwrap();
    let request = signed_request(&body, "app_subscriptions/update", "delivery-1");

    let delivery = match classify_delivery(&config(), &request).unwrap() {
        Delivery::Verified(context) => WebhookDelivery::from_context(&context).unwrap(),
        Delivery::TestPing => panic!("signed delivery classified as test ping"),
    };
    let shop = delivery.shop.clone();

    let outcome = processor.process(delivery).await;
    assert!(outcome.success && outcome.processed);

    let gate = BillingGate::new(store);
    let status = gate.subscription_status(&shop).await.unwrap();
    assert!(status.has_active_subscription);
    assert!(gate.has_access(&shop, Plan::Pro).await.unwrap());
    // Popups stay gated behind plus
    assert!(!gate.has_access(&shop, Plan::Plus).await.unwrap());
}

#[tokio::test]
async fn test_delivery_without_signature_is_a_test_ping() {
    // Missing HMAC header: acknowledge without invoking any handler
    let request = WebhookRequest::new(
        b"{}".to_vec(),
        None,
        Some("app_subscriptions/update".to_string()),
        Some("scenario-shop.myshopify.com".to_string()),
        None,
        None,
        None,
    );
    let delivery = classify_delivery(&config(), &request).unwrap();
    assert!(matches!(delivery, Delivery::TestPing));
}

#[tokio::test]
async fn test_tampered_body_is_rejected() {
    let body = br#"{"status":"ACTIVE"}"#;
    let mut request = signed_request(body, "app_subscriptions/update", "delivery-2");
    // Re-sign nothing; swap the body out from under the signature
    request = WebhookRequest::new(
        br#"{"status":"CANCELLED"}"#.to_vec(),
        request.hmac_header().map(str::to_string),
        request.topic().map(str::to_string),
        request.shop_domain().map(str::to_string),
        None,
        None,
        None,
    );

    let result = classify_delivery(&config(), &request);
    assert_eq!(result.unwrap_err(), WebhookError::InvalidSignature);
}

#[tokio::test]
async fn test_redelivered_webhook_id_is_processed_once() {
    let store = Arc::new(InMemorySubscriptionStore::new());
    let processor = WebhookProcessor::builder()
        .handler(
            WebhookTopic::AppSubscriptionsUpdate,
            Arc::new(SubscriptionUpdateHandler::new(store)),
        )
        .build();

    let body = serde_json::to_vec(&serde_json::json!({"status": "ACTIVE"})).unwrap();
    let make_delivery = || {
        let request = signed_request(&body, "app_subscriptions/update", "same-delivery");
        match classify_delivery(&config(), &request).unwrap() {
            Delivery::Verified(context) => WebhookDelivery::from_context(&context).unwrap(),
            Delivery::TestPing => unreachable!(),
        }
    };

    let first = processor.process(make_delivery()).await;
    let second = processor.process(make_delivery()).await;
    assert!(first.processed);
    // Same delivery id: dropped before the handler, still a success
    assert!(second.success && !second.processed);
}

#[tokio::test]
async fn test_unregistered_topic_is_acknowledged_as_no_op() {
    let processor = WebhookProcessor::builder().build();

    let body = serde_json::to_vec(&serde_json::json!({"id": 9})).unwrap();
    let request = signed_request(&body, "carts/create", "delivery-3");
    let delivery = match classify_delivery(&config(), &request).unwrap() {
        Delivery::Verified(context) => WebhookDelivery::from_context(&context).unwrap(),
        Delivery::TestPing => unreachable!(),
    };

    let outcome = processor.process(delivery).await;
    assert!(outcome.success);
    assert!(!outcome.processed);
}

#[tokio::test]
async fn test_missing_shop_header_is_an_error_at_parse_time() {
    let body = serde_json::to_vec(&serde_json::json!({"status": "ACTIVE"})).unwrap();
    let request = WebhookRequest::new(
        body.clone(),
        Some(compute_signature_base64(&body, SECRET)),
        Some("app_subscriptions/update".to_string()),
        None,
        None,
        Some("delivery-4".to_string()),
        None,
    );

    let context = match classify_delivery(&config(), &request).unwrap() {
        Delivery::Verified(context) => context,
        Delivery::TestPing => unreachable!(),
    };
    let result = WebhookDelivery::from_context(&context);
    assert_eq!(result.unwrap_err(), WebhookError::MissingShopDomain);
}
