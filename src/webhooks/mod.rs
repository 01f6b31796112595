//! Webhook verification and reconciliation.
//!
//! Inbound webhooks are the asynchronous half of the authorization
//! pipeline: they keep subscription and theme-embed state consistent
//! without a central lock. The flow is:
//!
//! 1. [`verification`]: HMAC-verify the delivery (missing signature header
//!    means a test ping, acknowledged without processing).
//! 2. The HTTP layer responds `200 {ok: true}` immediately.
//! 3. [`processor`]: fire-and-forget reconciliation with retry/backoff and
//!    delivery-id dedup; failures are logged, never surfaced to the sender.
//! 4. [`handlers`]: per-topic projections (subscription status, theme
//!    embed status) written with upsert semantics and event-time ordering.

pub mod handlers;
pub mod processor;
pub mod topic;
pub mod verification;

pub use handlers::{
    AcknowledgeHandler, AppUninstalledHandler, InMemoryThemeEmbedStore, SubscriptionUpdateHandler,
    ThemeEmbedHandler, ThemeEmbedStatus, ThemeEmbedStore,
};
pub use processor::{
    DeliveryLog, HandlerError, ProcessOutcome, RetryPolicy, WebhookDelivery, WebhookHandler,
    WebhookProcessor, WebhookProcessorBuilder,
};
pub use topic::WebhookTopic;
pub use verification::{
    classify_delivery, verify_hmac, verify_webhook, Delivery, WebhookContext, WebhookError,
    WebhookRequest, HEADER_API_VERSION, HEADER_HMAC, HEADER_SHOP_DOMAIN, HEADER_TOPIC,
    HEADER_TRIGGERED_AT, HEADER_WEBHOOK_ID,
};
