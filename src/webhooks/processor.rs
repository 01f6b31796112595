//! The webhook reconciliation processor.
//!
//! Invoked *after* the HTTP layer has already acknowledged the delivery
//! with 200, so nothing here is observable to the sender: failures are
//! retried with exponential backoff inside the same invocation and, on
//! exhaustion, logged and swallowed. That tradeoff keeps the app inside
//! the platform's acknowledgment SLA at the cost of silent permanent
//! failures, which is why every terminal failure is logged with topic,
//! shop, and error.
//!
//! Idempotence has two layers: handlers persist with upsert semantics, and
//! the processor checks a [`DeliveryLog`] of delivery ids before any
//! handler runs, so transport-level redeliveries are dropped even for
//! handlers with non-idempotent side effects.

use crate::config::ShopDomain;
use crate::webhooks::topic::WebhookTopic;
use crate::webhooks::verification::{WebhookContext, WebhookError};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, warn};

/// Default backoff base delay.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default backoff multiplier.
pub const DEFAULT_BACKOFF_MULTIPLIER: u32 = 2;

/// Default backoff ceiling.
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(30);

/// Default retry budget after the initial attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Error returned by a [`WebhookHandler`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The payload did not have the shape the handler expects.
    #[error("Invalid webhook payload: {reason}")]
    InvalidPayload {
        /// What was wrong with the payload.
        reason: String,
    },

    /// The backing store rejected the write.
    #[error("Store failure: {message}")]
    Store {
        /// Description from the store.
        message: String,
    },
}

/// Boxed future returned by [`WebhookHandler::handle`].
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;

/// Per-topic reconciliation logic.
///
/// Handlers must be idempotent with respect to redelivery of the same
/// payload; built-in handlers achieve this with upsert-by-shop persistence
/// plus the event-time ordering guard.
pub trait WebhookHandler: Send + Sync {
    /// Applies the delivery's side effects.
    fn handle<'a>(&'a self, delivery: &'a WebhookDelivery) -> HandlerFuture<'a>;
}

/// A delivery as seen by the processor: verified, parsed, and identified.
#[derive(Debug, Clone)]
pub struct WebhookDelivery {
    /// The parsed topic.
    pub topic: WebhookTopic,
    /// The shop the delivery is for.
    pub shop: ShopDomain,
    /// The parsed JSON payload.
    pub payload: serde_json::Value,
    /// Unique delivery id used for dedup.
    pub webhook_id: String,
    /// Event timestamp used for ordering, when the sender provided one.
    pub triggered_at: Option<DateTime<Utc>>,
}

impl WebhookDelivery {
    /// Builds a delivery from a verified [`WebhookContext`].
    ///
    /// When the sender provided no delivery id, a random one is minted so
    /// the delivery still flows through the dedup path uniformly; such
    /// deliveries cannot be deduplicated across redeliveries.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::MissingShopDomain`] when no shop header is present
    /// - [`WebhookError::InvalidPayload`] for malformed JSON bodies, or a
    ///   shop header that is not a myshopify.com domain
    pub fn from_context(context: &WebhookContext) -> Result<Self, WebhookError> {
        let shop_raw = context
            .shop_domain()
            .ok_or(WebhookError::MissingShopDomain)?;
        let shop = ShopDomain::new(shop_raw).map_err(|e| WebhookError::InvalidPayload {
            reason: e.to_string(),
        })?;
        let payload = context.payload()?;

        let webhook_id = context.webhook_id().map_or_else(
            || {
                let minted = format!("generated-{:016x}", rand::random::<u64>());
                debug!(id = %minted, "delivery carried no webhook id; minted one");
                minted
            },
            str::to_string,
        );

        Ok(Self {
            topic: context.topic().clone(),
            shop,
            payload,
            webhook_id,
            triggered_at: context.triggered_at(),
        })
    }
}

/// Result of processing one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `false` only when the handler exhausted its retry budget.
    pub success: bool,
    /// `true` when a handler actually ran; `false` for unknown topics,
    /// unregistered topics, and duplicate deliveries.
    pub processed: bool,
    /// Terminal error description, when `success` is `false`.
    pub error: Option<String>,
    /// Suggested wait before any out-of-band reprocessing attempt.
    pub retry_after: Option<Duration>,
}

impl ProcessOutcome {
    fn skipped() -> Self {
        Self {
            success: true,
            processed: false,
            error: None,
            retry_after: None,
        }
    }

    fn processed() -> Self {
        Self {
            success: true,
            processed: true,
            error: None,
            retry_after: None,
        }
    }
}

/// Exponential backoff schedule for handler retries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per retry.
    pub multiplier: u32,
    /// Ceiling on any single delay.
    pub max_delay: Duration,
    /// Retries after the initial attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
            max_delay: DEFAULT_MAX_DELAY,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay before retry number `retry` (zero-based):
    /// `min(base * multiplier^retry, max)`.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(retry);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Bounded check-and-set log of processed delivery ids.
///
/// [`record`](Self::record) returns `true` exactly once per id; the check
/// and the insert happen under one lock so concurrent redeliveries cannot
/// both pass. Capacity is bounded FIFO: once full, the oldest ids are
/// forgotten, which re-opens a dedup window only for deliveries older than
/// the whole retained history.
#[derive(Debug)]
pub struct DeliveryLog {
    inner: Mutex<DeliveryLogInner>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct DeliveryLogInner {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl DeliveryLog {
    /// Creates a log retaining up to `capacity` ids.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(DeliveryLogInner::default()),
            capacity: capacity.max(1),
        }
    }

    /// Records `id`; returns `true` if it was not seen before.
    pub fn record(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.seen.contains(id) {
            return false;
        }
        if inner.order.len() == self.capacity {
            if let Some(evicted) = inner.order.pop_front() {
                inner.seen.remove(&evicted);
            }
        }
        inner.seen.insert(id.to_string());
        inner.order.push_back(id.to_string());
        true
    }

    /// Returns the number of retained ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    /// Returns `true` if nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().order.is_empty()
    }
}

impl Default for DeliveryLog {
    fn default() -> Self {
        Self::new(10_000)
    }
}

/// Routes verified deliveries to handlers with dedup and retry.
pub struct WebhookProcessor {
    handlers: HashMap<String, Arc<dyn WebhookHandler>>,
    delivery_log: DeliveryLog,
    retry: RetryPolicy,
}

impl WebhookProcessor {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> WebhookProcessorBuilder {
        WebhookProcessorBuilder::default()
    }

    /// Processes one delivery to completion.
    ///
    /// Unknown and unregistered topics are acknowledged as no-ops rather
    /// than errors, keeping the router forward-compatible. Duplicate
    /// delivery ids are dropped before any handler runs. Handler failures
    /// are retried per the [`RetryPolicy`]; exhaustion yields
    /// `success: false` and is observable only through logs.
    pub async fn process(&self, delivery: WebhookDelivery) -> ProcessOutcome {
        let topic_str = delivery.topic.as_topic_str().to_string();

        let Some(handler) = self.handlers.get(&topic_str) else {
            debug!(topic = %topic_str, "no handler registered; acknowledging as no-op");
            return ProcessOutcome::skipped();
        };

        if !self.delivery_log.record(&delivery.webhook_id) {
            debug!(
                topic = %topic_str,
                webhook_id = %delivery.webhook_id,
                "duplicate delivery dropped"
            );
            return ProcessOutcome::skipped();
        }

        let mut last_error: Option<HandlerError> = None;
        for attempt in 0..=self.retry.max_retries {
            if attempt > 0 {
                let delay = self.retry.delay(attempt - 1);
                warn!(
                    topic = %topic_str,
                    shop = %delivery.shop,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying webhook handler"
                );
                tokio::time::sleep(delay).await;
            }

            match handler.handle(&delivery).await {
                Ok(()) => {
                    debug!(topic = %topic_str, shop = %delivery.shop, "webhook processed");
                    return ProcessOutcome::processed();
                }
                Err(e) => last_error = Some(e),
            }
        }

        // Exhausted. The sender already got its 200; logs are the only
        // place this failure exists.
        let err = last_error.map_or_else(String::new, |e| e.to_string());
        error!(
            topic = %topic_str,
            shop = %delivery.shop,
            webhook_id = %delivery.webhook_id,
            error = %err,
            "webhook processing failed after all retries"
        );
        ProcessOutcome {
            success: false,
            processed: true,
            error: Some(err),
            retry_after: Some(self.retry.delay(self.retry.max_retries)),
        }
    }
}

/// Builder for [`WebhookProcessor`].
#[derive(Default)]
pub struct WebhookProcessorBuilder {
    handlers: HashMap<String, Arc<dyn WebhookHandler>>,
    delivery_log: Option<DeliveryLog>,
    retry: Option<RetryPolicy>,
}

impl WebhookProcessorBuilder {
    /// Registers a handler for a topic. Last registration per topic wins.
    #[must_use]
    pub fn handler(mut self, topic: WebhookTopic, handler: Arc<dyn WebhookHandler>) -> Self {
        self.handlers
            .insert(topic.as_topic_str().to_string(), handler);
        self
    }

    /// Overrides the delivery log (capacity, or a persistent impl wrapped
    /// in this type's interface).
    #[must_use]
    pub fn delivery_log(mut self, log: DeliveryLog) -> Self {
        self.delivery_log = Some(log);
        self
    }

    /// Overrides the retry policy.
    #[must_use]
    pub const fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Builds the processor.
    #[must_use]
    pub fn build(self) -> WebhookProcessor {
        WebhookProcessor {
            handlers: self.handlers,
            delivery_log: self.delivery_log.unwrap_or_default(),
            retry: self.retry.unwrap_or_default(),
        }
    }
}
