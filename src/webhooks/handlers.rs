//! Built-in reconciliation handlers.
//!
//! Each handler projects one slice of authorization-relevant state out of
//! a webhook payload using upsert semantics, plus an event-time guard: an
//! update older than the stored projection is dropped, so arrival order
//! cannot roll a newer state back to an older one (last-writer-wins by
//! event time, not arrival time).

use crate::billing::{StoreError, StoreFuture, SubscriptionStatus, SubscriptionStore};
use crate::config::ShopDomain;
use crate::webhooks::processor::{HandlerError, HandlerFuture, WebhookDelivery, WebhookHandler};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

impl From<StoreError> for HandlerError {
    fn from(e: StoreError) -> Self {
        Self::Store {
            message: e.to_string(),
        }
    }
}

/// Picks the event timestamp for a delivery: the sender's triggered-at
/// header, falling back to an `updated_at` field in the payload, falling
/// back to arrival time.
fn event_time(delivery: &WebhookDelivery, payload: &Value) -> DateTime<Utc> {
    delivery
        .triggered_at
        .or_else(|| {
            payload
                .get("updated_at")
                .and_then(Value::as_str)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.with_timezone(&Utc))
        })
        .unwrap_or_else(Utc::now)
}

/// Handles `app_subscriptions/update`: projects the payload into
/// [`SubscriptionStatus`] and upserts it by shop.
pub struct SubscriptionUpdateHandler {
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionUpdateHandler {
    /// Creates the handler over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store }
    }

    /// Extracts the subscription object: Shopify nests it under
    /// `app_subscription`, but a flat payload is accepted too.
    fn subscription_object(payload: &Value) -> &Value {
        payload.get("app_subscription").unwrap_or(payload)
    }

    fn project(delivery: &WebhookDelivery) -> Result<SubscriptionStatus, HandlerError> {
        let sub = Self::subscription_object(&delivery.payload);

        let status = sub
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::InvalidPayload {
                reason: "missing 'status' field".to_string(),
            })?;

        let plan_handle = sub
            .get("plan")
            .and_then(Value::as_str)
            .map(str::to_ascii_lowercase)
            .or_else(|| {
                // "Pro Plan" -> "pro"
                sub.get("name")
                    .and_then(Value::as_str)
                    .and_then(|name| name.split_whitespace().next())
                    .map(str::to_ascii_lowercase)
            });

        let now = Utc::now();
        let is_trial_active = sub
            .get("trial_ends_on")
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .is_some_and(|trial_end| trial_end > now);

        Ok(SubscriptionStatus {
            has_active_subscription: status.eq_ignore_ascii_case("active"),
            is_trial_active,
            plan_handle,
            updated_at: event_time(delivery, sub),
        })
    }
}

impl WebhookHandler for SubscriptionUpdateHandler {
    fn handle<'a>(&'a self, delivery: &'a WebhookDelivery) -> HandlerFuture<'a> {
        Box::pin(async move {
            let incoming = Self::project(delivery)?;

            // Event-time guard: never roll back to an older state
            if let Some(stored) = self.store.get(&delivery.shop).await? {
                if stored.updated_at > incoming.updated_at {
                    debug!(
                        shop = %delivery.shop,
                        stored_at = %stored.updated_at,
                        incoming_at = %incoming.updated_at,
                        "dropping stale subscription update"
                    );
                    return Ok(());
                }
            }

            info!(
                shop = %delivery.shop,
                active = incoming.has_active_subscription,
                plan = incoming.plan_handle.as_deref().unwrap_or("none"),
                "subscription status reconciled"
            );
            self.store.upsert(&delivery.shop, incoming).await?;
            Ok(())
        })
    }
}

/// Handles `app/uninstalled`: clears every projection for the shop.
pub struct AppUninstalledHandler {
    subscriptions: Arc<dyn SubscriptionStore>,
    embeds: Arc<dyn ThemeEmbedStore>,
}

impl AppUninstalledHandler {
    /// Creates the handler over the stores to clean up.
    #[must_use]
    pub fn new(
        subscriptions: Arc<dyn SubscriptionStore>,
        embeds: Arc<dyn ThemeEmbedStore>,
    ) -> Self {
        Self {
            subscriptions,
            embeds,
        }
    }
}

impl WebhookHandler for AppUninstalledHandler {
    fn handle<'a>(&'a self, delivery: &'a WebhookDelivery) -> HandlerFuture<'a> {
        Box::pin(async move {
            info!(shop = %delivery.shop, "app uninstalled; clearing shop state");
            self.subscriptions.remove(&delivery.shop).await?;
            self.embeds.remove(&delivery.shop).await?;
            Ok(())
        })
    }
}

/// Theme-embed projection: whether the storefront widgets are live, and on
/// which theme.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThemeEmbedStatus {
    /// Whether the app embed block is enabled on the published theme.
    pub embed_enabled: bool,
    /// The published theme's id, when known.
    pub theme_id: Option<i64>,
    /// Event time of the update this projection reflects.
    pub updated_at: DateTime<Utc>,
}

/// Storage contract for the theme-embed projection.
pub trait ThemeEmbedStore: Send + Sync {
    /// Creates or replaces the projection for `shop`.
    fn upsert<'a>(&'a self, shop: &'a ShopDomain, status: ThemeEmbedStatus) -> StoreFuture<'a, ()>;

    /// Fetches the projection for `shop`, if any.
    fn get<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, Option<ThemeEmbedStatus>>;

    /// Removes the projection for `shop`.
    fn remove<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, ()>;
}

/// In-process theme-embed store.
#[derive(Clone, Debug, Default)]
pub struct InMemoryThemeEmbedStore {
    map: Arc<RwLock<HashMap<String, ThemeEmbedStatus>>>,
}

impl InMemoryThemeEmbedStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThemeEmbedStore for InMemoryThemeEmbedStore {
    fn upsert<'a>(&'a self, shop: &'a ShopDomain, status: ThemeEmbedStatus) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.map.write().insert(shop.as_ref().to_string(), status);
            Ok(())
        })
    }

    fn get<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, Option<ThemeEmbedStatus>> {
        Box::pin(async move { Ok(self.map.read().get(shop.as_ref()).cloned()) })
    }

    fn remove<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.map.write().remove(shop.as_ref());
            Ok(())
        })
    }
}

/// Handles `themes/publish` and `themes/delete`, keeping the embed
/// projection pointed at the live theme.
pub struct ThemeEmbedHandler {
    store: Arc<dyn ThemeEmbedStore>,
}

impl ThemeEmbedHandler {
    /// Creates the handler over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn ThemeEmbedStore>) -> Self {
        Self { store }
    }
}

impl WebhookHandler for ThemeEmbedHandler {
    fn handle<'a>(&'a self, delivery: &'a WebhookDelivery) -> HandlerFuture<'a> {
        Box::pin(async move {
            let theme_id = delivery.payload.get("id").and_then(Value::as_i64);
            let stored = self.store.get(&delivery.shop).await?;
            let incoming_at = event_time(delivery, &delivery.payload);

            if let Some(stored) = &stored {
                if stored.updated_at > incoming_at {
                    debug!(shop = %delivery.shop, "dropping stale theme event");
                    return Ok(());
                }
            }

            use crate::webhooks::topic::WebhookTopic;
            match &delivery.topic {
                WebhookTopic::ThemesPublish => {
                    // A new published theme needs its embed re-verified;
                    // an explicit embed_enabled field (from our own
                    // verification pass) is trusted when present.
                    let embed_enabled = delivery
                        .payload
                        .get("embed_enabled")
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                    self.store
                        .upsert(
                            &delivery.shop,
                            ThemeEmbedStatus {
                                embed_enabled,
                                theme_id,
                                updated_at: incoming_at,
                            },
                        )
                        .await?;
                }
                WebhookTopic::ThemesDelete => {
                    // Only clear when the deleted theme is the one we track
                    if stored.as_ref().and_then(|s| s.theme_id) == theme_id {
                        self.store.remove(&delivery.shop).await?;
                    }
                }
                other => {
                    return Err(HandlerError::InvalidPayload {
                        reason: format!("theme handler routed topic {other}"),
                    })
                }
            }
            Ok(())
        })
    }
}

/// No-op handler for topics that only need acknowledgment (GDPR requests
/// and the commerce-object topics the storefront runtime consumes
/// elsewhere).
pub struct AcknowledgeHandler;

impl WebhookHandler for AcknowledgeHandler {
    fn handle<'a>(&'a self, delivery: &'a WebhookDelivery) -> HandlerFuture<'a> {
        Box::pin(async move {
            debug!(topic = %delivery.topic, shop = %delivery.shop, "acknowledged");
            Ok(())
        })
    }
}
