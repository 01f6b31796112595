//! Billing state and feature access.
//!
//! [`SubscriptionStatus`] is a cached projection of billing state, written
//! only by the webhook reconciliation handlers and the explicit resync
//! routine. [`BillingGate`] reads it to answer feature-access questions:
//! access is a pure function of the reconciled plan against a fixed
//! ranking, with an optional resync hook consulted first. Staleness is
//! acceptable; reverting to an older state after a newer one was applied
//! is not (the event-time guard in the subscription handler enforces
//! that).

mod store;

pub use store::{InMemorySubscriptionStore, StoreError, StoreFuture, SubscriptionStore};

use crate::config::ShopDomain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::warn;

/// Plans the app sells, ranked. Feature gates compare ranks, so a higher
/// plan implies every lower plan's features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Plan {
    /// The free tier.
    Free,
    /// The paid "Pro" plan.
    Pro,
    /// The paid "Plus" plan; popups are gated to this.
    Plus,
}

impl Plan {
    /// Parses a plan handle. Unknown handles fold to [`Plan::Free`] so an
    /// unexpected value can never grant paid features.
    #[must_use]
    pub fn from_handle(handle: &str) -> Self {
        match handle.to_ascii_lowercase().as_str() {
            "plus" => Self::Plus,
            "pro" => Self::Pro,
            _ => Self::Free,
        }
    }

    /// The canonical handle string.
    #[must_use]
    pub const fn handle(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Plus => "plus",
        }
    }
}

/// The cached projection of a shop's billing state.
///
/// Persisted as a JSON blob in a shop metafield so both the admin UI
/// loaders and the storefront runtime read the same value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    /// Whether an `ACTIVE` subscription is on file.
    pub has_active_subscription: bool,
    /// Whether a trial window is currently open.
    pub is_trial_active: bool,
    /// The subscribed plan handle, if any.
    pub plan_handle: Option<String>,
    /// Event time of the update this projection reflects. Used by the
    /// reconciliation handler to reject stale webhook deliveries.
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionStatus {
    /// The projection for a shop with no subscription on file.
    #[must_use]
    pub fn none() -> Self {
        Self {
            has_active_subscription: false,
            is_trial_active: false,
            plan_handle: None,
            updated_at: Utc::now(),
        }
    }

    /// The effective plan: the subscribed plan when the subscription is
    /// active or trialing, free otherwise.
    #[must_use]
    pub fn effective_plan(&self) -> Plan {
        if !self.has_active_subscription && !self.is_trial_active {
            return Plan::Free;
        }
        self.plan_handle
            .as_deref()
            .map_or(Plan::Free, Plan::from_handle)
    }
}

/// Boxed future returned by [`SyncSource::resync`].
pub type SyncFuture<'a> = Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + 'a>>;

/// On-demand resync of the projection from the source of truth.
///
/// Wired to the upstream billing API in production; the gate treats a
/// resync failure as "serve the cached projection".
pub trait SyncSource: Send + Sync {
    /// Refreshes the stored projection for `shop`.
    fn resync<'a>(&'a self, shop: &'a ShopDomain) -> SyncFuture<'a>;
}

/// Reads the reconciled subscription projection to authorize features.
///
/// Side-effect-free except for the optional resync.
pub struct BillingGate {
    store: Arc<dyn SubscriptionStore>,
    sync: Option<Arc<dyn SyncSource>>,
}

impl BillingGate {
    /// Creates a gate over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn SubscriptionStore>) -> Self {
        Self { store, sync: None }
    }

    /// Adds an on-demand resync consulted before each evaluation.
    #[must_use]
    pub fn with_sync(mut self, sync: Arc<dyn SyncSource>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Returns the shop's subscription status.
    ///
    /// A shop with no stored projection reports no subscription. A resync
    /// failure is logged and the cached projection served.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store read itself fails.
    pub async fn subscription_status(
        &self,
        shop: &ShopDomain,
    ) -> Result<SubscriptionStatus, StoreError> {
        if let Some(sync) = &self.sync {
            if let Err(error) = sync.resync(shop).await {
                warn!(shop = %shop, %error, "subscription resync failed; serving cached state");
            }
        }
        Ok(self
            .store
            .get(shop)
            .await?
            .unwrap_or_else(SubscriptionStatus::none))
    }

    /// Returns `true` when the shop's effective plan covers `required`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store read fails.
    pub async fn has_access(&self, shop: &ShopDomain, required: Plan) -> Result<bool, StoreError> {
        let status = self.subscription_status(shop).await?;
        Ok(status.effective_plan() >= required)
    }
}
