//! Persistence contracts for the subscription projection.
//!
//! The projection is owned by the webhook reconciliation handlers and the
//! explicit resync routine; everything else reads. In production the
//! backing store is a shop metafield (see
//! [`crate::upstream::MetafieldSubscriptionStore`]); tests and single-node
//! deployments can use [`InMemorySubscriptionStore`].

use crate::billing::SubscriptionStatus;
use crate::config::ShopDomain;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future returned by [`SubscriptionStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Error produced by store implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The projection could not be (de)serialized.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description.
        message: String,
    },

    /// The backend rejected or failed the operation.
    #[error("Backend failure: {message}")]
    Backend {
        /// Error description.
        message: String,
    },
}

/// Storage contract for the per-shop subscription projection.
///
/// `upsert` must be last-write-wins by call order; the event-time ordering
/// guard lives in the webhook handler, not here.
pub trait SubscriptionStore: Send + Sync {
    /// Creates or replaces the projection for `shop`.
    fn upsert<'a>(&'a self, shop: &'a ShopDomain, status: SubscriptionStatus)
        -> StoreFuture<'a, ()>;

    /// Fetches the projection for `shop`, if any.
    fn get<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, Option<SubscriptionStatus>>;

    /// Removes the projection for `shop` (uninstall cleanup).
    fn remove<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, ()>;
}

/// In-process store backed by a shared map.
#[derive(Clone, Debug, Default)]
pub struct InMemorySubscriptionStore {
    map: Arc<RwLock<HashMap<String, SubscriptionStatus>>>,
}

impl InMemorySubscriptionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of shops with a projection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Returns `true` when no projections exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl SubscriptionStore for InMemorySubscriptionStore {
    fn upsert<'a>(
        &'a self,
        shop: &'a ShopDomain,
        status: SubscriptionStatus,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.map.write().insert(shop.as_ref().to_string(), status);
            Ok(())
        })
    }

    fn get<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, Option<SubscriptionStatus>> {
        Box::pin(async move { Ok(self.map.read().get(shop.as_ref()).cloned()) })
    }

    fn remove<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.map.write().remove(shop.as_ref());
            Ok(())
        })
    }
}
