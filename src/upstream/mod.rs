//! Outbound Admin API plumbing.
//!
//! [`UpstreamClient`] executes GraphQL calls against the commerce
//! platform's Admin API on behalf of one shop's [`Session`], spending the
//! shop's upstream rate budget before every dispatch. On top of it sit the
//! shop-metafield helpers and [`MetafieldSubscriptionStore`], the
//! production backing store for the billing projection.
//!
//! [`Session`]: crate::auth::Session

mod client;

pub use client::{
    MetafieldSubscriptionStore, SubscriptionResync, UpstreamClient, UpstreamError,
    METAFIELD_KEY_SUBSCRIPTION, METAFIELD_NAMESPACE,
};
