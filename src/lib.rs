//! # Urgify Core
//!
//! The authentication and reconciliation core for the Urgify embedded
//! commerce app: session-token acquisition and refresh, authenticated
//! request plumbing, tiered rate limiting, webhook verification and
//! replay-safe reconciliation, and plan-based feature gating.
//!
//! ## Overview
//!
//! This crate provides:
//! - Type-safe configuration via [`UrgifyConfig`] and [`UrgifyConfigBuilder`]
//! - Validated newtypes for API credentials and domain values
//! - Session-token acquisition with a fallback chain, shared cache, and
//!   background refresh via [`auth::token`]
//! - An authenticated fetch wrapper via [`auth::fetch`]
//! - Server-side bearer validation via [`auth::validator`] and session-token
//!   claims via [`auth::jwt`]
//! - RFC 8693 token exchange for Admin access tokens via [`auth::exchange`]
//! - Client and upstream rate limit tiers via [`rate_limit`]
//! - Webhook HMAC verification and retrying reconciliation via [`webhooks`]
//! - Subscription projection and feature gating via [`billing`]
//! - An Admin GraphQL client with self-throttling via [`upstream`]
//!
//! ## Quick Start
//!
//! ```rust
//! use urgify_core::{UrgifyConfig, ApiKey, ApiSecretKey, ApiVersion};
//!
//! let config = UrgifyConfig::builder()
//!     .api_key(ApiKey::new("your-api-key").unwrap())
//!     .api_secret_key(ApiSecretKey::new("your-api-secret").unwrap())
//!     .api_version(ApiVersion::latest())
//!     .build()
//!     .unwrap();
//!
//! assert!(config.is_embedded());
//! ```
//!
//! ## Token Acquisition and Fetch
//!
//! The client-side pipeline resolves a session token through a fixed
//! fallback chain (host bridge, legacy global, cache, initial token) and
//! attaches it as a bearer to every request:
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use urgify_core::auth::fetch::{AuthenticatedClient, FetchOptions};
//! use urgify_core::auth::token::{RefreshScheduler, TokenAcquirer};
//!
//! let acquirer = Arc::new(
//!     TokenAcquirer::builder()
//!         .host_bridge(bridge)
//!         .build(),
//! );
//!
//! // Refresh every 45s and on focus/visibility triggers
//! let refresh = RefreshScheduler::spawn(acquirer.clone());
//!
//! let client = AuthenticatedClient::new(acquirer);
//! let response = client
//!     .fetch("https://app.example.com/api/settings", FetchOptions::get())
//!     .await?;
//! ```
//!
//! ## Webhook Reconciliation
//!
//! ```rust,ignore
//! use urgify_core::webhooks::{classify_delivery, Delivery, WebhookProcessor};
//!
//! match classify_delivery(&config, &request)? {
//!     // No signature header: a test ping, acknowledge and stop
//!     Delivery::TestPing => return Ok(ok_response()),
//!     Delivery::Verified(context) => {
//!         let delivery = WebhookDelivery::from_context(&context)?;
//!         // Respond 200 first; reconciliation runs detached
//!         tokio::spawn(async move { processor.process(delivery).await });
//!     }
//! }
//! ```
//!
//! ## Design Principles
//!
//! - **No global state**: Configuration is instance-based and passed explicitly
//! - **Fail-fast validation**: All newtypes validate on construction
//! - **Thread-safe**: All shared types are `Send + Sync`
//! - **Async-first**: Designed for use with Tokio async runtime
//! - **Reconcile, don't coordinate**: Webhook handlers project state with
//!   upsert semantics and event-time ordering instead of distributed locks

pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod rate_limit;
pub mod upstream;
pub mod webhooks;

// Re-export public types at crate root for convenience
pub use auth::Session;
pub use config::{
    ApiKey, ApiSecretKey, ApiVersion, HostUrl, ShopDomain, UrgifyConfig, UrgifyConfigBuilder,
};
pub use error::ConfigError;

// Re-export the token pipeline types
pub use auth::token::{
    AcquireError, HostBridge, RefreshHandle, RefreshScheduler, SessionToken, TokenAcquirer,
    TokenCache,
};

// Re-export the exchange entry points
pub use auth::exchange::{exchange_offline_token, exchange_online_token, ExchangeError};

// Re-export the webhook surface
pub use webhooks::{
    classify_delivery, verify_webhook, Delivery, WebhookProcessor, WebhookRequest, WebhookTopic,
};

// Re-export rate limiting and billing
pub use billing::{BillingGate, Plan, SubscriptionStatus};
pub use rate_limit::{ClientTier, RateLimitDecision, TieredLimiter, UpstreamTier};
pub use upstream::{UpstreamClient, UpstreamError};
