//! Rate limit tier presets.
//!
//! Two independent families:
//!
//! - **Client tiers** protect the app's own routes, keyed by client
//!   identity (IP + user agent).
//! - **Upstream tiers** model the commerce platform's published limits,
//!   keyed by shop domain, so the app throttles itself before the platform
//!   does.
//!
//! [`TieredLimiter`] consults the client tier first and the upstream tier
//! second, so a client-side burst never itself trips the upstream limits.

use crate::config::ShopDomain;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use std::time::Duration;

/// Points-per-window description of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitTier {
    /// Tier name, used as the key namespace.
    pub name: &'static str,
    /// Requests allowed per window.
    pub points: u32,
    /// Window length.
    pub window: Duration,
}

/// Client-facing tiers, keyed by client identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTier {
    /// Authenticated API routes used by the embedded admin.
    Api,
    /// Admin mutations (settings saves and similar).
    Admin,
    /// Unauthenticated storefront-facing endpoints.
    Public,
    /// Inbound webhook deliveries.
    Webhook,
}

impl ClientTier {
    /// Returns the preset for this tier.
    #[must_use]
    pub const fn tier(self) -> RateLimitTier {
        match self {
            Self::Api => RateLimitTier {
                name: "api",
                points: 60,
                window: Duration::from_secs(60),
            },
            Self::Admin => RateLimitTier {
                name: "admin",
                points: 120,
                window: Duration::from_secs(60),
            },
            Self::Public => RateLimitTier {
                name: "public",
                points: 30,
                window: Duration::from_secs(60),
            },
            Self::Webhook => RateLimitTier {
                name: "webhook",
                points: 300,
                window: Duration::from_secs(60),
            },
        }
    }
}

/// Upstream-facing tiers, keyed by shop domain.
///
/// Numbers mirror the platform's published per-shop limits for a standard
/// plan, so staying under these keeps the app clear of upstream 429s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamTier {
    /// Admin GraphQL cost points.
    Graphql,
    /// Admin REST requests.
    Rest,
    /// Webhook subscription mutations.
    Webhook,
}

impl UpstreamTier {
    /// Returns the preset for this tier.
    #[must_use]
    pub const fn tier(self) -> RateLimitTier {
        match self {
            Self::Graphql => RateLimitTier {
                name: "graphql",
                points: 50,
                window: Duration::from_secs(1),
            },
            Self::Rest => RateLimitTier {
                name: "rest",
                points: 2,
                window: Duration::from_secs(1),
            },
            Self::Webhook => RateLimitTier {
                name: "webhook",
                points: 4,
                window: Duration::from_secs(1),
            },
        }
    }
}

/// Builds the client identity key from IP and user agent.
#[must_use]
pub fn client_key(ip: &str, user_agent: &str) -> String {
    format!("{ip}|{user_agent}")
}

/// The two limiter families behind one facade.
///
/// Hand one instance to every request handler at startup; clones share
/// counters.
#[derive(Clone, Debug, Default)]
pub struct TieredLimiter {
    client: RateLimiter,
    upstream: RateLimiter,
}

impl TieredLimiter {
    /// Creates a limiter with empty counters for both families.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes from a client tier.
    pub fn check_client(&self, tier: ClientTier, identity: &str) -> RateLimitDecision {
        let preset = tier.tier();
        let key = format!("{}:{identity}", preset.name);
        self.client.consume(&key, preset.points, preset.window)
    }

    /// Consumes from an upstream tier.
    pub fn check_upstream(&self, tier: UpstreamTier, shop: &ShopDomain) -> RateLimitDecision {
        let preset = tier.tier();
        let key = format!("{}:{}", preset.name, shop.as_ref());
        self.upstream.consume(&key, preset.points, preset.window)
    }

    /// Consults the client tier, then the upstream tier, short-circuiting
    /// on the first limited decision.
    ///
    /// This is the gate in front of every outbound privileged call: the
    /// client's own budget is spent before any upstream budget is touched.
    pub fn check_client_then_upstream(
        &self,
        client_tier: ClientTier,
        identity: &str,
        upstream_tier: UpstreamTier,
        shop: &ShopDomain,
    ) -> RateLimitDecision {
        let client_decision = self.check_client(client_tier, identity);
        if !client_decision.is_allowed() {
            return client_decision;
        }
        self.check_upstream(upstream_tier, shop)
    }

    /// Sweeps expired entries from both families.
    pub fn sweep(&self) -> usize {
        self.client.sweep() + self.upstream.sweep()
    }

    /// Spawns sweepers for both families.
    #[must_use]
    pub fn spawn_sweepers(&self, every: Duration) -> Vec<tokio::task::JoinHandle<()>> {
        vec![
            self.client.spawn_sweeper(every),
            self.upstream.spawn_sweeper(every),
        ]
    }
}
