//! Webhook topics.

use std::fmt;

/// The set of webhook topics this app subscribes to.
///
/// Topics arrive as strings in the `X-Shopify-Topic` header. Parsing never
/// fails: a topic we do not know folds into [`WebhookTopic::Unknown`] and
/// is acknowledged as a no-op, which keeps the router forward-compatible
/// with topics added after this build shipped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum WebhookTopic {
    /// `app/uninstalled`
    AppUninstalled,
    /// `app_subscriptions/update`
    AppSubscriptionsUpdate,
    /// `app/scopes_update`
    AppScopesUpdate,
    /// `customers/data_request` (GDPR)
    CustomersDataRequest,
    /// `customers/redact` (GDPR)
    CustomersRedact,
    /// `shop/redact` (GDPR)
    ShopRedact,
    /// `products/create`
    ProductsCreate,
    /// `products/update`
    ProductsUpdate,
    /// `products/delete`
    ProductsDelete,
    /// `inventory_levels/update`
    InventoryLevelsUpdate,
    /// `orders/create`
    OrdersCreate,
    /// `orders/updated`
    OrdersUpdated,
    /// `orders/paid`
    OrdersPaid,
    /// `orders/cancelled`
    OrdersCancelled,
    /// `themes/publish`
    ThemesPublish,
    /// `themes/delete`
    ThemesDelete,
    /// Any topic not in the fixed set above.
    Unknown(String),
}

impl WebhookTopic {
    /// Parses the `X-Shopify-Topic` header value. Never fails.
    #[must_use]
    pub fn from_header(value: &str) -> Self {
        match value {
            "app/uninstalled" => Self::AppUninstalled,
            "app_subscriptions/update" => Self::AppSubscriptionsUpdate,
            "app/scopes_update" => Self::AppScopesUpdate,
            "customers/data_request" => Self::CustomersDataRequest,
            "customers/redact" => Self::CustomersRedact,
            "shop/redact" => Self::ShopRedact,
            "products/create" => Self::ProductsCreate,
            "products/update" => Self::ProductsUpdate,
            "products/delete" => Self::ProductsDelete,
            "inventory_levels/update" => Self::InventoryLevelsUpdate,
            "orders/create" => Self::OrdersCreate,
            "orders/updated" => Self::OrdersUpdated,
            "orders/paid" => Self::OrdersPaid,
            "orders/cancelled" => Self::OrdersCancelled,
            "themes/publish" => Self::ThemesPublish,
            "themes/delete" => Self::ThemesDelete,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// Returns the topic string as it appears on the wire.
    #[must_use]
    pub fn as_topic_str(&self) -> &str {
        match self {
            Self::AppUninstalled => "app/uninstalled",
            Self::AppSubscriptionsUpdate => "app_subscriptions/update",
            Self::AppScopesUpdate => "app/scopes_update",
            Self::CustomersDataRequest => "customers/data_request",
            Self::CustomersRedact => "customers/redact",
            Self::ShopRedact => "shop/redact",
            Self::ProductsCreate => "products/create",
            Self::ProductsUpdate => "products/update",
            Self::ProductsDelete => "products/delete",
            Self::InventoryLevelsUpdate => "inventory_levels/update",
            Self::OrdersCreate => "orders/create",
            Self::OrdersUpdated => "orders/updated",
            Self::OrdersPaid => "orders/paid",
            Self::OrdersCancelled => "orders/cancelled",
            Self::ThemesPublish => "themes/publish",
            Self::ThemesDelete => "themes/delete",
            Self::Unknown(other) => other,
        }
    }

    /// Returns `true` for topics outside the fixed set.
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown(_))
    }
}

impl fmt::Display for WebhookTopic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_topic_str())
    }
}
