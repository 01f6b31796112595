//! Admin GraphQL client and metafield-backed stores.

use crate::auth::Session;
use crate::billing::{StoreError, StoreFuture, SubscriptionStatus, SubscriptionStore, SyncFuture, SyncSource};
use crate::config::{ApiVersion, ShopDomain};
use crate::rate_limit::{TieredLimiter, UpstreamTier};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Metafield namespace owned by the app.
pub const METAFIELD_NAMESPACE: &str = "urgify";

/// Metafield key holding the subscription projection JSON.
pub const METAFIELD_KEY_SUBSCRIPTION: &str = "subscription_status";

const QUERY_SHOP_ID: &str = "query { shop { id } }";

const QUERY_SHOP_METAFIELD: &str = r#"
query ShopMetafield($namespace: String!, $key: String!) {
  shop {
    metafield(namespace: $namespace, key: $key) {
      value
    }
  }
}"#;

const MUTATION_METAFIELDS_SET: &str = r#"
mutation SetMetafields($metafields: [MetafieldsSetInput!]!) {
  metafieldsSet(metafields: $metafields) {
    metafields { id }
    userErrors { field message }
  }
}"#;

const MUTATION_METAFIELDS_DELETE: &str = r#"
mutation DeleteMetafields($metafields: [MetafieldIdentifierInput!]!) {
  metafieldsDelete(metafields: $metafields) {
    deletedMetafields { key }
    userErrors { field message }
  }
}"#;

const QUERY_ACTIVE_SUBSCRIPTIONS: &str = r#"
query {
  currentAppInstallation {
    activeSubscriptions {
      name
      status
      trialDays
      createdAt
    }
  }
}"#;

/// Errors produced by the upstream client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The shop's upstream budget for this window is spent; the request
    /// was never dispatched.
    #[error("Upstream rate budget exhausted; retry after {retry_after_secs}s")]
    Throttled {
        /// Whole seconds until the budget resets.
        retry_after_secs: u64,
    },

    /// The Admin API answered with a non-success status.
    #[error("Admin API returned HTTP {status}: {message}")]
    Http {
        /// The HTTP status code.
        status: u16,
        /// The response body, truncated.
        message: String,
    },

    /// The query executed but the response carried GraphQL errors.
    #[error("GraphQL error: {message}")]
    Graphql {
        /// The first reported error message.
        message: String,
    },

    /// The request could not be sent or the response not read.
    #[error(transparent)]
    Network(#[from] reqwest::Error),
}

impl From<UpstreamError> for StoreError {
    fn from(e: UpstreamError) -> Self {
        Self::Backend {
            message: e.to_string(),
        }
    }
}

/// Admin GraphQL client bound to one shop's session.
///
/// Every call spends the shop's [`UpstreamTier::Graphql`] budget *before*
/// dispatch, so the app throttles itself ahead of the platform. A 429 that
/// slips through anyway is retried once, honoring `Retry-After`.
///
/// # Thread Safety
///
/// `UpstreamClient` is `Send + Sync`; wrap it in an [`Arc`] to share it
/// across tasks.
#[derive(Debug)]
pub struct UpstreamClient {
    client: reqwest::Client,
    session: Session,
    api_version: ApiVersion,
    limiter: TieredLimiter,
    base_url: String,
    // Shop GID, fetched once and reused by the metafield mutations
    shop_id: Mutex<Option<String>>,
}

// Verify UpstreamClient is Send + Sync at compile time
const _: fn() = || {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<UpstreamClient>();
};

impl UpstreamClient {
    /// Creates a client for the given session.
    ///
    /// Hand in the process-wide [`TieredLimiter`] so this client's calls
    /// share the shop's budget with every other caller.
    #[must_use]
    pub fn new(session: Session, api_version: ApiVersion, limiter: TieredLimiter) -> Self {
        let base_url = format!("https://{}", session.shop.as_ref());
        Self {
            client: reqwest::Client::new(),
            session,
            api_version,
            limiter,
            base_url,
            shop_id: Mutex::new(None),
        }
    }

    /// Overrides the endpoint base URL (proxies, mock servers).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The shop this client is bound to.
    #[must_use]
    pub const fn shop(&self) -> &ShopDomain {
        &self.session.shop
    }

    /// The API version this client targets.
    #[must_use]
    pub const fn api_version(&self) -> &ApiVersion {
        &self.api_version
    }

    fn graphql_url(&self) -> String {
        format!(
            "{}{}/graphql.json",
            self.base_url,
            self.api_version.admin_path()
        )
    }

    /// Executes a GraphQL query and returns the `data` object.
    ///
    /// # Errors
    ///
    /// - [`UpstreamError::Throttled`] when the shop's budget is spent; the
    ///   request is not dispatched.
    /// - [`UpstreamError::Http`] for non-success statuses, including a 429
    ///   that persists after one retry.
    /// - [`UpstreamError::Graphql`] when the response carries `errors`.
    /// - [`UpstreamError::Network`] for transport failures.
    pub async fn query(
        &self,
        query: &str,
        variables: Option<Value>,
    ) -> Result<Value, UpstreamError> {
        let decision = self
            .limiter
            .check_upstream(UpstreamTier::Graphql, &self.session.shop);
        if let Some(retry_after_secs) = decision.retry_after_secs() {
            debug!(
                shop = %self.session.shop,
                retry_after_secs,
                "upstream graphql budget exhausted; holding request"
            );
            return Err(UpstreamError::Throttled { retry_after_secs });
        }

        let body = json!({ "query": query, "variables": variables });
        let mut response = self.dispatch(&body).await?;

        if response.status().as_u16() == 429 {
            let retry_after = retry_after_header(&response).unwrap_or(1);
            warn!(
                shop = %self.session.shop,
                retry_after,
                "upstream returned 429; retrying once"
            );
            tokio::time::sleep(Duration::from_secs(retry_after)).await;
            response = self.dispatch(&body).await?;
            if response.status().as_u16() == 429 {
                let retry_after_secs = retry_after_header(&response).unwrap_or(retry_after);
                return Err(UpstreamError::Throttled { retry_after_secs });
            }
        }

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http {
                status: status.as_u16(),
                message: truncate(&message, 512),
            });
        }

        let mut payload: Value = response.json().await?;
        if let Some(errors) = payload.get("errors").filter(|e| !e.is_null()) {
            let message = errors
                .get(0)
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("unspecified GraphQL error")
                .to_string();
            return Err(UpstreamError::Graphql { message });
        }
        Ok(payload.get_mut("data").map_or(Value::Null, Value::take))
    }

    async fn dispatch(&self, body: &Value) -> Result<reqwest::Response, UpstreamError> {
        let response = self
            .client
            .post(self.graphql_url())
            .header("X-Shopify-Access-Token", &self.session.access_token)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    /// Returns the shop's GraphQL GID, cached after the first call.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamError`] from the underlying query.
    pub async fn shop_id(&self) -> Result<String, UpstreamError> {
        if let Some(id) = self.shop_id.lock().clone() {
            return Ok(id);
        }
        let data = self.query(QUERY_SHOP_ID, None).await?;
        let id = data["shop"]["id"]
            .as_str()
            .ok_or_else(|| UpstreamError::Graphql {
                message: "shop id missing from response".to_string(),
            })?
            .to_string();
        *self.shop_id.lock() = Some(id.clone());
        Ok(id)
    }

    /// Reads a shop metafield's raw value.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamError`] from the underlying query.
    pub async fn get_shop_metafield(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<String>, UpstreamError> {
        let data = self
            .query(
                QUERY_SHOP_METAFIELD,
                Some(json!({ "namespace": namespace, "key": key })),
            )
            .await?;
        Ok(data["shop"]["metafield"]["value"]
            .as_str()
            .map(str::to_string))
    }

    /// Writes a shop metafield via `metafieldsSet`.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamError`]; `userErrors` in the mutation result
    /// surface as [`UpstreamError::Graphql`].
    pub async fn set_shop_metafield(
        &self,
        namespace: &str,
        key: &str,
        value_type: &str,
        value: &str,
    ) -> Result<(), UpstreamError> {
        let owner_id = self.shop_id().await?;
        let data = self
            .query(
                MUTATION_METAFIELDS_SET,
                Some(json!({
                    "metafields": [{
                        "ownerId": owner_id,
                        "namespace": namespace,
                        "key": key,
                        "type": value_type,
                        "value": value,
                    }]
                })),
            )
            .await?;
        check_user_errors(&data["metafieldsSet"])
    }

    /// Deletes a shop metafield via `metafieldsDelete`.
    ///
    /// Deleting a metafield that does not exist is not an error.
    ///
    /// # Errors
    ///
    /// Propagates [`UpstreamError`] from the underlying mutation.
    pub async fn delete_shop_metafield(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<(), UpstreamError> {
        let owner_id = self.shop_id().await?;
        let data = self
            .query(
                MUTATION_METAFIELDS_DELETE,
                Some(json!({
                    "metafields": [{
                        "ownerId": owner_id,
                        "namespace": namespace,
                        "key": key,
                    }]
                })),
            )
            .await?;
        check_user_errors(&data["metafieldsDelete"])
    }
}

fn check_user_errors(result: &Value) -> Result<(), UpstreamError> {
    let errors = result["userErrors"].as_array();
    if let Some(errors) = errors {
        if let Some(first) = errors.first() {
            let message = first["message"]
                .as_str()
                .unwrap_or("unspecified user error")
                .to_string();
            return Err(UpstreamError::Graphql { message });
        }
    }
    Ok(())
}

fn retry_after_header(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s[..end].to_string()
    }
}

/// [`SubscriptionStore`] backed by a shop metafield.
///
/// The projection lives at `urgify.subscription_status` as a JSON blob, so
/// the storefront runtime can read the same value through the Storefront
/// API without touching app infrastructure.
pub struct MetafieldSubscriptionStore {
    client: Arc<UpstreamClient>,
}

impl MetafieldSubscriptionStore {
    /// Creates a store over the given client.
    #[must_use]
    pub fn new(client: Arc<UpstreamClient>) -> Self {
        Self { client }
    }
}

impl SubscriptionStore for MetafieldSubscriptionStore {
    fn upsert<'a>(
        &'a self,
        shop: &'a ShopDomain,
        status: SubscriptionStatus,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            debug_assert_eq!(shop, self.client.shop());
            let value = serde_json::to_string(&status).map_err(|e| StoreError::Serialization {
                message: e.to_string(),
            })?;
            self.client
                .set_shop_metafield(METAFIELD_NAMESPACE, METAFIELD_KEY_SUBSCRIPTION, "json", &value)
                .await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, Option<SubscriptionStatus>> {
        Box::pin(async move {
            debug_assert_eq!(shop, self.client.shop());
            let raw = self
                .client
                .get_shop_metafield(METAFIELD_NAMESPACE, METAFIELD_KEY_SUBSCRIPTION)
                .await?;
            match raw {
                None => Ok(None),
                Some(raw) => serde_json::from_str(&raw)
                    .map(Some)
                    .map_err(|e| StoreError::Serialization {
                        message: e.to_string(),
                    }),
            }
        })
    }

    fn remove<'a>(&'a self, shop: &'a ShopDomain) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            debug_assert_eq!(shop, self.client.shop());
            self.client
                .delete_shop_metafield(METAFIELD_NAMESPACE, METAFIELD_KEY_SUBSCRIPTION)
                .await?;
            Ok(())
        })
    }
}

/// On-demand billing resync from the platform's subscription records.
///
/// Queries `currentAppInstallation.activeSubscriptions` and rewrites the
/// stored projection, the same shape the webhook handler writes.
pub struct SubscriptionResync {
    client: Arc<UpstreamClient>,
    store: Arc<dyn SubscriptionStore>,
}

impl SubscriptionResync {
    /// Creates a resync routine writing through the given store.
    #[must_use]
    pub fn new(client: Arc<UpstreamClient>, store: Arc<dyn SubscriptionStore>) -> Self {
        Self { client, store }
    }

    fn project(subscription: Option<&Value>) -> SubscriptionStatus {
        let Some(sub) = subscription else {
            return SubscriptionStatus::none();
        };

        let status_active = sub["status"]
            .as_str()
            .is_some_and(|s| s.eq_ignore_ascii_case("active"));
        let plan_handle = sub["name"]
            .as_str()
            .and_then(|name| name.split_whitespace().next())
            .map(str::to_ascii_lowercase);

        let trial_days = sub["trialDays"].as_i64().unwrap_or(0);
        let created_at = sub["createdAt"]
            .as_str()
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.with_timezone(&Utc));
        let is_trial_active = trial_days > 0
            && created_at
                .is_some_and(|created| created + ChronoDuration::days(trial_days) > Utc::now());

        SubscriptionStatus {
            has_active_subscription: status_active,
            is_trial_active,
            plan_handle,
            updated_at: Utc::now(),
        }
    }
}

impl SyncSource for SubscriptionResync {
    fn resync<'a>(&'a self, shop: &'a ShopDomain) -> SyncFuture<'a> {
        Box::pin(async move {
            let data = self
                .client
                .query(QUERY_ACTIVE_SUBSCRIPTIONS, None)
                .await
                .map_err(StoreError::from)?;
            let subscriptions = data["currentAppInstallation"]["activeSubscriptions"]
                .as_array()
                .cloned()
                .unwrap_or_default();
            let status = Self::project(subscriptions.first());
            self.store.upsert(shop, status).await
        })
    }
}
