//! Shopify Admin REST client with OAuth support.

use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use shopgate_core::{AccessToken, ShopDomain};

use super::ShopifyError;
use crate::config::ShopifyAppConfig;
use crate::retry::RetryPolicy;

/// Request timeout for Admin API calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of a successful code exchange.
///
/// The granted scope may differ from the requested scope; callers must
/// persist what was actually granted.
pub struct TokenGrant {
    pub access_token: AccessToken,
    pub scope: String,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

/// A recurring application charge as reported by the platform.
#[derive(Debug, Clone, Deserialize)]
pub struct RecurringCharge {
    pub id: i64,
    pub name: String,
    pub price: String,
    /// Platform-side status: `pending`, `active`, `declined`, `cancelled`,
    /// `expired`, or `frozen`.
    pub status: String,
    /// Approval page URL, present while the charge is pending.
    #[serde(default)]
    pub confirmation_url: Option<String>,
}

/// Parameters for creating a recurring charge.
#[derive(Debug, Clone, Serialize)]
pub struct RecurringChargePlan {
    pub name: String,
    pub price: String,
    pub return_url: String,
    pub trial_days: i32,
    pub test: Option<bool>,
}

#[derive(Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    scope: String,
}

#[derive(Deserialize)]
struct RecurringChargeEnvelope {
    recurring_application_charge: RecurringCharge,
}

/// Shopify Admin REST API client.
///
/// Holds app credentials only; per-shop access tokens are passed into
/// each call by the owner of the connection.
#[derive(Clone)]
pub struct ShopifyClient {
    inner: Arc<ShopifyClientInner>,
}

struct ShopifyClientInner {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    scopes: Vec<String>,
    api_version: String,
}

impl ShopifyClient {
    /// Create a new client from app configuration.
    #[must_use]
    pub fn new(config: &ShopifyAppConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            inner: Arc::new(ShopifyClientInner {
                client,
                client_id: config.client_id.clone(),
                client_secret: config.client_secret.expose_secret().to_string(),
                scopes: config.scopes.clone(),
                api_version: config.api_version.clone(),
            }),
        }
    }

    /// Get the client secret (for HMAC verification).
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.inner.client_secret
    }

    // =========================================================================
    // OAuth Flow
    // =========================================================================

    /// Generate the OAuth authorization URL for a shop.
    ///
    /// Redirect the merchant to this URL to begin the install.
    #[must_use]
    pub fn authorization_url(&self, shop: &ShopDomain, redirect_uri: &str, state: &str) -> String {
        let scope = self.inner.scopes.join(",");
        format!(
            "https://{}/admin/oauth/authorize?client_id={}&scope={}&redirect_uri={}&state={}",
            shop,
            urlencoding::encode(&self.inner.client_id),
            urlencoding::encode(&scope),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(state)
        )
    }

    /// Exchange an authorization code for an access token.
    ///
    /// Never retried: the code is single-use, so a failed exchange means
    /// restarting the install from the top.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::OAuth` if the exchange is rejected, or if
    /// the returned token fails the shape check.
    /// Returns `ShopifyError::Http` if the HTTP request fails.
    #[instrument(skip(self, code), fields(shop = %shop))]
    pub async fn exchange_code(
        &self,
        shop: &ShopDomain,
        code: &str,
    ) -> Result<TokenGrant, ShopifyError> {
        let url = format!("https://{shop}/admin/oauth/access_token");

        let params = [
            ("client_id", self.inner.client_id.as_str()),
            ("client_secret", self.inner.client_secret.as_str()),
            ("code", code),
        ];

        let response = self.inner.client.post(&url).form(&params).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(ShopifyError::OAuth(format!(
                "token exchange failed with status {status}"
            )));
        }

        let token_response: OAuthTokenResponse = response.json().await?;

        // A well-formed exchange that returns a malformed token is an
        // upstream contract violation, not an auth failure.
        let access_token = AccessToken::parse(&token_response.access_token)
            .map_err(|e| ShopifyError::OAuth(format!("exchange returned malformed token: {e}")))?;

        Ok(TokenGrant {
            access_token,
            scope: token_response.scope,
        })
    }

    // =========================================================================
    // Recurring Billing
    // =========================================================================

    /// Create a recurring application charge for a shop.
    ///
    /// The charge starts `pending`; the merchant must approve it on the
    /// returned `confirmation_url`.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError` if the request fails or the platform
    /// rejects the charge.
    #[instrument(skip(self, token, plan), fields(shop = %shop, plan = %plan.name))]
    pub async fn create_recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &AccessToken,
        plan: &RecurringChargePlan,
    ) -> Result<RecurringCharge, ShopifyError> {
        let url = format!(
            "https://{}/admin/api/{}/recurring_application_charges.json",
            shop, self.inner.api_version
        );

        let body = json!({ "recurring_application_charge": plan });

        let response = self
            .inner
            .client
            .post(&url)
            .header("X-Shopify-Access-Token", token.expose())
            .json(&body)
            .send()
            .await?;

        let envelope: RecurringChargeEnvelope = Self::check(response).await?.json().await?;
        Ok(envelope.recurring_application_charge)
    }

    /// Fetch a recurring charge by id.
    ///
    /// Used to reconcile the billing state on the confirm redirect and
    /// on billing webhooks; safe to retry.
    ///
    /// # Errors
    ///
    /// Returns `ShopifyError::NotFound` if the charge does not exist.
    #[instrument(skip(self, token), fields(shop = %shop, charge_id))]
    pub async fn get_recurring_charge(
        &self,
        shop: &ShopDomain,
        token: &AccessToken,
        charge_id: i64,
    ) -> Result<RecurringCharge, ShopifyError> {
        let url = format!(
            "https://{}/admin/api/{}/recurring_application_charges/{}.json",
            shop, self.inner.api_version, charge_id
        );

        RetryPolicy::UPSTREAM
            .run(
                || async {
                    let response = self
                        .inner
                        .client
                        .get(&url)
                        .header("X-Shopify-Access-Token", token.expose())
                        .send()
                        .await?;

                    let envelope: RecurringChargeEnvelope =
                        Self::check(response).await?.json().await?;
                    Ok(envelope.recurring_application_charge)
                },
                ShopifyError::is_retryable,
            )
            .await
    }

    // =========================================================================
    // Webhooks
    // =========================================================================

    /// Register the given webhook topics for a shop, pointing at
    /// `{base_url}/webhooks/{topic}`.
    ///
    /// Registration is idempotent on the platform side (a duplicate
    /// topic+address returns 422), so redelivery-safe; each topic is
    /// retried independently on transient failure.
    ///
    /// # Errors
    ///
    /// Returns the first non-recoverable `ShopifyError`.
    #[instrument(skip(self, token), fields(shop = %shop))]
    pub async fn register_webhooks(
        &self,
        shop: &ShopDomain,
        token: &AccessToken,
        base_url: &str,
        topics: &[&str],
    ) -> Result<(), ShopifyError> {
        let url = format!(
            "https://{}/admin/api/{}/webhooks.json",
            shop, self.inner.api_version
        );

        for topic in topics {
            let address = format!("{base_url}/webhooks/{topic}");
            let body = json!({
                "webhook": {
                    "topic": topic,
                    "address": address,
                    "format": "json",
                }
            });

            let result = RetryPolicy::UPSTREAM
                .run(
                    || async {
                        let response = self
                            .inner
                            .client
                            .post(&url)
                            .header("X-Shopify-Access-Token", token.expose())
                            .json(&body)
                            .send()
                            .await?;

                        Self::check(response).await?;
                        Ok(())
                    },
                    ShopifyError::is_retryable,
                )
                .await;

            match result {
                Ok(()) => {}
                // Already registered from a previous install.
                Err(ShopifyError::Api { status: 422, .. }) => {
                    tracing::debug!(topic, "webhook already registered");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }

    /// Map a non-success response to a `ShopifyError`.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, ShopifyError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse().ok())
                .unwrap_or(2);
            return Err(ShopifyError::RateLimited(retry_after));
        }

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ShopifyError::Unauthorized(
                "access token rejected".to_owned(),
            ));
        }

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ShopifyError::NotFound(format!(
                "resource missing: {}",
                response.url().path()
            )));
        }

        let message = response.text().await.unwrap_or_default();
        Err(ShopifyError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

impl std::fmt::Debug for ShopifyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyClient")
            .field("client_id", &self.inner.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("api_version", &self.inner.api_version)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn test_client() -> ShopifyClient {
        ShopifyClient::new(&ShopifyAppConfig {
            client_id: "test_client_id".to_owned(),
            client_secret: SecretString::from("test_client_secret"),
            scopes: vec!["read_products".to_owned(), "read_orders".to_owned()],
            api_version: "2026-01".to_owned(),
        })
    }

    #[test]
    fn test_authorization_url() {
        let client = test_client();
        let shop = ShopDomain::parse("acme.myshopify.com").unwrap();

        let url = client.authorization_url(&shop, "https://gateway.test/auth/callback", "nonce-1");

        assert!(url.starts_with("https://acme.myshopify.com/admin/oauth/authorize?"));
        assert!(url.contains("client_id=test_client_id"));
        assert!(url.contains("scope=read_products%2Cread_orders"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fgateway.test%2Fauth%2Fcallback"));
        assert!(url.contains("state=nonce-1"));
    }

    #[test]
    fn test_client_debug_redacts_secret() {
        let client = test_client();
        let debug = format!("{client:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("test_client_secret"));
    }

    #[test]
    fn test_token_grant_debug_redacts_token() {
        let grant = TokenGrant {
            access_token: AccessToken::parse(&format!("shpat_{}", "ab12".repeat(8))).unwrap(),
            scope: "read_products".to_owned(),
        };
        let debug = format!("{grant:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("shpat_"));
    }

    #[test]
    fn test_recurring_charge_deserializes() {
        let json = r#"{
            "recurring_application_charge": {
                "id": 1029266948,
                "name": "Pro",
                "price": "29.00",
                "status": "pending",
                "confirmation_url": "https://acme.myshopify.com/admin/charges/1029266948/confirm"
            }
        }"#;

        let envelope: RecurringChargeEnvelope = serde_json::from_str(json).unwrap();
        let charge = envelope.recurring_application_charge;
        assert_eq!(charge.id, 1_029_266_948);
        assert_eq!(charge.status, "pending");
        assert!(charge.confirmation_url.is_some());
    }
}
