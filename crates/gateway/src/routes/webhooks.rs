//! Inbound webhook handlers.
//!
//! Delivery contract with the platform:
//!
//! - the signature covers the *raw body bytes*, so handlers take `Bytes`
//!   and verification runs before any parsing
//! - a bad signature is the only 401; once a delivery is verified the
//!   gateway answers 200 even when processing fails, because a non-2xx
//!   only triggers a redelivery of a payload that will fail the same way
//! - deliveries are at-least-once; the receipt ledger drops duplicates
//!   before any side effect runs

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Deserialize;
use tracing::instrument;

use shopgate_core::{ShopDomain, SubscriptionStatus};

use crate::db::{ConnectionRepository, SubscriptionRepository, WebhookReceiptRepository};
use crate::shopify::verify::verify_webhook_hmac;
use crate::state::AppState;

/// Signature header set by the platform.
const HMAC_HEADER: &str = "x-shopify-hmac-sha256";
/// Shop the delivery belongs to.
const SHOP_HEADER: &str = "x-shopify-shop-domain";
/// Unique delivery id, stable across redeliveries.
const WEBHOOK_ID_HEADER: &str = "x-shopify-webhook-id";

/// Build the webhook router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/webhooks/app/uninstalled", post(app_uninstalled))
        .route(
            "/webhooks/app_subscriptions/update",
            post(app_subscriptions_update),
        )
        .route(
            "/webhooks/customers/data_request",
            post(customers_data_request),
        )
        .route("/webhooks/customers/redact", post(customers_redact))
        .route("/webhooks/shop/redact", post(shop_redact))
}

/// A verified, deduplicated delivery ready for processing.
struct Delivery {
    shop: ShopDomain,
    body: Bytes,
}

/// Run the shared admission checks for a delivery.
///
/// `Err(response)` short-circuits the handler; it is a 400/401 before
/// verification, or an early 200 for duplicates and unusable-but-signed
/// payloads.
async fn admit(
    state: &AppState,
    topic: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Delivery, Response> {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if !is_json {
        return Err((StatusCode::BAD_REQUEST, "expected application/json").into_response());
    }

    let signature = headers
        .get(HMAC_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !verify_webhook_hmac(&body, signature, state.shopify().client_secret()) {
        tracing::warn!(topic, "rejected webhook with invalid signature");
        return Err(StatusCode::UNAUTHORIZED.into_response());
    }

    // Past this point the delivery is authentic: every outcome is a 200.

    let shop = headers
        .get(SHOP_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| ShopDomain::parse(v).ok());
    let Some(shop) = shop else {
        tracing::warn!(topic, "verified webhook with missing or invalid shop header");
        return Err(StatusCode::OK.into_response());
    };

    if let Some(delivery_id) = headers.get(WEBHOOK_ID_HEADER).and_then(|v| v.to_str().ok()) {
        match WebhookReceiptRepository::new(state.pool())
            .record(delivery_id, topic, &shop)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!(topic, shop = %shop, delivery_id, "duplicate webhook delivery");
                return Err(StatusCode::OK.into_response());
            }
            Err(e) => {
                // Ledger unavailable: favor processing over dropping, the
                // handlers themselves are idempotent.
                tracing::error!(error = %e, "webhook receipt ledger unavailable");
            }
        }
    } else {
        tracing::warn!(topic, shop = %shop, "webhook delivery without id header");
    }

    Ok(Delivery { shop, body })
}

// =============================================================================
// Route Handlers
// =============================================================================

/// POST /webhooks/app/uninstalled
#[instrument(skip(state, headers, body))]
async fn app_uninstalled(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = match admit(&state, "app/uninstalled", &headers, body).await {
        Ok(delivery) => delivery,
        Err(response) => return response,
    };

    match ConnectionRepository::new(state.pool())
        .mark_uninstalled(&delivery.shop)
        .await
    {
        Ok(true) => tracing::info!(shop = %delivery.shop, "marked shop uninstalled"),
        Ok(false) => tracing::debug!(shop = %delivery.shop, "uninstall for already-uninstalled shop"),
        Err(e) => {
            sentry::capture_error(&e);
            tracing::error!(shop = %delivery.shop, error = %e, "failed to mark shop uninstalled");
        }
    }

    StatusCode::OK.into_response()
}

#[derive(Debug, Deserialize)]
struct AppSubscriptionPayload {
    app_subscription: AppSubscriptionBody,
}

#[derive(Debug, Deserialize)]
struct AppSubscriptionBody {
    admin_graphql_api_id: String,
    status: String,
}

/// POST /webhooks/app_subscriptions/update
#[instrument(skip(state, headers, body))]
async fn app_subscriptions_update(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = match admit(&state, "app_subscriptions/update", &headers, body).await {
        Ok(delivery) => delivery,
        Err(response) => return response,
    };

    let payload: AppSubscriptionPayload = match serde_json::from_slice(&delivery.body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(shop = %delivery.shop, error = %e, "unparseable subscription payload");
            return StatusCode::OK.into_response();
        }
    };

    let Some(charge_id) = charge_id_from_gid(&payload.app_subscription.admin_graphql_api_id)
    else {
        tracing::error!(
            shop = %delivery.shop,
            gid = %payload.app_subscription.admin_graphql_api_id,
            "subscription payload with unparseable charge id"
        );
        return StatusCode::OK.into_response();
    };

    let Some(status) = map_platform_status(&payload.app_subscription.status) else {
        tracing::warn!(
            shop = %delivery.shop,
            status = %payload.app_subscription.status,
            "subscription payload with unknown status"
        );
        return StatusCode::OK.into_response();
    };

    match SubscriptionRepository::new(state.pool())
        .transition_by_charge_id(charge_id, status)
        .await
    {
        Ok(Some(sub)) if sub.status == status => {
            tracing::info!(shop = %delivery.shop, charge_id, status = %sub.status, "subscription updated");
        }
        Ok(Some(sub)) => {
            // The SQL guard refused the move (stale or out-of-order
            // delivery); the row keeps its current status.
            tracing::warn!(
                shop = %delivery.shop,
                charge_id,
                current_status = %sub.status,
                requested_status = %status,
                "subscription transition blocked"
            );
        }
        Ok(None) => {
            tracing::warn!(shop = %delivery.shop, charge_id, "subscription update for unknown charge");
        }
        Err(e) => {
            sentry::capture_error(&e);
            tracing::error!(shop = %delivery.shop, charge_id, error = %e, "failed to update subscription");
        }
    }

    StatusCode::OK.into_response()
}

/// POST /webhooks/customers/data_request
///
/// The gateway stores no customer records, so the data request is
/// answered by logging the audit trail entry; there is nothing to export.
#[instrument(skip(state, headers, body))]
async fn customers_data_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = match admit(&state, "customers/data_request", &headers, body).await {
        Ok(delivery) => delivery,
        Err(response) => return response,
    };

    tracing::info!(shop = %delivery.shop, "customer data request received; no customer data stored");
    StatusCode::OK.into_response()
}

/// POST /webhooks/customers/redact
#[instrument(skip(state, headers, body))]
async fn customers_redact(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let delivery = match admit(&state, "customers/redact", &headers, body).await {
        Ok(delivery) => delivery,
        Err(response) => return response,
    };

    tracing::info!(shop = %delivery.shop, "customer redaction received; no customer data stored");
    StatusCode::OK.into_response()
}

/// POST /webhooks/shop/redact
///
/// Arrives 48 hours after uninstall. The actual erasure runs off the
/// request path so a slow transaction cannot push the response past the
/// delivery timeout and trigger a pointless redelivery.
#[instrument(skip(state, headers, body))]
async fn shop_redact(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let delivery = match admit(&state, "shop/redact", &headers, body).await {
        Ok(delivery) => delivery,
        Err(response) => return response,
    };

    let shop = delivery.shop;
    tokio::spawn(async move {
        match ConnectionRepository::new(state.pool()).redact_shop(&shop).await {
            Ok(()) => tracing::info!(shop = %shop, "shop data redacted"),
            Err(e) => {
                sentry::capture_error(&e);
                tracing::error!(shop = %shop, error = %e, "shop redaction failed");
            }
        }
    });

    StatusCode::OK.into_response()
}

// =============================================================================
// Payload Helpers
// =============================================================================

/// Extract the numeric charge id from a `gid://shopify/AppSubscription/N` id.
fn charge_id_from_gid(gid: &str) -> Option<i64> {
    gid.rsplit('/').next()?.parse().ok()
}

/// Map a platform subscription status onto the local state machine.
///
/// `expired` and `frozen` have no local representation; both end the
/// subscription, so they land on `Cancelled`.
fn map_platform_status(status: &str) -> Option<SubscriptionStatus> {
    match status.to_ascii_lowercase().as_str() {
        "pending" => Some(SubscriptionStatus::Pending),
        "active" => Some(SubscriptionStatus::Active),
        "declined" => Some(SubscriptionStatus::Declined),
        "cancelled" | "expired" | "frozen" => Some(SubscriptionStatus::Cancelled),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charge_id_from_gid() {
        assert_eq!(
            charge_id_from_gid("gid://shopify/AppSubscription/1029266948"),
            Some(1_029_266_948)
        );
        assert_eq!(charge_id_from_gid("1029266948"), Some(1_029_266_948));
        assert_eq!(charge_id_from_gid("gid://shopify/AppSubscription/abc"), None);
        assert_eq!(charge_id_from_gid(""), None);
    }

    #[test]
    fn test_map_platform_status() {
        assert_eq!(map_platform_status("ACTIVE"), Some(SubscriptionStatus::Active));
        assert_eq!(
            map_platform_status("declined"),
            Some(SubscriptionStatus::Declined)
        );
        assert_eq!(
            map_platform_status("EXPIRED"),
            Some(SubscriptionStatus::Cancelled)
        );
        assert_eq!(
            map_platform_status("FROZEN"),
            Some(SubscriptionStatus::Cancelled)
        );
        assert_eq!(map_platform_status("paused"), None);
    }

    #[test]
    fn test_subscription_payload_parses() {
        let json = r#"{
            "app_subscription": {
                "admin_graphql_api_id": "gid://shopify/AppSubscription/9876543210",
                "name": "Pro",
                "status": "ACTIVE",
                "admin_graphql_api_shop_id": "gid://shopify/Shop/1"
            }
        }"#;

        let payload: AppSubscriptionPayload =
            serde_json::from_slice(json.as_bytes()).expect("payload should parse");
        assert_eq!(
            payload.app_subscription.admin_graphql_api_id,
            "gid://shopify/AppSubscription/9876543210"
        );
        assert_eq!(payload.app_subscription.status, "ACTIVE");
    }
}
