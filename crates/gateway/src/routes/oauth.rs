//! OAuth install flow.
//!
//! `GET /install?shop=` starts the flow: the shop domain is validated,
//! a single-use state nonce is issued, and the merchant is bounced to
//! the platform's authorization page. `GET /auth/callback` finishes it:
//! signature, nonce, and shop all have to line up before the code is
//! exchanged, and the token row is the very last thing written so a
//! half-failed install never leaves a usable credential behind.
//!
//! Callback failures redirect to `/auth/error?error=<code>` rather than
//! rendering errors inline; codes are mapped to copy in one place.

use axum::{
    Router,
    extract::{Query, RawQuery, State},
    response::{Html, IntoResponse, Redirect, Response},
    routing::get,
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use shopgate_core::{Email, ShopDomain};

use crate::db::{ConnectionRepository, MerchantRepository, OAuthNonceRepository};
use crate::middleware::{clear_current_merchant, set_current_merchant};
use crate::models::CurrentMerchant;
use crate::shopify::verify::verify_callback_hmac;
use crate::state::AppState;

/// Webhook topics registered after every successful install.
const WEBHOOK_TOPICS: &[&str] = &[
    "app/uninstalled",
    "app_subscriptions/update",
    "customers/data_request",
    "customers/redact",
    "shop/redact",
];

/// Build the OAuth router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/install", get(install))
        .route("/auth/callback", get(callback))
        .route("/auth/error", get(auth_error))
        .route("/logout", get(logout))
}

// =============================================================================
// Query Parameters
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct InstallParams {
    pub shop: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub shop: Option<String>,
    pub hmac: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthErrorParams {
    pub error: Option<String>,
}

// =============================================================================
// Route Handlers
// =============================================================================

/// GET /install - Start the OAuth install flow for a shop.
#[instrument(skip(state))]
async fn install(State(state): State<AppState>, Query(params): Query<InstallParams>) -> Response {
    let Some(shop_param) = &params.shop else {
        return Redirect::to("/auth/error?error=missing_shop").into_response();
    };

    let shop = match ShopDomain::parse(shop_param) {
        Ok(shop) => shop,
        Err(e) => {
            tracing::warn!(shop = %shop_param, error = %e, "rejected install for invalid shop");
            return Redirect::to("/auth/error?error=invalid_shop").into_response();
        }
    };

    // Server-side nonce: any instance can later consume it on the callback.
    let nonce = uuid::Uuid::new_v4().to_string();
    if let Err(e) = OAuthNonceRepository::new(state.pool())
        .issue(&nonce, &shop)
        .await
    {
        tracing::error!(error = %e, "failed to issue OAuth nonce");
        return Redirect::to("/auth/error?error=install_failed").into_response();
    }

    let auth_url = state
        .shopify()
        .authorization_url(&shop, &state.config().redirect_uri(), &nonce);

    tracing::info!(shop = %shop, "starting OAuth install");
    Redirect::to(&auth_url).into_response()
}

/// GET /auth/callback - Handle the OAuth callback.
#[instrument(skip(state, session, raw_query))]
async fn callback(
    State(state): State<AppState>,
    session: Session,
    RawQuery(raw_query): RawQuery,
    Query(params): Query<OAuthCallbackParams>,
) -> Response {
    // Merchant declined on the authorization page.
    if let Some(error) = &params.error {
        let description = params.error_description.as_deref().unwrap_or_default();
        tracing::warn!(error, description, "OAuth authorization denied");
        return Redirect::to("/auth/error?error=oauth_denied").into_response();
    }

    let Some(shop_param) = &params.shop else {
        return Redirect::to("/auth/error?error=missing_shop").into_response();
    };
    let shop = match ShopDomain::parse(shop_param) {
        Ok(shop) => shop,
        Err(e) => {
            tracing::warn!(shop = %shop_param, error = %e, "rejected callback for invalid shop");
            return Redirect::to("/auth/error?error=invalid_shop").into_response();
        }
    };

    // Signature first: everything after this trusts the query contents.
    // The signed message covers every parameter the platform sent, not
    // just the ones this handler understands.
    let Some(provided_hmac) = &params.hmac else {
        return Redirect::to("/auth/error?error=invalid_hmac").into_response();
    };
    let signed_pairs = signed_query_pairs(raw_query.as_deref().unwrap_or_default());
    if !verify_callback_hmac(&signed_pairs, provided_hmac, state.shopify().client_secret()) {
        tracing::error!(shop = %shop, "invalid HMAC signature in OAuth callback");
        return Redirect::to("/auth/error?error=invalid_hmac").into_response();
    }

    // State nonce: single-use, shop-bound, TTL-bound.
    let Some(callback_state) = &params.state else {
        return Redirect::to("/auth/error?error=invalid_state").into_response();
    };
    match OAuthNonceRepository::new(state.pool())
        .consume(callback_state, &shop)
        .await
    {
        Ok(true) => {}
        Ok(false) => {
            tracing::error!(shop = %shop, "unknown or reused OAuth state - possible replay");
            return Redirect::to("/auth/error?error=invalid_state").into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to consume OAuth nonce");
            return Redirect::to("/auth/error?error=install_failed").into_response();
        }
    }

    // Exchange the single-use code. Never retried.
    let Some(code) = &params.code else {
        return Redirect::to("/auth/error?error=install_failed").into_response();
    };
    let grant = match state.shopify().exchange_code(&shop, code).await {
        Ok(grant) => grant,
        Err(e) => {
            tracing::error!(shop = %shop, error = %e, "failed to exchange OAuth code");
            return Redirect::to("/auth/error?error=exchange_failed").into_response();
        }
    };

    let merchant = match MerchantRepository::new(state.pool())
        .upsert(&shop, &Email::for_shop(&shop))
        .await
    {
        Ok(merchant) => merchant,
        Err(e) => {
            tracing::error!(shop = %shop, error = %e, "failed to upsert merchant");
            return Redirect::to("/auth/error?error=install_failed").into_response();
        }
    };

    let sealed = match state.vault().seal(&grant.access_token) {
        Ok(sealed) => sealed,
        Err(e) => {
            tracing::error!(shop = %shop, error = %e, "failed to seal access token");
            return Redirect::to("/auth/error?error=install_failed").into_response();
        }
    };

    // Token persistence is deliberately the final write of the flow.
    if let Err(e) = ConnectionRepository::new(state.pool())
        .upsert(merchant.id, &shop, &sealed, &grant.scope)
        .await
    {
        tracing::error!(shop = %shop, error = %e, "failed to store connection");
        return Redirect::to("/auth/error?error=install_failed").into_response();
    }

    // Webhook registration runs off the request path; a transient failure
    // here must not undo a completed install.
    {
        let state = state.clone();
        let shop = shop.clone();
        let token = grant.access_token.clone();
        tokio::spawn(async move {
            let base_url = state.config().base_url.clone();
            if let Err(e) = state
                .shopify()
                .register_webhooks(&shop, &token, &base_url, WEBHOOK_TOPICS)
                .await
            {
                sentry::capture_error(&e);
                tracing::error!(shop = %shop, error = %e, "webhook registration failed");
            }
        });
    }

    let current = CurrentMerchant {
        merchant_id: merchant.id,
        shop: shop.clone(),
    };
    if let Err(e) = set_current_merchant(&session, &current).await {
        tracing::error!(error = %e, "failed to write merchant session");
    }

    tracing::info!(shop = %shop, merchant_id = %merchant.id, "install completed");
    Redirect::to("/app").into_response()
}

/// GET /logout - Drop the merchant session and return to the install page.
#[instrument(skip(session))]
async fn logout(session: Session) -> Response {
    if let Err(e) = clear_current_merchant(&session).await {
        tracing::error!(error = %e, "failed to clear merchant session");
    }
    crate::error::clear_sentry_merchant();
    Redirect::to("/install").into_response()
}

/// GET /auth/error - Human-readable install errors.
#[instrument]
async fn auth_error(Query(params): Query<AuthErrorParams>) -> Response {
    let message = params.error.as_deref().map_or(
        "Something went wrong during installation.",
        |e| match e {
            "missing_shop" => "No shop was provided. Start the install from your store's admin.",
            "invalid_shop" => {
                "That does not look like a valid store domain. Check the address and try again."
            }
            "oauth_denied" => "The authorization request was declined.",
            "invalid_hmac" => "The request signature was invalid. Please start the install again.",
            "invalid_state" => {
                "This install link has expired or was already used. Please start again."
            }
            "exchange_failed" => "The platform rejected the authorization code. Please try again.",
            _ => "Something went wrong during installation. Please try again.",
        },
    );

    Html(format!(
        "<!DOCTYPE html><html><head><title>Installation error</title></head>\
         <body><h1>Installation error</h1><p>{message}</p>\
         <p><a href=\"/install\">Try again</a></p></body></html>"
    ))
    .into_response()
}

/// Decode the raw callback query into the pairs covered by the
/// signature, dropping `hmac` and the legacy `signature` parameter.
fn signed_query_pairs(raw_query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(raw_query.as_bytes())
        .filter(|(k, _)| k != "hmac" && k != "signature")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_query_pairs_excludes_hmac() {
        let raw = "code=abc&hmac=deadbeef&shop=acme.myshopify.com&signature=old&state=n1";
        let pairs = signed_query_pairs(raw);

        assert_eq!(
            pairs,
            vec![
                ("code".to_owned(), "abc".to_owned()),
                ("shop".to_owned(), "acme.myshopify.com".to_owned()),
                ("state".to_owned(), "n1".to_owned()),
            ]
        );
    }

    #[test]
    fn test_signed_query_pairs_decodes_percent_encoding() {
        let raw = "host=YWNtZQ%3D%3D&shop=acme.myshopify.com";
        let pairs = signed_query_pairs(raw);
        assert_eq!(pairs[0], ("host".to_owned(), "YWNtZQ==".to_owned()));
    }

    #[test]
    fn test_signed_query_pairs_empty() {
        assert!(signed_query_pairs("").is_empty());
    }
}
