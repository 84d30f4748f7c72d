//! Embedded app API routes.
//!
//! These are called by the app's frontend running inside the platform
//! admin; identity comes from the bearer session token, not the cookie
//! session.

use axum::{
    Json, Router,
    extract::State,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tracing::instrument;

use crate::db::{ConnectionRepository, MerchantRepository, SubscriptionRepository};
use crate::error::AppError;
use crate::middleware::{BearerSession, RequireMerchant};
use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/me", get(me))
        .route("/app", get(app_shell))
}

#[derive(Debug, Serialize)]
struct MeResponse {
    shop: String,
    user_id: String,
    installed: bool,
    subscription: Option<SubscriptionView>,
}

#[derive(Debug, Serialize)]
struct SubscriptionView {
    plan_name: String,
    status: String,
    price: String,
}

/// GET /api/me - Identity and subscription state for the embedded app.
#[instrument(skip(state, session), fields(shop = %session.0.shop))]
async fn me(State(state): State<AppState>, session: BearerSession) -> Result<Response, AppError> {
    let BearerSession(session) = session;

    let merchant = MerchantRepository::new(state.pool())
        .get_by_shop(&session.shop)
        .await?
        .ok_or_else(|| AppError::NotFound("merchant account".to_owned()))?;

    let connection = ConnectionRepository::new(state.pool())
        .get_installed_by_shop(&session.shop)
        .await?;

    let subscription = SubscriptionRepository::new(state.pool())
        .get_active_for_merchant(merchant.id)
        .await?
        .map(|sub| SubscriptionView {
            plan_name: sub.plan_name,
            status: sub.status.to_string(),
            price: sub.price.to_string(),
        });

    Ok(Json(MeResponse {
        shop: session.shop.to_string(),
        user_id: session.user_id,
        installed: connection.is_some(),
        subscription,
    })
    .into_response())
}

/// GET /app - Embedded app shell.
///
/// The real frontend is served by the platform's app proxy in
/// production; this page is the landing target for install and billing
/// redirects.
#[instrument(skip(merchant), fields(shop = %merchant.0.shop))]
async fn app_shell(merchant: RequireMerchant) -> Response {
    let RequireMerchant(merchant) = merchant;
    Html(format!(
        "<!DOCTYPE html><html><head><title>Shopgate</title></head>\
         <body><h1>Shopgate</h1><p>Connected to {}.</p></body></html>",
        merchant.shop
    ))
    .into_response()
}
