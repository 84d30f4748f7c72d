//! Recurring billing flow.
//!
//! `POST /billing/subscribe` creates a pending charge and sends the
//! merchant to the platform's approval page. The merchant lands back on
//! `GET /billing/confirm`, which never trusts anything in the redirect
//! beyond the charge id: the authoritative status is re-fetched from the
//! platform before the local state machine moves.

use axum::{
    Router,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::instrument;

use shopgate_core::SubscriptionStatus;

use crate::db::{ConnectionRepository, SubscriptionRepository};
use crate::error::AppError;
use crate::middleware::RequireMerchant;
use crate::models::{CurrentMerchant, Subscription};
use crate::shopify::RecurringChargePlan;
use crate::state::AppState;

/// Build the billing router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/billing/subscribe", post(subscribe))
        .route("/billing/confirm", get(confirm))
}

#[derive(Debug, Deserialize)]
pub struct ConfirmParams {
    pub charge_id: Option<i64>,
}

/// POST /billing/subscribe - Create a charge and redirect to approval.
#[instrument(skip(state, merchant), fields(shop = %merchant.0.shop))]
async fn subscribe(
    State(state): State<AppState>,
    merchant: RequireMerchant,
) -> Result<Response, AppError> {
    let RequireMerchant(merchant) = merchant;

    let token = connection_token(&state, &merchant).await?;

    // An open subscription means the merchant was already sent to (or
    // through) the approval page; never create a second charge for it.
    if let Some(open) = SubscriptionRepository::new(state.pool())
        .get_open_for_merchant(merchant.merchant_id)
        .await?
    {
        return resume_open_subscription(&state, &merchant, &token, &open).await;
    }

    let billing = &state.config().billing;
    let plan = RecurringChargePlan {
        name: billing.plan_name.clone(),
        price: billing.price.to_string(),
        return_url: state.config().billing_return_url(),
        trial_days: i32::try_from(billing.trial_days).unwrap_or(i32::MAX),
        test: billing.test.then_some(true),
    };

    let charge = state
        .shopify()
        .create_recurring_charge(&merchant.shop, &token, &plan)
        .await?;

    SubscriptionRepository::new(state.pool())
        .create_pending(
            merchant.merchant_id,
            charge.id,
            &billing.plan_name,
            billing.price,
            plan.trial_days,
        )
        .await?;

    let confirmation_url = charge.confirmation_url.ok_or_else(|| {
        AppError::Internal("pending charge without confirmation URL".to_owned())
    })?;

    tracing::info!(charge_id = charge.id, "created pending charge");
    Ok(Redirect::to(&confirmation_url).into_response())
}

/// Send the merchant back into an already-open subscription flow.
///
/// Active rows go straight to the app. Pending rows re-fetch the charge
/// so the merchant lands on the platform's approval page again; if the
/// platform no longer offers one, confirm reconciles the real status.
async fn resume_open_subscription(
    state: &AppState,
    merchant: &CurrentMerchant,
    token: &shopgate_core::AccessToken,
    open: &Subscription,
) -> Result<Response, AppError> {
    if open.status == SubscriptionStatus::Active {
        tracing::info!(charge_id = open.charge_id, "subscription already active");
        return Ok(Redirect::to("/app?billing=active").into_response());
    }

    let charge = state
        .shopify()
        .get_recurring_charge(&merchant.shop, token, open.charge_id)
        .await?;

    tracing::info!(charge_id = open.charge_id, "resuming pending charge");
    match charge.confirmation_url {
        Some(url) => Ok(Redirect::to(&url).into_response()),
        None => Ok(
            Redirect::to(&format!("/billing/confirm?charge_id={}", open.charge_id))
                .into_response(),
        ),
    }
}

/// GET /billing/confirm - Reconcile a charge after the approval page.
#[instrument(skip(state, merchant), fields(shop = %merchant.0.shop))]
async fn confirm(
    State(state): State<AppState>,
    merchant: RequireMerchant,
    Query(params): Query<ConfirmParams>,
) -> Result<Response, AppError> {
    let RequireMerchant(merchant) = merchant;

    let charge_id = params
        .charge_id
        .ok_or_else(|| AppError::BadRequest("missing charge_id".to_owned()))?;

    // The redirect only proves the merchant visited the approval page.
    // Ask the platform what actually happened.
    let token = connection_token(&state, &merchant).await?;
    let charge = state
        .shopify()
        .get_recurring_charge(&merchant.shop, &token, charge_id)
        .await?;

    let status = match charge.status.as_str() {
        "active" | "accepted" => SubscriptionStatus::Active,
        "declined" => SubscriptionStatus::Declined,
        "pending" => SubscriptionStatus::Pending,
        other => {
            tracing::warn!(charge_id, status = other, "charge in unexpected status on confirm");
            SubscriptionStatus::Cancelled
        }
    };

    let updated = SubscriptionRepository::new(state.pool())
        .transition_by_charge_id(charge_id, status)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("subscription for charge {charge_id}")))?;

    tracing::info!(charge_id, status = %updated.status, "billing confirm reconciled");

    let destination = match updated.status {
        SubscriptionStatus::Active => "/app?billing=active",
        SubscriptionStatus::Declined => "/app?billing=declined",
        SubscriptionStatus::Pending => "/app?billing=pending",
        SubscriptionStatus::Cancelled => "/app?billing=cancelled",
    };
    Ok(Redirect::to(destination).into_response())
}

/// Load and open the access token for the merchant's installed connection.
async fn connection_token(
    state: &AppState,
    merchant: &CurrentMerchant,
) -> Result<shopgate_core::AccessToken, AppError> {
    let connection = ConnectionRepository::new(state.pool())
        .get_installed_by_shop(&merchant.shop)
        .await?
        .ok_or_else(|| AppError::Unauthorized("app is not installed for this shop".to_owned()))?;

    Ok(state.vault().open(&connection.access_token)?)
}
