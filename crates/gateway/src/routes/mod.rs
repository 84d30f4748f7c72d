//! HTTP routes for the gateway.

pub mod api;
pub mod billing;
pub mod health;
pub mod oauth;
pub mod webhooks;

use axum::Router;

use crate::state::AppState;

/// Build the full application router.
#[must_use]
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(oauth::router())
        .merge(billing::router())
        .merge(api::router())
        .merge(health::router())
        .merge(webhooks::router())
}
