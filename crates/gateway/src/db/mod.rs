//! Database operations for the gateway `PostgreSQL`.
//!
//! Local persistence only (the platform stays the source of truth for
//! shop data):
//!
//! ## Tables
//!
//! - `merchant_account` - One row per shop that ever installed
//! - `platform_connection` - OAuth grant per shop (sealed access token)
//! - `subscription` - Recurring billing state machine
//! - `webhook_receipt` - Idempotency ledger for processed webhooks
//! - `oauth_nonce` - Single-use install state values
//! - `sessions` - Tower-sessions storage
//!
//! # Migrations
//!
//! Migrations are stored in `crates/gateway/migrations/` and run via:
//! ```bash
//! cargo run -p shopgate-cli -- migrate
//! ```

use std::time::Duration;

use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

mod connections;
mod merchants;
mod oauth_nonces;
mod subscriptions;
mod webhook_receipts;

pub use connections::ConnectionRepository;
pub use merchants::MerchantRepository;
pub use oauth_nonces::OAuthNonceRepository;
pub use subscriptions::SubscriptionRepository;
pub use webhook_receipts::WebhookReceiptRepository;

/// Errors from repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Constraint violation (e.g., duplicate shop).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}
