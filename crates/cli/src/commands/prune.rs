//! Maintenance command for time-bounded tables.
//!
//! Expired OAuth nonces are abandoned install attempts; webhook receipts
//! only need to outlive the platform's redelivery window, 90 days is
//! generous. Both deletes go through the gateway repositories, so the
//! TTLs stay defined in exactly one place.

use shopgate_gateway::db::{OAuthNonceRepository, WebhookReceiptRepository};

use super::{CommandError, connect};

/// Prune expired OAuth nonces and webhook receipts older than
/// `receipt_days` days.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a delete
/// fails.
pub async fn run(receipt_days: i32) -> Result<(), CommandError> {
    let pool = connect().await?;

    let nonces = OAuthNonceRepository::new(&pool).prune_expired().await?;
    let receipts = WebhookReceiptRepository::new(&pool)
        .prune_older_than_days(receipt_days)
        .await?;

    tracing::info!(nonces, receipts, "prune complete");
    Ok(())
}
