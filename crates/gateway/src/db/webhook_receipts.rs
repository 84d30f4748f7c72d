//! Webhook receipt ledger.
//!
//! The platform delivers webhooks at-least-once. Each delivery carries a
//! unique id; inserting it with `ON CONFLICT DO NOTHING` makes the insert
//! itself the idempotency check and works across gateway instances.

use sqlx::PgPool;

use shopgate_core::ShopDomain;

use super::RepositoryError;

/// Repository for webhook receipt operations.
pub struct WebhookReceiptRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> WebhookReceiptRepository<'a> {
    /// Create a new webhook receipt repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a delivery. Returns `true` if this is the first time the
    /// delivery id is seen, `false` for a redelivery.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn record(
        &self,
        delivery_id: &str,
        topic: &str,
        shop: &ShopDomain,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            INSERT INTO webhook_receipt (delivery_id, topic, shop)
            VALUES ($1, $2, $3)
            ON CONFLICT (delivery_id) DO NOTHING
            ",
        )
        .bind(delivery_id)
        .bind(topic)
        .bind(shop.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Drop receipts older than `days` days. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn prune_older_than_days(&self, days: i32) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM webhook_receipt
            WHERE received_at < NOW() - make_interval(days => $1)
            ",
        )
        .bind(days)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
