//! Subscription repository.
//!
//! Billing state lives here as a small state machine. Transitions are
//! guarded inside the UPDATE itself so concurrent webhook deliveries and
//! the confirm redirect cannot race a terminal row back to life.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use shopgate_core::{MerchantId, SubscriptionId, SubscriptionStatus};

use super::RepositoryError;
use crate::models::Subscription;

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: i32,
    merchant_id: i32,
    charge_id: i64,
    plan_name: String,
    price: Decimal,
    status: String,
    trial_days: i32,
    activated_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SubscriptionRow {
    fn into_model(self) -> Result<Subscription, RepositoryError> {
        let status = self.status.parse::<SubscriptionStatus>().map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid subscription status in database: {e}"))
        })?;

        Ok(Subscription {
            id: SubscriptionId::new(self.id),
            merchant_id: MerchantId::new(self.merchant_id),
            charge_id: self.charge_id,
            plan_name: self.plan_name,
            price: self.price,
            status,
            trial_days: self.trial_days,
            activated_at: self.activated_at,
            cancelled_at: self.cancelled_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

const SELECT_COLUMNS: &str = r"id, merchant_id, charge_id, plan_name, price, status, trial_days,
       activated_at, cancelled_at, created_at, updated_at";

/// Repository for subscription operations.
pub struct SubscriptionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubscriptionRepository<'a> {
    /// Create a new subscription repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Record a freshly created (pending) charge.
    ///
    /// A partial unique index allows at most one open (pending or
    /// active) subscription per merchant, so a concurrent second
    /// subscribe surfaces as `Conflict` instead of a second charge.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the charge id already
    /// exists or the merchant already has an open subscription.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create_pending(
        &self,
        merchant_id: MerchantId,
        charge_id: i64,
        plan_name: &str,
        price: Decimal,
        trial_days: i32,
    ) -> Result<Subscription, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            INSERT INTO subscription (merchant_id, charge_id, plan_name, price, status, trial_days)
            VALUES ($1, $2, $3, $4, 'pending', $5)
            RETURNING {SELECT_COLUMNS}
            "
        ))
        .bind(merchant_id.as_i32())
        .bind(charge_id)
        .bind(plan_name)
        .bind(price)
        .bind(trial_days)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict(
                    "charge already recorded or subscription already open".to_owned(),
                );
            }
            RepositoryError::Database(e)
        })?;

        row.into_model()
    }

    /// Get a subscription by platform charge id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn get_by_charge_id(
        &self,
        charge_id: i64,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            SELECT {SELECT_COLUMNS}
            FROM subscription
            WHERE charge_id = $1
            "
        ))
        .bind(charge_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(SubscriptionRow::into_model).transpose()
    }

    /// Get the merchant's active subscription, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn get_active_for_merchant(
        &self,
        merchant_id: MerchantId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            SELECT {SELECT_COLUMNS}
            FROM subscription
            WHERE merchant_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            LIMIT 1
            "
        ))
        .bind(merchant_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(SubscriptionRow::into_model).transpose()
    }

    /// Get the merchant's open (pending or active) subscription, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn get_open_for_merchant(
        &self,
        merchant_id: MerchantId,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            SELECT {SELECT_COLUMNS}
            FROM subscription
            WHERE merchant_id = $1 AND status IN ('pending', 'active')
            LIMIT 1
            "
        ))
        .bind(merchant_id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(SubscriptionRow::into_model).transpose()
    }

    /// Apply a status transition to the subscription for `charge_id`.
    ///
    /// The allowed-transition table is enforced inside the UPDATE:
    /// terminal rows (declined, cancelled) only accept redeliveries of
    /// the same status, so a late webhook carrying an older state cannot
    /// resurrect them. A blocked transition is not an error; the current
    /// row is returned unchanged and a warning is logged.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn transition_by_charge_id(
        &self,
        charge_id: i64,
        new_status: SubscriptionStatus,
    ) -> Result<Option<Subscription>, RepositoryError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            r"
            UPDATE subscription
            SET status = $2,
                activated_at = CASE
                    WHEN $2 = 'active' AND activated_at IS NULL THEN NOW()
                    ELSE activated_at
                END,
                cancelled_at = CASE
                    WHEN $2 = 'cancelled' AND cancelled_at IS NULL THEN NOW()
                    ELSE cancelled_at
                END,
                updated_at = NOW()
            WHERE charge_id = $1
              AND (
                    status = $2
                 OR (status = 'pending' AND $2 IN ('active', 'declined'))
                 OR (status = 'active' AND $2 IN ('cancelled', 'declined'))
              )
            RETURNING {SELECT_COLUMNS}
            "
        ))
        .bind(charge_id)
        .bind(new_status.as_str())
        .fetch_optional(self.pool)
        .await?;

        if let Some(row) = row {
            return Ok(Some(row.into_model()?));
        }

        // Zero rows: either the charge is unknown or the transition was
        // blocked by the guard. Fetch to tell the two apart.
        let current = self.get_by_charge_id(charge_id).await?;
        if let Some(current) = &current {
            tracing::warn!(
                charge_id,
                current_status = %current.status,
                requested_status = %new_status,
                "ignored blocked subscription transition"
            );
        }
        Ok(current)
    }
}
