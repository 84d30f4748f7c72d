//! Merchant account repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shopgate_core::{Email, MerchantId, ShopDomain};

use super::RepositoryError;
use crate::models::MerchantAccount;

#[derive(sqlx::FromRow)]
struct MerchantRow {
    id: i32,
    shop: String,
    email: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl MerchantRow {
    fn into_model(self) -> Result<MerchantAccount, RepositoryError> {
        let shop = ShopDomain::parse(&self.shop).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid shop domain in database: {e}"))
        })?;
        let email = Email::parse(&self.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(MerchantAccount {
            id: MerchantId::new(self.id),
            shop,
            email,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Repository for merchant account operations.
pub struct MerchantRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> MerchantRepository<'a> {
    /// Create a new merchant repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a merchant by shop domain.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn get_by_shop(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<MerchantAccount>, RepositoryError> {
        let row = sqlx::query_as::<_, MerchantRow>(
            r"
            SELECT id, shop, email, created_at, updated_at
            FROM merchant_account
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(MerchantRow::into_model).transpose()
    }

    /// Create a merchant, or return the existing row for this shop.
    ///
    /// Reinstalls hit the same shop domain; the account is stable across
    /// install/uninstall cycles, so this is an upsert keyed on shop.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn upsert(
        &self,
        shop: &ShopDomain,
        email: &Email,
    ) -> Result<MerchantAccount, RepositoryError> {
        let row = sqlx::query_as::<_, MerchantRow>(
            r"
            INSERT INTO merchant_account (shop, email)
            VALUES ($1, $2)
            ON CONFLICT (shop) DO UPDATE
                SET updated_at = NOW()
            RETURNING id, shop, email, created_at, updated_at
            ",
        )
        .bind(shop.as_str())
        .bind(email.as_str())
        .fetch_one(self.pool)
        .await?;

        row.into_model()
    }
}
