//! Platform connection repository.
//!
//! One row per shop. A reinstall reuses the row: the platform issues a
//! fresh token and possibly different scopes, so the upsert replaces both
//! and clears `uninstalled_at`.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shopgate_core::{ConnectionId, MerchantId, ShopDomain};

use super::RepositoryError;
use crate::models::PlatformConnection;
use crate::vault::SealedToken;

#[derive(sqlx::FromRow)]
struct ConnectionRow {
    id: i32,
    merchant_id: i32,
    shop: String,
    access_token: String,
    scope: String,
    installed_at: DateTime<Utc>,
    uninstalled_at: Option<DateTime<Utc>>,
}

impl ConnectionRow {
    fn into_model(self) -> Result<PlatformConnection, RepositoryError> {
        let shop = ShopDomain::parse(&self.shop).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid shop domain in database: {e}"))
        })?;

        Ok(PlatformConnection {
            id: ConnectionId::new(self.id),
            merchant_id: MerchantId::new(self.merchant_id),
            shop,
            access_token: self.access_token,
            scope: self.scope,
            installed_at: self.installed_at,
            uninstalled_at: self.uninstalled_at,
        })
    }
}

/// Repository for platform connection operations.
pub struct ConnectionRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ConnectionRepository<'a> {
    /// Create a new connection repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection for a shop, installed or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn get_by_shop(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<PlatformConnection>, RepositoryError> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r"
            SELECT id, merchant_id, shop, access_token, scope,
                   installed_at, uninstalled_at
            FROM platform_connection
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(ConnectionRow::into_model).transpose()
    }

    /// Get the connection for a shop only if it is currently installed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn get_installed_by_shop(
        &self,
        shop: &ShopDomain,
    ) -> Result<Option<PlatformConnection>, RepositoryError> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r"
            SELECT id, merchant_id, shop, access_token, scope,
                   installed_at, uninstalled_at
            FROM platform_connection
            WHERE shop = $1 AND uninstalled_at IS NULL
            ",
        )
        .bind(shop.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(ConnectionRow::into_model).transpose()
    }

    /// Store a fresh grant for a shop (install or reinstall).
    ///
    /// Token persistence is the last step of the install flow; everything
    /// before it must already have succeeded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if stored data is invalid.
    pub async fn upsert(
        &self,
        merchant_id: MerchantId,
        shop: &ShopDomain,
        token: &SealedToken,
        scope: &str,
    ) -> Result<PlatformConnection, RepositoryError> {
        let row = sqlx::query_as::<_, ConnectionRow>(
            r"
            INSERT INTO platform_connection (merchant_id, shop, access_token, scope)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (shop) DO UPDATE
                SET access_token = EXCLUDED.access_token,
                    scope = EXCLUDED.scope,
                    installed_at = NOW(),
                    uninstalled_at = NULL
            RETURNING id, merchant_id, shop, access_token, scope,
                      installed_at, uninstalled_at
            ",
        )
        .bind(merchant_id.as_i32())
        .bind(shop.as_str())
        .bind(&token.value)
        .bind(scope)
        .fetch_one(self.pool)
        .await?;

        row.into_model()
    }

    /// Mark a shop's connection uninstalled.
    ///
    /// The stored token stays in place (the platform has already revoked
    /// it); only a redaction request wipes it. Idempotent: a second
    /// uninstall for the same shop is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_uninstalled(&self, shop: &ShopDomain) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r"
            UPDATE platform_connection
            SET uninstalled_at = NOW()
            WHERE shop = $1 AND uninstalled_at IS NULL
            ",
        )
        .bind(shop.as_str())
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Erase all stored credentials and personal data for a shop.
    ///
    /// Used by the shop-redaction webhook after the retention window; the
    /// connection row itself is kept as an audit stub.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn redact_shop(&self, shop: &ShopDomain) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r"
            UPDATE platform_connection
            SET access_token = '', uninstalled_at = COALESCE(uninstalled_at, NOW())
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r"
            UPDATE merchant_account
            SET email = 'redacted@' || shop, updated_at = NOW()
            WHERE shop = $1
            ",
        )
        .bind(shop.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }
}
