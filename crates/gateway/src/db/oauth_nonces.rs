//! OAuth nonce store.
//!
//! Install begins with a server-issued state value that must come back on
//! the callback exactly once. Nonces live in `PostgreSQL` so any gateway
//! instance can consume a nonce issued by another; consumption is a
//! single `DELETE ... RETURNING`, which is atomic under concurrent
//! callbacks carrying the same value.

use sqlx::PgPool;

use shopgate_core::ShopDomain;

use super::RepositoryError;

/// How long an issued nonce stays valid.
const NONCE_TTL_MINUTES: i32 = 10;

/// Repository for OAuth nonce operations.
pub struct OAuthNonceRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> OAuthNonceRepository<'a> {
    /// Create a new nonce repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Issue a nonce for a shop's install attempt.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn issue(&self, nonce: &str, shop: &ShopDomain) -> Result<(), RepositoryError> {
        sqlx::query(
            r"
            INSERT INTO oauth_nonce (nonce, shop)
            VALUES ($1, $2)
            ",
        )
        .bind(nonce)
        .bind(shop.as_str())
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Consume a nonce: valid at most once, only for the shop it was
    /// issued to, and only within the TTL.
    ///
    /// Returns `true` if the nonce was present, unexpired, issued for
    /// `shop`, and is now gone. Any second call with the same value
    /// returns `false`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn consume(&self, nonce: &str, shop: &ShopDomain) -> Result<bool, RepositoryError> {
        let row = sqlx::query(
            r"
            DELETE FROM oauth_nonce
            WHERE nonce = $1
              AND shop = $2
              AND issued_at > NOW() - make_interval(mins => $3)
            RETURNING nonce
            ",
        )
        .bind(nonce)
        .bind(shop.as_str())
        .bind(NONCE_TTL_MINUTES)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.is_some())
    }

    /// Drop expired nonces (abandoned install attempts).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn prune_expired(&self) -> Result<u64, RepositoryError> {
        let result = sqlx::query(
            r"
            DELETE FROM oauth_nonce
            WHERE issued_at <= NOW() - make_interval(mins => $1)
            ",
        )
        .bind(NONCE_TTL_MINUTES)
        .execute(self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
