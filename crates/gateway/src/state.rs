//! Application state shared across handlers.

use std::sync::Arc;

use secrecy::ExposeSecret;
use sqlx::PgPool;

use crate::config::GatewayConfig;
use crate::session_token::SessionTokenValidator;
use crate::shopify::ShopifyClient;
use crate::vault::TokenVault;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like database connections and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: GatewayConfig,
    pool: PgPool,
    shopify: ShopifyClient,
    vault: TokenVault,
    session_tokens: SessionTokenValidator,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: GatewayConfig, pool: PgPool) -> Self {
        let shopify = ShopifyClient::new(&config.shopify);
        let vault = TokenVault::new(config.token_encryption_key);
        let session_tokens = SessionTokenValidator::new(
            &config.shopify.client_id,
            config.shopify.client_secret.expose_secret(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                pool,
                shopify,
                vault,
                session_tokens,
            }),
        }
    }

    /// Get a reference to the gateway configuration.
    #[must_use]
    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.inner.pool
    }

    /// Get a reference to the Shopify Admin API client.
    #[must_use]
    pub fn shopify(&self) -> &ShopifyClient {
        &self.inner.shopify
    }

    /// Get a reference to the credential vault.
    #[must_use]
    pub fn vault(&self) -> &TokenVault {
        &self.inner.vault
    }

    /// Get a reference to the session token validator.
    #[must_use]
    pub fn session_tokens(&self) -> &SessionTokenValidator {
        &self.inner.session_tokens
    }
}
