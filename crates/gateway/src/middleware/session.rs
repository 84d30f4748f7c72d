//! Session middleware configuration.
//!
//! Sets up `PostgreSQL`-backed sessions using tower-sessions. Session
//! cookies are signed with a key derived from `GATEWAY_SESSION_SECRET`,
//! so a tampered session id is rejected before the store is consulted.

use secrecy::ExposeSecret;
use sqlx::PgPool;
use tower_sessions::{Expiry, SessionManagerLayer, cookie::Key, service::SignedCookie};
use tower_sessions_sqlx_store::PostgresStore;

use crate::config::GatewayConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "sg_session";

/// Session expiry time in seconds (7 days).
const SESSION_EXPIRY_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Create the session layer with `PostgreSQL` store.
///
/// The sessions table must be created via migration.
#[must_use]
pub fn create_session_layer(
    pool: &PgPool,
    config: &GatewayConfig,
) -> SessionManagerLayer<PostgresStore, SignedCookie> {
    let store = PostgresStore::new(pool.clone());

    let is_secure = config.base_url.starts_with("https://");

    // Key::derive_from needs at least 32 bytes; config validation
    // already enforces that on the secret.
    let signing_key = Key::derive_from(config.session_secret.expose_secret().as_bytes());

    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(
            tower_sessions::cookie::time::Duration::seconds(SESSION_EXPIRY_SECONDS),
        ))
        .with_secure(is_secure)
        .with_same_site(tower_sessions::cookie::SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
        .with_signed(signing_key)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // The SignedCookie return type is the contract here; this pins the
    // key derivation to the configured secret without touching Postgres.
    #[tokio::test]
    async fn test_layer_builds_signed_from_config_secret() {
        let pool = PgPool::connect_lazy("postgres://localhost/test").unwrap();
        let config = GatewayConfig::for_tests();
        let _layer: SessionManagerLayer<PostgresStore, SignedCookie> =
            create_session_layer(&pool, &config);
    }
}
