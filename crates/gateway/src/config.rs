//! Gateway configuration loaded from environment variables.
//!
//! Configuration is loaded once at startup into an immutable struct;
//! missing or malformed required values abort startup instead of
//! surfacing mid-request as a malformed redirect or a failed exchange.
//!
//! # Environment Variables
//!
//! ## Required
//! - `GATEWAY_DATABASE_URL` - `PostgreSQL` connection string
//! - `GATEWAY_BASE_URL` - Public URL of the gateway, no trailing slash
//!   (the OAuth redirect URI is derived from it and must exactly match
//!   the value registered with the platform)
//! - `GATEWAY_SESSION_SECRET` - Session signing secret (min 32 chars, high entropy)
//! - `SHOPIFY_CLIENT_ID` - App OAuth client ID
//! - `SHOPIFY_CLIENT_SECRET` - App OAuth client secret (also the webhook
//!   and session-token signing secret)
//!
//! ## Optional
//! - `GATEWAY_HOST` - Bind address (default: 127.0.0.1)
//! - `GATEWAY_PORT` - Listen port (default: 3000)
//! - `SHOPIFY_SCOPES` - Comma-separated OAuth scopes (default: read_products)
//! - `SHOPIFY_API_VERSION` - API version (default: 2026-01)
//! - `TOKEN_ENCRYPTION_KEY` - 64 hex chars (32 bytes); when absent the
//!   credential vault runs in plaintext fail-open mode
//! - `BILLING_PLAN_NAME` - Recurring charge plan name (default: Pro)
//! - `BILLING_PRICE` - Monthly price (default: 29.00)
//! - `BILLING_TRIAL_DAYS` - Trial length in days (default: 14)
//! - `BILLING_TEST` - Create test charges (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "secret",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Gateway application configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL for the gateway (no trailing slash)
    pub base_url: String,
    /// Session signing secret
    pub session_secret: SecretString,
    /// Shopify app configuration
    pub shopify: ShopifyAppConfig,
    /// Recurring billing configuration
    pub billing: BillingConfig,
    /// Token-at-rest encryption key (None = vault fail-open mode)
    pub token_encryption_key: Option<[u8; 32]>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment (e.g., "development", "staging", "production")
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate (0.0 to 1.0)
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate for performance monitoring (0.0 to 1.0)
    pub sentry_traces_sample_rate: f32,
}

/// Shopify app (OAuth client) configuration.
///
/// Implements `Debug` manually to redact the client secret, which also
/// signs webhooks and session tokens.
#[derive(Clone)]
pub struct ShopifyAppConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: SecretString,
    /// Requested OAuth scopes
    pub scopes: Vec<String>,
    /// Shopify API version (e.g., 2026-01)
    pub api_version: String,
}

impl std::fmt::Debug for ShopifyAppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopifyAppConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("scopes", &self.scopes)
            .field("api_version", &self.api_version)
            .finish()
    }
}

/// Recurring billing configuration.
#[derive(Debug, Clone)]
pub struct BillingConfig {
    /// Plan name shown on the charge approval page
    pub plan_name: String,
    /// Monthly price
    pub price: Decimal,
    /// Trial length in days
    pub trial_days: u32,
    /// Create test charges (never billed)
    pub test: bool,
}

impl GatewayConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("GATEWAY_DATABASE_URL")?;
        let host = get_env_or_default("GATEWAY_HOST", "127.0.0.1")
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidEnvVar("GATEWAY_HOST".to_owned(), e.to_string()))?;
        let port = get_env_or_default("GATEWAY_PORT", "3000")
            .parse::<u16>()
            .map_err(|e| ConfigError::InvalidEnvVar("GATEWAY_PORT".to_owned(), e.to_string()))?;

        let base_url = get_required_env("GATEWAY_BASE_URL")?;
        // The redirect URI is derived from base_url and must byte-match the
        // value registered with the platform - a trailing slash breaks it.
        if base_url.ends_with('/') {
            return Err(ConfigError::InvalidEnvVar(
                "GATEWAY_BASE_URL".to_owned(),
                "must not end with a trailing slash".to_owned(),
            ));
        }

        let session_secret = get_validated_secret("GATEWAY_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "GATEWAY_SESSION_SECRET")?;

        let shopify = ShopifyAppConfig::from_env()?;
        let billing = BillingConfig::from_env()?;
        let token_encryption_key = get_token_encryption_key()?;

        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            shopify,
            billing,
            token_encryption_key,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// The exact OAuth redirect URI registered with the platform.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("{}/auth/callback", self.base_url)
    }

    /// The billing return URL the merchant is redirected to after the
    /// charge approval page.
    #[must_use]
    pub fn billing_return_url(&self) -> String {
        format!("{}/billing/confirm", self.base_url)
    }
}

impl ShopifyAppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let scopes = get_env_or_default("SHOPIFY_SCOPES", "read_products")
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            client_id: get_required_env("SHOPIFY_CLIENT_ID")?,
            client_secret: get_validated_secret("SHOPIFY_CLIENT_SECRET")?,
            scopes,
            api_version: get_env_or_default("SHOPIFY_API_VERSION", "2026-01"),
        })
    }
}

impl BillingConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let price = get_env_or_default("BILLING_PRICE", "29.00")
            .parse::<Decimal>()
            .map_err(|e| ConfigError::InvalidEnvVar("BILLING_PRICE".to_owned(), e.to_string()))?;
        let trial_days = get_env_or_default("BILLING_TRIAL_DAYS", "14")
            .parse::<u32>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("BILLING_TRIAL_DAYS".to_owned(), e.to_string())
            })?;
        let test = get_env_or_default("BILLING_TEST", "false")
            .parse::<bool>()
            .map_err(|e| ConfigError::InvalidEnvVar("BILLING_TEST".to_owned(), e.to_string()))?;

        Ok(Self {
            plan_name: get_env_or_default("BILLING_PLAN_NAME", "Pro"),
            price,
            trial_days,
            test,
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_owned()))
}

/// Get database URL with fallback to generic `DATABASE_URL` (used by Fly.io postgres attach).
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_owned()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse the optional token encryption key (64 hex chars = 32 bytes).
fn get_token_encryption_key() -> Result<Option<[u8; 32]>, ConfigError> {
    let Some(value) = get_optional_env("TOKEN_ENCRYPTION_KEY") else {
        return Ok(None);
    };

    let bytes = hex::decode(value.trim()).map_err(|e| {
        ConfigError::InvalidEnvVar("TOKEN_ENCRYPTION_KEY".to_owned(), e.to_string())
    })?;

    let key: [u8; 32] = bytes.try_into().map_err(|b: Vec<u8>| {
        ConfigError::InvalidEnvVar(
            "TOKEN_ENCRYPTION_KEY".to_owned(),
            format!("must be 32 bytes (64 hex chars), got {} bytes", b.len()),
        )
    })?;

    Ok(Some(key))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.len() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_owned(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Check entropy (real secrets like API keys have high entropy)
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_owned(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
impl GatewayConfig {
    /// Fixture with valid values for unit tests.
    pub(crate) fn for_tests() -> Self {
        Self {
            database_url: SecretString::from("postgres://localhost/test"),
            host: "127.0.0.1".parse().unwrap(),
            port: 3000,
            base_url: "https://gateway.test".to_owned(),
            session_secret: SecretString::from("x".repeat(32)),
            shopify: ShopifyAppConfig {
                client_id: "test_client_id".to_owned(),
                client_secret: SecretString::from("test_client_secret"),
                scopes: vec!["read_products".to_owned()],
                api_version: "2026-01".to_owned(),
            },
            billing: BillingConfig {
                plan_name: "Pro".to_owned(),
                price: "29.00".parse().unwrap(),
                trial_days: 14,
                test: false,
            },
            token_encryption_key: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 1.0,
            sentry_traces_sample_rate: 1.0,
        }
    }
}
