//! Shopify Admin API client and request verification.
//!
//! The gateway is a multi-tenant app: unlike a single-store integration
//! there is no resident token, every Admin API call names the shop and
//! presents that shop's access token. OAuth, recurring charges, and
//! webhook registration all live on [`ShopifyClient`]; signature checks
//! for inbound requests live in [`verify`].

mod client;
pub mod verify;

pub use client::{RecurringCharge, RecurringChargePlan, ShopifyClient, TokenGrant};

use thiserror::Error;

/// Errors that can occur when interacting with the Shopify Admin API.
#[derive(Debug, Error)]
pub enum ShopifyError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// OAuth token exchange failed.
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// API returned a non-success status.
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Rate limited by Shopify.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Token rejected by the platform (revoked or expired).
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ShopifyError {
    /// Whether a call failing with this error may be retried.
    ///
    /// Only transport failures, rate limits, and upstream 5xx qualify.
    /// OAuth failures never do: the authorization code is single-use and
    /// replaying the exchange can only fail again.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::OAuth(_) | Self::Parse(_) | Self::Unauthorized(_) | Self::NotFound(_) => false,
        }
    }
}
