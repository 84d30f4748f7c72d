//! Domain models for the gateway database.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use shopgate_core::{ConnectionId, Email, MerchantId, ShopDomain, SubscriptionId, SubscriptionStatus};

/// A merchant account, created on first successful install.
#[derive(Debug, Clone)]
pub struct MerchantAccount {
    pub id: MerchantId,
    pub shop: ShopDomain,
    pub email: Email,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A connection between a merchant and the platform.
///
/// `access_token` holds the *sealed* form as persisted (ciphertext or
/// plaintext, see the vault); it is never logged and `Debug` redacts it.
#[derive(Clone)]
pub struct PlatformConnection {
    pub id: ConnectionId,
    pub merchant_id: MerchantId,
    pub shop: ShopDomain,
    /// Sealed token as stored; open via the vault before use.
    pub access_token: String,
    /// Scopes actually granted by the platform (may differ from requested).
    pub scope: String,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
}

impl PlatformConnection {
    /// Whether the connection is currently installed.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        self.uninstalled_at.is_none()
    }
}

impl std::fmt::Debug for PlatformConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformConnection")
            .field("id", &self.id)
            .field("merchant_id", &self.merchant_id)
            .field("shop", &self.shop)
            .field("access_token", &"[REDACTED]")
            .field("scope", &self.scope)
            .field("installed_at", &self.installed_at)
            .field("uninstalled_at", &self.uninstalled_at)
            .finish()
    }
}

/// A recurring billing subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub merchant_id: MerchantId,
    /// The platform-side recurring charge id.
    pub charge_id: i64,
    pub plan_name: String,
    pub price: Decimal,
    pub status: SubscriptionStatus,
    pub trial_days: i32,
    pub activated_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session payload identifying the signed-in merchant.
///
/// Stored in the cookie session after a completed install.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentMerchant {
    pub merchant_id: MerchantId,
    pub shop: ShopDomain,
}

impl CurrentMerchant {
    /// Session storage key.
    pub const SESSION_KEY: &'static str = "current_merchant";
}
