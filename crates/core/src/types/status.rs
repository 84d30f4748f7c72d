//! Subscription status state machine.

use serde::{Deserialize, Serialize};

/// Recurring charge status, as reported by the platform.
///
/// Legal transitions:
///
/// ```text
/// (no charge) -> Pending -> Active -> Cancelled
///                   |          \-> Declined
///                   \-> Declined
/// ```
///
/// `Cancelled` and `Declined` are terminal: a subscription never leaves a
/// terminal state, a new charge (new subscription record) is required to
/// resume billing. [`SubscriptionStatus::can_transition_to`] encodes this;
/// the repository layer enforces the same guard in SQL so a stale webhook
/// cannot resurrect a dead subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Charge created, waiting for the merchant to approve.
    Pending,
    /// Merchant approved; billing is live.
    Active,
    /// Merchant declined the charge, or a payment failed.
    Declined,
    /// Merchant or platform cancelled an active charge.
    Cancelled,
}

impl SubscriptionStatus {
    /// Whether this status admits no further transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Declined | Self::Cancelled)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Self-transitions are allowed (webhook redelivery reports the same
    /// status); anything out of a terminal state is not.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match self {
            Self::Pending => matches!(next, Self::Pending | Self::Active | Self::Declined),
            Self::Active => matches!(next, Self::Active | Self::Cancelled | Self::Declined),
            Self::Declined => matches!(next, Self::Declined),
            Self::Cancelled => matches!(next, Self::Cancelled),
        }
    }

    /// Database/API string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "active" => Ok(Self::Active),
            "declined" => Ok(Self::Declined),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("invalid subscription status: {s}")),
        }
    }
}
