//! Affiliate reward types.
//!
//! A [`Reward`] is a monetary or credit obligation accrued to a referrer
//! when a qualifying event (registration, subscription payment) occurs in the
//! referee's account. Rewards are born `Pending` and held until their
//! `pending_until` deadline passes, absorbing refund/chargeback risk before
//! the amount becomes payable. Exactly one reward exists per
//! `(source_event_id, user_id, level)` — that key is what makes accrual
//! idempotent under webhook redelivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PayoutId, RewardId, UserId};

/// What kind of event accrued this reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardKind {
    /// Fixed credit grant for a referred registration.
    RegistrationCredit,

    /// Percentage commission on a referred user's subscription payment.
    SubscriptionCommission,
}

/// Lifecycle state of a reward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardStatus {
    /// Accrued, inside the anti-fraud hold window.
    Pending,

    /// Matured past the hold window; counted in the owner's balance.
    Released,

    /// Cancelled before release (chargeback, lapsed grace). Terminal.
    Void,
}

/// The value a reward carries.
///
/// Registration rewards grant internal credits; subscription commissions are
/// denominated in the currency of the underlying payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "denomination")]
pub enum RewardValue {
    /// Internal credit grant, in credit cents.
    Credits {
        /// Amount in credit cents.
        amount_cents: i64,
    },

    /// Real-currency commission, in minor units of `currency`.
    Currency {
        /// Amount in minor units (cents).
        amount_cents: i64,
        /// ISO currency code copied from the payment (e.g. "EUR").
        currency: String,
    },
}

impl RewardValue {
    /// Amount in minor units, regardless of denomination.
    #[must_use]
    pub const fn amount_cents(&self) -> i64 {
        match self {
            Self::Credits { amount_cents } | Self::Currency { amount_cents, .. } => *amount_cents,
        }
    }

    /// Currency code, if currency-denominated.
    #[must_use]
    pub fn currency(&self) -> Option<&str> {
        match self {
            Self::Credits { .. } => None,
            Self::Currency { currency, .. } => Some(currency),
        }
    }
}

/// An accrued affiliate reward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reward {
    /// Unique reward ID (ULID for time-ordering).
    pub id: RewardId,

    /// The referrer this reward accrues to.
    pub user_id: UserId,

    /// The referee/payer whose event generated the reward.
    pub source_user_id: UserId,

    /// What kind of event accrued it.
    pub kind: RewardKind,

    /// Chain depth of the attribution that earned it (1 = direct).
    pub level: u8,

    /// The credit or currency value.
    pub value: RewardValue,

    /// Lifecycle state.
    pub status: RewardStatus,

    /// End of the anti-fraud hold window.
    pub pending_until: DateTime<Utc>,

    /// Grace deadline set when the underlying subscription is cancelled.
    /// A pending reward past this deadline is voided, not released.
    pub grace_end_at: Option<DateTime<Utc>>,

    /// The subscription this commission is tied to, if any.
    pub subscription_id: Option<String>,

    /// Idempotency key: the external event that accrued this reward.
    pub source_event_id: String,

    /// The payout that has claimed this reward, if any.
    pub claimed_by: Option<PayoutId>,

    /// When the reward was accrued.
    pub created_at: DateTime<Utc>,

    /// When the reward was released, if it was.
    pub released_at: Option<DateTime<Utc>>,

    /// When the reward was voided, if it was.
    pub voided_at: Option<DateTime<Utc>>,
}

impl Reward {
    /// Accrue a registration credit reward.
    #[must_use]
    pub fn registration_credit(
        user_id: UserId,
        source_user_id: UserId,
        level: u8,
        amount_cents: i64,
        pending_until: DateTime<Utc>,
        source_event_id: String,
    ) -> Self {
        Self {
            id: RewardId::generate(),
            user_id,
            source_user_id,
            kind: RewardKind::RegistrationCredit,
            level,
            value: RewardValue::Credits { amount_cents },
            status: RewardStatus::Pending,
            pending_until,
            grace_end_at: None,
            subscription_id: None,
            source_event_id,
            claimed_by: None,
            created_at: Utc::now(),
            released_at: None,
            voided_at: None,
        }
    }

    /// Accrue a subscription commission reward.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn subscription_commission(
        user_id: UserId,
        source_user_id: UserId,
        level: u8,
        amount_cents: i64,
        currency: String,
        subscription_id: String,
        pending_until: DateTime<Utc>,
        source_event_id: String,
    ) -> Self {
        Self {
            id: RewardId::generate(),
            user_id,
            source_user_id,
            kind: RewardKind::SubscriptionCommission,
            level,
            value: RewardValue::Currency {
                amount_cents,
                currency,
            },
            status: RewardStatus::Pending,
            pending_until,
            grace_end_at: None,
            subscription_id: Some(subscription_id),
            source_event_id,
            claimed_by: None,
            created_at: Utc::now(),
            released_at: None,
            voided_at: None,
        }
    }

    /// Check whether this reward is released and not yet claimed by a payout.
    #[must_use]
    pub fn is_claimable(&self) -> bool {
        self.status == RewardStatus::Released && self.claimed_by.is_none()
    }

    /// Check whether the hold window has elapsed at `reference`.
    #[must_use]
    pub fn is_due(&self, reference: DateTime<Utc>) -> bool {
        self.status == RewardStatus::Pending && self.pending_until <= reference
    }

    /// Check whether a cancellation grace deadline has lapsed at `reference`.
    #[must_use]
    pub fn grace_lapsed(&self, reference: DateTime<Utc>) -> bool {
        self.status == RewardStatus::Pending
            && self.grace_end_at.is_some_and(|g| g <= reference)
    }
}
