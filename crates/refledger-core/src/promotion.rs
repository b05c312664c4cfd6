//! Promotion types.
//!
//! A promotion code grants either an external payment-provider coupon
//! (attached at checkout, outside this subsystem) or an immediate bonus
//! credit grant. Usage caps are counted over committed [`PromotionUse`]
//! rows; the rows themselves are immutable once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PromotionId, UseId, UserId};

/// The discount a coupon promotion applies at the payment provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "discount_type", content = "value")]
pub enum Discount {
    /// Percentage off, 0..=100.
    Percent(u8),

    /// Fixed amount off, in minor units.
    AmountCents(i64),
}

/// What a promotion grants when applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum PromotionKind {
    /// A payment-provider coupon to attach at checkout. The use is only
    /// committed once the external payment confirms.
    StripeCoupon {
        /// The provider-side coupon identifier.
        coupon_id: String,
        /// The discount the coupon carries (for display/audit).
        discount: Discount,
    },

    /// An immediate bonus credit grant to the user's ledger.
    BonusCredits {
        /// Granted credits, in credit cents.
        amount_cents: i64,
    },
}

/// A promotional code with usage caps and a validity window.
///
/// Only `is_active` is mutated after creation; the hard fields stay immutable
/// so past redemptions keep their meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    /// Unique promotion ID (ULID for time-ordering).
    pub id: PromotionId,

    /// The redeemable code (unique).
    pub code: String,

    /// What applying the promotion grants.
    pub kind: PromotionKind,

    /// Global use cap across all users, if any.
    pub max_uses: Option<u32>,

    /// Per-user use cap.
    pub max_uses_per_user: u32,

    /// Start of the validity window.
    pub valid_from: DateTime<Utc>,

    /// End of the validity window, if bounded.
    pub valid_until: Option<DateTime<Utc>>,

    /// Soft-disable switch.
    pub is_active: bool,

    /// When the promotion was created.
    pub created_at: DateTime<Utc>,
}

impl Promotion {
    /// Create a new active promotion valid from now on.
    #[must_use]
    pub fn new(code: impl Into<String>, kind: PromotionKind, max_uses_per_user: u32) -> Self {
        let now = Utc::now();
        Self {
            id: PromotionId::generate(),
            code: code.into(),
            kind,
            max_uses: None,
            max_uses_per_user,
            valid_from: now,
            valid_until: None,
            is_active: true,
            created_at: now,
        }
    }

    /// Set a global use cap.
    #[must_use]
    pub const fn with_max_uses(mut self, max_uses: u32) -> Self {
        self.max_uses = Some(max_uses);
        self
    }

    /// Bound the validity window.
    #[must_use]
    pub fn with_window(
        mut self,
        valid_from: DateTime<Utc>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_from = valid_from;
        self.valid_until = valid_until;
        self
    }

    /// Check whether `reference` falls inside the validity window.
    #[must_use]
    pub fn in_window(&self, reference: DateTime<Utc>) -> bool {
        reference >= self.valid_from && self.valid_until.map_or(true, |until| reference <= until)
    }
}

/// One committed redemption of a promotion by a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionUse {
    /// Unique use ID (ULID for time-ordering).
    pub id: UseId,

    /// The redeemed promotion.
    pub promotion_id: PromotionId,

    /// The redeeming user.
    pub user_id: UserId,

    /// The confirmed external payment, for coupon promotions.
    pub payment_id: Option<String>,

    /// When the use was committed.
    pub applied_at: DateTime<Utc>,
}

impl PromotionUse {
    /// Record a redemption.
    #[must_use]
    pub fn new(promotion_id: PromotionId, user_id: UserId, payment_id: Option<String>) -> Self {
        Self {
            id: UseId::generate(),
            promotion_id,
            user_id,
            payment_id,
            applied_at: Utc::now(),
        }
    }
}
