//! Credit/currency ledger types.
//!
//! [`Account`] holds a user's spendable credit balance; every change to it
//! appends a [`LedgerEntry`]. Currency commission balance is not stored here
//! at all — it stays derived from released, unclaimed rewards — but released
//! commissions and settled payouts still append entries so the audit trail
//! covers both denominations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{EntryId, PayoutId, PromotionId, RewardId, UserId};

/// A user's spendable credit balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The account owner.
    pub user_id: UserId,

    /// Current spendable credit balance, in credit cents.
    pub credit_cents: i64,

    /// Lifetime credits earned from released rewards.
    pub lifetime_reward_cents: i64,

    /// Lifetime credits granted by bonus promotions.
    pub lifetime_bonus_cents: i64,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            credit_cents: 0,
            lifetime_reward_cents: 0,
            lifetime_bonus_cents: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What caused a ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum EntryKind {
    /// A held reward matured into balance.
    RewardReleased {
        /// The released reward.
        reward_id: RewardId,
    },

    /// A bonus-credit promotion was applied.
    PromotionBonus {
        /// The applied promotion.
        promotion_id: PromotionId,
    },

    /// A payout was settled by the external rail.
    PayoutPaid {
        /// The settled payout.
        payout_id: PayoutId,
    },
}

/// One append-only ledger record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The user whose balance the entry concerns.
    pub user_id: UserId,

    /// Signed amount in minor units. Positive = accrual to the user.
    pub amount_cents: i64,

    /// Currency code for currency-denominated entries; `None` for credits.
    pub currency: Option<String>,

    /// What caused the entry.
    pub kind: EntryKind,

    /// Credit balance after the entry, for credit-denominated entries.
    /// Currency balances are derived, so currency entries carry `None`.
    pub balance_after_cents: Option<i64>,

    /// Human-readable description.
    pub description: String,

    /// When the entry was written.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Entry for a released credit reward.
    #[must_use]
    pub fn credit_reward_released(
        user_id: UserId,
        reward_id: RewardId,
        amount_cents: i64,
        balance_after_cents: i64,
        level: u8,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            amount_cents,
            currency: None,
            kind: EntryKind::RewardReleased { reward_id },
            balance_after_cents: Some(balance_after_cents),
            description: format!("Referral credit released (level {level})"),
            created_at: Utc::now(),
        }
    }

    /// Entry for a released currency commission.
    #[must_use]
    pub fn commission_released(
        user_id: UserId,
        reward_id: RewardId,
        amount_cents: i64,
        currency: String,
        level: u8,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            amount_cents,
            currency: Some(currency),
            kind: EntryKind::RewardReleased { reward_id },
            balance_after_cents: None,
            description: format!("Commission released (level {level})"),
            created_at: Utc::now(),
        }
    }

    /// Entry for an applied bonus-credit promotion.
    #[must_use]
    pub fn promotion_bonus(
        user_id: UserId,
        promotion_id: PromotionId,
        amount_cents: i64,
        balance_after_cents: i64,
        code: &str,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            amount_cents,
            currency: None,
            kind: EntryKind::PromotionBonus { promotion_id },
            balance_after_cents: Some(balance_after_cents),
            description: format!("Bonus credits for promotion {code}"),
            created_at: Utc::now(),
        }
    }

    /// Entry for a settled payout. Negative: the obligation left the ledger.
    #[must_use]
    pub fn payout_paid(
        user_id: UserId,
        payout_id: PayoutId,
        amount_cents: i64,
        currency: String,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            user_id,
            amount_cents: -amount_cents.abs(),
            currency: Some(currency),
            kind: EntryKind::PayoutPaid { payout_id },
            balance_after_cents: None,
            description: "Payout settled".into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_zero_balance() {
        let account = Account::new(UserId::generate());
        assert_eq!(account.credit_cents, 0);
        assert_eq!(account.lifetime_reward_cents, 0);
        assert_eq!(account.lifetime_bonus_cents, 0);
    }

    #[test]
    fn payout_entry_is_negative() {
        let entry = LedgerEntry::payout_paid(
            UserId::generate(),
            PayoutId::generate(),
            5000,
            "EUR".into(),
        );
        assert_eq!(entry.amount_cents, -5000);
        assert_eq!(entry.currency.as_deref(), Some("EUR"));
        assert!(entry.balance_after_cents.is_none());
    }

    #[test]
    fn credit_entries_carry_balance_after() {
        let entry = LedgerEntry::credit_reward_released(
            UserId::generate(),
            RewardId::generate(),
            1000,
            1500,
            1,
        );
        assert_eq!(entry.balance_after_cents, Some(1500));
        assert!(entry.currency.is_none());
    }
}
