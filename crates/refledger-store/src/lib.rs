//! `RocksDB` storage layer for refledger.
//!
//! This crate provides persistent storage for attributions, rewards, payouts,
//! promotions, accounts, and the append-only ledger, using `RocksDB` column
//! families for indexing and CBOR value encoding.
//!
//! # Atomicity
//!
//! Every state transition the ledger depends on — idempotent reward accrual,
//! Pending→Released/Void, claim-for-payout, payout transitions, cap-checked
//! promotion uses — is a *compound operation* on the [`Store`] trait: a
//! read-check-write unit executed under the store's commit lock and flushed
//! as a single `WriteBatch`. Two concurrent callers therefore serialize on
//! the check, and a failed check never leaves a partial write behind.
//!
//! Plain reads take no lock.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};

use refledger_core::{
    Account, Attribution, AttributionId, LedgerEntry, Payout, PayoutAction, PayoutId, Promotion,
    PromotionId, PromotionUse, ReferralCode, Reward, RewardId, UserId,
};

/// Outcome of an idempotent accrual write.
#[derive(Debug, Clone)]
pub enum AccrualWrite {
    /// The event was new; these rewards were written.
    Created(Vec<Reward>),

    /// The event was already processed; these are the existing rewards.
    Duplicate(Vec<Reward>),
}

impl AccrualWrite {
    /// The reward set, created or pre-existing.
    #[must_use]
    pub fn rewards(&self) -> &[Reward] {
        match self {
            Self::Created(rewards) | Self::Duplicate(rewards) => rewards,
        }
    }

    /// Whether this call created the rewards.
    #[must_use]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Outcome of applying a payout action.
#[derive(Debug, Clone)]
pub enum PayoutWrite {
    /// The transition happened in this call.
    Applied(Payout),

    /// The payout was already in the action's target state; nothing changed.
    AlreadyInTarget(Payout),
}

impl PayoutWrite {
    /// The payout after the call.
    #[must_use]
    pub fn payout(&self) -> &Payout {
        match self {
            Self::Applied(payout) | Self::AlreadyInTarget(payout) => payout,
        }
    }
}

/// The storage trait defining all database operations.
///
/// Abstracting the storage layer keeps the engine testable against any
/// backend that honors the compound-operation atomicity contract.
pub trait Store: Send + Sync {
    // =========================================================================
    // Referral Codes & Attribution
    // =========================================================================

    /// Register a referral code for a user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the code belongs to another
    /// user.
    fn put_referral_code(&self, code: &ReferralCode) -> Result<()>;

    /// Resolve a referral code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_referral_code(&self, code: &str) -> Result<Option<ReferralCode>>;

    /// Insert a referee's whole attribution chain atomically.
    ///
    /// All rows must share one referee. Nothing is written if the referee
    /// already has a level-1 attribution.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the referee is already
    /// attributed.
    fn insert_attribution_chain(&self, rows: &[Attribution]) -> Result<()>;

    /// A referee's attribution chain, level ascending. Includes voided rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn attribution_chain(&self, referee_id: &UserId) -> Result<Vec<Attribution>>;

    /// Get an attribution by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_attribution(&self, id: &AttributionId) -> Result<Option<Attribution>>;

    /// Soft-void an attribution. Returns `false` if it was already voided.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the attribution doesn't exist.
    fn void_attribution(&self, id: &AttributionId, at: DateTime<Utc>) -> Result<bool>;

    // =========================================================================
    // Rewards
    // =========================================================================

    /// Write an event's rewards, or return the existing set if the event was
    /// already processed. The check and the write are one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn insert_rewards_for_event(
        &self,
        source_event_id: &str,
        rewards: Vec<Reward>,
    ) -> Result<AccrualWrite>;

    /// Get a reward by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_reward(&self, id: &RewardId) -> Result<Option<Reward>>;

    /// All rewards accrued to a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn rewards_for_user(&self, user_id: &UserId) -> Result<Vec<Reward>>;

    /// All currently pending rewards, in hold-deadline order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn pending_rewards(&self) -> Result<Vec<Reward>>;

    /// Conditionally transition a reward Pending→Released, crediting the
    /// owner's account (credit rewards) and appending the ledger entry in the
    /// same batch. Returns `None` if the reward is no longer Pending — a
    /// concurrent release or void won the race.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the reward doesn't exist.
    fn release_reward(&self, id: &RewardId, now: DateTime<Utc>) -> Result<Option<Reward>>;

    /// Conditionally transition a reward Pending→Void. Returns `None` if the
    /// reward is no longer Pending (a released reward is never clawed back).
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the reward doesn't exist.
    fn void_reward(&self, id: &RewardId, now: DateTime<Utc>) -> Result<Option<Reward>>;

    /// Stamp a grace deadline on a subscription's still-pending rewards.
    /// Returns how many rewards were stamped.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn mark_subscription_grace(
        &self,
        subscription_id: &str,
        grace_end_at: DateTime<Utc>,
    ) -> Result<usize>;

    /// Clear grace deadlines on a subscription's still-pending rewards
    /// (a renewed payment arrived). Returns how many were cleared.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn clear_subscription_grace(&self, subscription_id: &str) -> Result<usize>;

    /// A user's released, unclaimed, currency-denominated rewards in the
    /// given currency.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn claimable_rewards(&self, user_id: &UserId, currency: &str) -> Result<Vec<Reward>>;

    // =========================================================================
    // Payouts
    // =========================================================================

    /// Atomically claim every claimable reward of the user in the given
    /// currency and create a Pending payout over them. Returns `None` if
    /// there is nothing to claim.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn create_payout(&self, user_id: &UserId, currency: &str) -> Result<Option<Payout>>;

    /// Get a payout by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_payout(&self, id: &PayoutId) -> Result<Option<Payout>>;

    /// A user's payouts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn payouts_for_user(&self, user_id: &UserId) -> Result<Vec<Payout>>;

    /// Apply an admin action to a payout: a conditional transition guarded by
    /// the current status. Re-applying an action whose target state the
    /// payout already holds is a no-op success. Rejection returns the claimed
    /// rewards to the unclaimed pool in the same batch; settlement appends
    /// the ledger entry in the same batch.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the payout doesn't exist.
    /// - `StoreError::InvalidTransition` if the current state matches
    ///   neither the action's precondition nor its target.
    fn apply_payout_action(
        &self,
        id: &PayoutId,
        action: &PayoutAction,
        now: DateTime<Utc>,
    ) -> Result<PayoutWrite>;

    // =========================================================================
    // Promotions
    // =========================================================================

    /// Create a promotion.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the code is taken.
    fn put_promotion(&self, promotion: &Promotion) -> Result<()>;

    /// Look a promotion up by code.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn promotion_by_code(&self, code: &str) -> Result<Option<Promotion>>;

    /// Flip a promotion's soft-disable switch.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the code doesn't resolve.
    fn set_promotion_active(&self, code: &str, active: bool) -> Result<()>;

    /// Committed uses of a promotion across all users.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn promotion_use_count(&self, promotion_id: &PromotionId) -> Result<u32>;

    /// Committed uses of a promotion by one user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn promotion_use_count_for_user(
        &self,
        promotion_id: &PromotionId,
        user_id: &UserId,
    ) -> Result<u32>;

    /// Commit one promotion use: recount both caps and insert the use as one
    /// atomic unit, so concurrent applies cannot jointly overrun a cap. For
    /// bonus-credit promotions the account credit and ledger entry land in
    /// the same batch.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::CapReached` if either cap is already met.
    fn record_promotion_use(&self, promotion: &Promotion, use_row: &PromotionUse) -> Result<()>;

    // =========================================================================
    // Accounts & Ledger
    // =========================================================================

    /// Get an account. Accounts are created lazily by the first credit.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// A user's ledger entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;
}
