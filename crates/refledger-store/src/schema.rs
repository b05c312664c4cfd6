//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Referral codes, keyed by the code string.
    pub const REFERRAL_CODES: &str = "referral_codes";

    /// Attribution rows, keyed by `attribution_id` (ULID).
    pub const ATTRIBUTIONS: &str = "attributions";

    /// Index: attribution chain per referee, keyed by `referee_id || level`.
    /// Value is the attribution id. Levels sort ascending, so a prefix scan
    /// yields the chain in order.
    pub const ATTRIBUTIONS_BY_REFEREE: &str = "attributions_by_referee";

    /// Reward rows, keyed by `reward_id` (ULID).
    pub const REWARDS: &str = "rewards";

    /// Idempotency index, keyed by
    /// `source_event_id || 0x00 || user_id || level`. Value is the reward id.
    /// One row per cell is the unique constraint that dedupes accrual.
    pub const REWARDS_BY_EVENT: &str = "rewards_by_event";

    /// Index: rewards by owner, keyed by `user_id || reward_id`.
    /// Value is empty (index only).
    pub const REWARDS_BY_USER: &str = "rewards_by_user";

    /// Index of pending rewards by hold deadline, keyed by
    /// `due_millis (8 bytes BE) || reward_id`. Entries are removed when the
    /// reward leaves Pending.
    pub const PENDING_BY_DUE: &str = "pending_by_due";

    /// Index: rewards per subscription, keyed by
    /// `subscription_id || 0x00 || reward_id`.
    pub const REWARDS_BY_SUBSCRIPTION: &str = "rewards_by_subscription";

    /// Payout rows, keyed by `payout_id` (ULID).
    pub const PAYOUTS: &str = "payouts";

    /// Index: payouts by user, keyed by `user_id || payout_id`.
    pub const PAYOUTS_BY_USER: &str = "payouts_by_user";

    /// Promotion rows, keyed by `promotion_id` (ULID).
    pub const PROMOTIONS: &str = "promotions";

    /// Code lookup, keyed by the code string. Value is the promotion id.
    pub const PROMOTION_CODES: &str = "promotion_codes";

    /// Committed promotion uses, keyed by `use_id` (ULID).
    pub const PROMOTION_USES: &str = "promotion_uses";

    /// Index for cap counting, keyed by
    /// `promotion_id || user_id || use_id`.
    pub const USES_BY_PROMOTION: &str = "uses_by_promotion";

    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger entries, keyed by `entry_id` (ULID).
    pub const LEDGER: &str = "ledger";

    /// Index: ledger entries by user, keyed by `user_id || entry_id`.
    pub const LEDGER_BY_USER: &str = "ledger_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::REFERRAL_CODES,
        cf::ATTRIBUTIONS,
        cf::ATTRIBUTIONS_BY_REFEREE,
        cf::REWARDS,
        cf::REWARDS_BY_EVENT,
        cf::REWARDS_BY_USER,
        cf::PENDING_BY_DUE,
        cf::REWARDS_BY_SUBSCRIPTION,
        cf::PAYOUTS,
        cf::PAYOUTS_BY_USER,
        cf::PROMOTIONS,
        cf::PROMOTION_CODES,
        cf::PROMOTION_USES,
        cf::USES_BY_PROMOTION,
        cf::ACCOUNTS,
        cf::LEDGER,
        cf::LEDGER_BY_USER,
    ]
}
