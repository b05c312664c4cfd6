//! Key encoding utilities for `RocksDB`.
//!
//! Composite keys concatenate fixed-width id bytes so prefix scans stay
//! unambiguous; variable-length string components are terminated with a
//! `0x00` separator for the same reason.

use chrono::{DateTime, Utc};

use refledger_core::{AttributionId, EntryId, PayoutId, PromotionId, RewardId, UseId, UserId};

/// Separator after variable-length string key components.
const SEP: u8 = 0x00;

/// Key for a referral code.
#[must_use]
pub fn referral_code_key(code: &str) -> Vec<u8> {
    code.as_bytes().to_vec()
}

/// Key for an attribution row.
#[must_use]
pub fn attribution_key(id: &AttributionId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Chain index key: `referee_id (16) || level (1)`.
#[must_use]
pub fn referee_level_key(referee_id: &UserId, level: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(17);
    key.extend_from_slice(referee_id.as_bytes());
    key.push(level);
    key
}

/// Prefix for a referee's whole chain.
#[must_use]
pub fn referee_prefix(referee_id: &UserId) -> Vec<u8> {
    referee_id.as_bytes().to_vec()
}

/// Key for a reward row.
#[must_use]
pub fn reward_key(id: &RewardId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Idempotency index key:
/// `source_event_id || 0x00 || user_id (16) || level (1)`.
#[must_use]
pub fn event_reward_key(source_event_id: &str, user_id: &UserId, level: u8) -> Vec<u8> {
    let mut key = Vec::with_capacity(source_event_id.len() + 18);
    key.extend_from_slice(source_event_id.as_bytes());
    key.push(SEP);
    key.extend_from_slice(user_id.as_bytes());
    key.push(level);
    key
}

/// Prefix covering every reward accrued by one source event.
#[must_use]
pub fn event_prefix(source_event_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(source_event_id.len() + 1);
    key.extend_from_slice(source_event_id.as_bytes());
    key.push(SEP);
    key
}

/// Owner index key: `user_id (16) || reward_id (16)`.
#[must_use]
pub fn user_reward_key(user_id: &UserId, reward_id: &RewardId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&reward_id.to_bytes());
    key
}

/// Prefix for all of a user's rewards.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Due index key: `due_millis (8 BE) || reward_id (16)`.
///
/// Big-endian millis make the index iterate in deadline order.
#[must_use]
pub fn pending_due_key(due: DateTime<Utc>, reward_id: &RewardId) -> Vec<u8> {
    let millis = u64::try_from(due.timestamp_millis()).unwrap_or(0);
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(&millis.to_be_bytes());
    key.extend_from_slice(&reward_id.to_bytes());
    key
}

/// Extract the reward id from a due index key.
///
/// # Panics
///
/// Panics if the key is not at least 24 bytes.
#[must_use]
pub fn reward_id_from_due_key(key: &[u8]) -> RewardId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[8..24]);
    RewardId::from_bytes(bytes)
}

/// Subscription index key: `subscription_id || 0x00 || reward_id (16)`.
#[must_use]
pub fn subscription_reward_key(subscription_id: &str, reward_id: &RewardId) -> Vec<u8> {
    let mut key = Vec::with_capacity(subscription_id.len() + 17);
    key.extend_from_slice(subscription_id.as_bytes());
    key.push(SEP);
    key.extend_from_slice(&reward_id.to_bytes());
    key
}

/// Prefix for all rewards tied to one subscription.
#[must_use]
pub fn subscription_prefix(subscription_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(subscription_id.len() + 1);
    key.extend_from_slice(subscription_id.as_bytes());
    key.push(SEP);
    key
}

/// Extract the reward id from a subscription index key.
///
/// # Panics
///
/// Panics if the key is shorter than 16 bytes.
#[must_use]
pub fn reward_id_from_subscription_key(key: &[u8]) -> RewardId {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[key.len() - 16..]);
    RewardId::from_bytes(bytes)
}

/// Key for a payout row.
#[must_use]
pub fn payout_key(id: &PayoutId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Payout owner index key: `user_id (16) || payout_id (16)`.
#[must_use]
pub fn user_payout_key(user_id: &UserId, payout_id: &PayoutId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&payout_id.to_bytes());
    key
}

/// Key for a promotion row.
#[must_use]
pub fn promotion_key(id: &PromotionId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Key for the code→promotion lookup.
#[must_use]
pub fn promotion_code_key(code: &str) -> Vec<u8> {
    code.as_bytes().to_vec()
}

/// Key for a promotion use row.
#[must_use]
pub fn promotion_use_key(id: &UseId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Cap-count index key: `promotion_id (16) || user_id (16) || use_id (16)`.
#[must_use]
pub fn promotion_use_index_key(
    promotion_id: &PromotionId,
    user_id: &UserId,
    use_id: &UseId,
) -> Vec<u8> {
    let mut key = Vec::with_capacity(48);
    key.extend_from_slice(&promotion_id.to_bytes());
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&use_id.to_bytes());
    key
}

/// Prefix covering every use of a promotion.
#[must_use]
pub fn promotion_uses_prefix(promotion_id: &PromotionId) -> Vec<u8> {
    promotion_id.to_bytes().to_vec()
}

/// Prefix covering one user's uses of a promotion.
#[must_use]
pub fn promotion_user_uses_prefix(promotion_id: &PromotionId, user_id: &UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(&promotion_id.to_bytes());
    key.extend_from_slice(user_id.as_bytes());
    key
}

/// Key for an account record.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Key for a ledger entry.
#[must_use]
pub fn ledger_key(id: &EntryId) -> Vec<u8> {
    id.to_bytes().to_vec()
}

/// Ledger owner index key: `user_id (16) || entry_id (16)`.
#[must_use]
pub fn user_ledger_key(user_id: &UserId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Extract the trailing 16-byte ULID from a `user || ulid` index key.
///
/// # Panics
///
/// Panics if the key is not at least 32 bytes.
#[must_use]
pub fn ulid_bytes_from_user_key(key: &[u8]) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[16..32]);
    bytes
}
