//! `RocksDB` storage implementation.
//!
//! Compound operations take the commit lock, perform their checks against
//! current state, and flush all writes as one `WriteBatch`. The lock is what
//! turns each read-check-write into the single atomic unit the ledger's
//! invariants require; plain reads bypass it.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode, Options,
    WriteBatch,
};

use refledger_core::{
    Account, Attribution, AttributionId, LedgerEntry, Payout, PayoutAction, PayoutId, Promotion,
    PromotionId, PromotionKind, PromotionUse, ReferralCode, Reward, RewardId, RewardStatus,
    RewardValue, UserId,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{AccrualWrite, PayoutWrite, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<rocksdb::MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Take the commit lock for a compound operation.
    fn commit_guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("commit lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    /// Read and decode one value.
    fn get_value<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        key: &[u8],
    ) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Collect all `(key, value)` pairs under a prefix.
    fn prefix_scan(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let cf = self.cf(cf_name)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward));

        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Count keys under a prefix.
    fn prefix_count(&self, cf_name: &str, prefix: &[u8]) -> Result<u32> {
        let entries = self.prefix_scan(cf_name, prefix)?;
        Ok(u32::try_from(entries.len()).unwrap_or(u32::MAX))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Load a user's account, or a fresh zero-balance one.
    fn account_or_new(&self, user_id: &UserId) -> Result<Account> {
        Ok(self
            .get_value::<Account>(cf::ACCOUNTS, &keys::account_key(user_id))?
            .unwrap_or_else(|| Account::new(*user_id)))
    }

    /// Stage an account write plus its ledger entry into `batch`.
    fn stage_ledger_write(
        &self,
        batch: &mut WriteBatch,
        account: Option<&Account>,
        entry: &LedgerEntry,
    ) -> Result<()> {
        if let Some(account) = account {
            let cf_accounts = self.cf(cf::ACCOUNTS)?;
            batch.put_cf(
                &cf_accounts,
                keys::account_key(&account.user_id),
                Self::serialize(account)?,
            );
        }

        let cf_ledger = self.cf(cf::LEDGER)?;
        let cf_ledger_by_user = self.cf(cf::LEDGER_BY_USER)?;
        batch.put_cf(&cf_ledger, keys::ledger_key(&entry.id), Self::serialize(entry)?);
        batch.put_cf(
            &cf_ledger_by_user,
            keys::user_ledger_key(&entry.user_id, &entry.id),
            b"",
        );
        Ok(())
    }

    /// Stage a reward row plus all of its index entries.
    fn stage_reward_insert(&self, batch: &mut WriteBatch, reward: &Reward) -> Result<()> {
        let cf_rewards = self.cf(cf::REWARDS)?;
        let cf_by_event = self.cf(cf::REWARDS_BY_EVENT)?;
        let cf_by_user = self.cf(cf::REWARDS_BY_USER)?;
        let cf_pending = self.cf(cf::PENDING_BY_DUE)?;

        batch.put_cf(&cf_rewards, keys::reward_key(&reward.id), Self::serialize(reward)?);
        batch.put_cf(
            &cf_by_event,
            keys::event_reward_key(&reward.source_event_id, &reward.user_id, reward.level),
            reward.id.to_bytes(),
        );
        batch.put_cf(
            &cf_by_user,
            keys::user_reward_key(&reward.user_id, &reward.id),
            b"",
        );
        batch.put_cf(
            &cf_pending,
            keys::pending_due_key(reward.pending_until, &reward.id),
            b"",
        );

        if let Some(subscription_id) = &reward.subscription_id {
            let cf_sub = self.cf(cf::REWARDS_BY_SUBSCRIPTION)?;
            batch.put_cf(
                &cf_sub,
                keys::subscription_reward_key(subscription_id, &reward.id),
                b"",
            );
        }
        Ok(())
    }

    /// Load the rewards a subscription's index points at.
    fn subscription_rewards(&self, subscription_id: &str) -> Result<Vec<Reward>> {
        let entries = self.prefix_scan(
            cf::REWARDS_BY_SUBSCRIPTION,
            &keys::subscription_prefix(subscription_id),
        )?;

        let mut rewards = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            let id = keys::reward_id_from_subscription_key(&key);
            if let Some(reward) = self.get_reward(&id)? {
                rewards.push(reward);
            }
        }
        Ok(rewards)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Referral Codes & Attribution
    // =========================================================================

    fn put_referral_code(&self, code: &ReferralCode) -> Result<()> {
        let _guard = self.commit_guard()?;

        if let Some(existing) =
            self.get_value::<ReferralCode>(cf::REFERRAL_CODES, &keys::referral_code_key(&code.code))?
        {
            if existing.owner_id != code.owner_id {
                return Err(StoreError::AlreadyExists {
                    entity: "referral code",
                    id: code.code.clone(),
                });
            }
            return Ok(()); // Re-registering your own code is a no-op.
        }

        let cf = self.cf(cf::REFERRAL_CODES)?;
        self.db
            .put_cf(&cf, keys::referral_code_key(&code.code), Self::serialize(code)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn get_referral_code(&self, code: &str) -> Result<Option<ReferralCode>> {
        self.get_value(cf::REFERRAL_CODES, &keys::referral_code_key(code))
    }

    fn insert_attribution_chain(&self, rows: &[Attribution]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let referee_id = first.referee_id;

        let _guard = self.commit_guard()?;

        let cf_by_referee = self.cf(cf::ATTRIBUTIONS_BY_REFEREE)?;
        let direct_key = keys::referee_level_key(&referee_id, 1);
        let existing = self
            .db
            .get_cf(&cf_by_referee, &direct_key)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if existing.is_some() {
            return Err(StoreError::AlreadyExists {
                entity: "attribution",
                id: referee_id.to_string(),
            });
        }

        let cf_attributions = self.cf(cf::ATTRIBUTIONS)?;
        let mut batch = WriteBatch::default();
        for row in rows {
            batch.put_cf(
                &cf_attributions,
                keys::attribution_key(&row.id),
                Self::serialize(row)?,
            );
            batch.put_cf(
                &cf_by_referee,
                keys::referee_level_key(&row.referee_id, row.level),
                row.id.to_bytes(),
            );
        }
        self.write(batch)
    }

    fn attribution_chain(&self, referee_id: &UserId) -> Result<Vec<Attribution>> {
        let entries =
            self.prefix_scan(cf::ATTRIBUTIONS_BY_REFEREE, &keys::referee_prefix(referee_id))?;

        let mut chain = Vec::with_capacity(entries.len());
        for (_, value) in entries {
            let mut bytes = [0u8; 16];
            if value.len() != 16 {
                return Err(StoreError::Serialization(
                    "malformed attribution index value".into(),
                ));
            }
            bytes.copy_from_slice(&value);
            let id = AttributionId::from_bytes(bytes);
            if let Some(attribution) = self.get_attribution(&id)? {
                chain.push(attribution);
            }
        }
        Ok(chain)
    }

    fn get_attribution(&self, id: &AttributionId) -> Result<Option<Attribution>> {
        self.get_value(cf::ATTRIBUTIONS, &keys::attribution_key(id))
    }

    fn void_attribution(&self, id: &AttributionId, at: DateTime<Utc>) -> Result<bool> {
        let _guard = self.commit_guard()?;

        let mut attribution =
            self.get_attribution(id)?
                .ok_or_else(|| StoreError::NotFound {
                    entity: "attribution",
                    id: id.to_string(),
                })?;

        if attribution.is_voided() {
            return Ok(false);
        }
        attribution.voided_at = Some(at);

        let cf = self.cf(cf::ATTRIBUTIONS)?;
        self.db
            .put_cf(&cf, keys::attribution_key(id), Self::serialize(&attribution)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(true)
    }

    // =========================================================================
    // Rewards
    // =========================================================================

    fn insert_rewards_for_event(
        &self,
        source_event_id: &str,
        rewards: Vec<Reward>,
    ) -> Result<AccrualWrite> {
        let _guard = self.commit_guard()?;

        let existing =
            self.prefix_scan(cf::REWARDS_BY_EVENT, &keys::event_prefix(source_event_id))?;
        if !existing.is_empty() {
            let mut found = Vec::with_capacity(existing.len());
            for (_, value) in existing {
                let mut bytes = [0u8; 16];
                if value.len() != 16 {
                    return Err(StoreError::Serialization(
                        "malformed reward index value".into(),
                    ));
                }
                bytes.copy_from_slice(&value);
                if let Some(reward) = self.get_reward(&RewardId::from_bytes(bytes))? {
                    found.push(reward);
                }
            }
            tracing::debug!(
                source_event_id,
                count = found.len(),
                "accrual skipped: event already processed"
            );
            return Ok(AccrualWrite::Duplicate(found));
        }

        let mut batch = WriteBatch::default();
        for reward in &rewards {
            self.stage_reward_insert(&mut batch, reward)?;
        }
        self.write(batch)?;
        Ok(AccrualWrite::Created(rewards))
    }

    fn get_reward(&self, id: &RewardId) -> Result<Option<Reward>> {
        self.get_value(cf::REWARDS, &keys::reward_key(id))
    }

    fn rewards_for_user(&self, user_id: &UserId) -> Result<Vec<Reward>> {
        let entries = self.prefix_scan(cf::REWARDS_BY_USER, &keys::user_prefix(user_id))?;

        let mut rewards = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            let id = RewardId::from_bytes(keys::ulid_bytes_from_user_key(&key));
            if let Some(reward) = self.get_reward(&id)? {
                rewards.push(reward);
            }
        }
        Ok(rewards)
    }

    fn pending_rewards(&self) -> Result<Vec<Reward>> {
        let entries = self.prefix_scan(cf::PENDING_BY_DUE, &[])?;

        let mut rewards = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            let id = keys::reward_id_from_due_key(&key);
            if let Some(reward) = self.get_reward(&id)? {
                rewards.push(reward);
            }
        }
        Ok(rewards)
    }

    fn release_reward(&self, id: &RewardId, now: DateTime<Utc>) -> Result<Option<Reward>> {
        let _guard = self.commit_guard()?;

        let mut reward = self.get_reward(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "reward",
            id: id.to_string(),
        })?;

        if reward.status != RewardStatus::Pending {
            return Ok(None);
        }

        reward.status = RewardStatus::Released;
        reward.released_at = Some(now);

        let mut batch = WriteBatch::default();
        let cf_rewards = self.cf(cf::REWARDS)?;
        let cf_pending = self.cf(cf::PENDING_BY_DUE)?;
        batch.put_cf(&cf_rewards, keys::reward_key(id), Self::serialize(&reward)?);
        batch.delete_cf(&cf_pending, keys::pending_due_key(reward.pending_until, id));

        // Releasing is the single moment the amount enters the balance, so
        // the ledger write rides the same batch as the status flip.
        match &reward.value {
            RewardValue::Credits { amount_cents } => {
                let mut account = self.account_or_new(&reward.user_id)?;
                account.credit_cents += amount_cents;
                account.lifetime_reward_cents += amount_cents;
                account.updated_at = now;

                let entry = LedgerEntry::credit_reward_released(
                    reward.user_id,
                    reward.id,
                    *amount_cents,
                    account.credit_cents,
                    reward.level,
                );
                self.stage_ledger_write(&mut batch, Some(&account), &entry)?;
            }
            RewardValue::Currency {
                amount_cents,
                currency,
            } => {
                let entry = LedgerEntry::commission_released(
                    reward.user_id,
                    reward.id,
                    *amount_cents,
                    currency.clone(),
                    reward.level,
                );
                self.stage_ledger_write(&mut batch, None, &entry)?;
            }
        }

        self.write(batch)?;
        Ok(Some(reward))
    }

    fn void_reward(&self, id: &RewardId, now: DateTime<Utc>) -> Result<Option<Reward>> {
        let _guard = self.commit_guard()?;

        let mut reward = self.get_reward(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "reward",
            id: id.to_string(),
        })?;

        if reward.status != RewardStatus::Pending {
            return Ok(None);
        }

        reward.status = RewardStatus::Void;
        reward.voided_at = Some(now);

        let mut batch = WriteBatch::default();
        let cf_rewards = self.cf(cf::REWARDS)?;
        let cf_pending = self.cf(cf::PENDING_BY_DUE)?;
        batch.put_cf(&cf_rewards, keys::reward_key(id), Self::serialize(&reward)?);
        batch.delete_cf(&cf_pending, keys::pending_due_key(reward.pending_until, id));
        self.write(batch)?;
        Ok(Some(reward))
    }

    fn mark_subscription_grace(
        &self,
        subscription_id: &str,
        grace_end_at: DateTime<Utc>,
    ) -> Result<usize> {
        let _guard = self.commit_guard()?;

        let cf_rewards = self.cf(cf::REWARDS)?;
        let mut batch = WriteBatch::default();
        let mut stamped = 0;

        for mut reward in self.subscription_rewards(subscription_id)? {
            if reward.status != RewardStatus::Pending || reward.grace_end_at.is_some() {
                continue;
            }
            reward.grace_end_at = Some(grace_end_at);
            batch.put_cf(
                &cf_rewards,
                keys::reward_key(&reward.id),
                Self::serialize(&reward)?,
            );
            stamped += 1;
        }

        if stamped > 0 {
            self.write(batch)?;
        }
        Ok(stamped)
    }

    fn clear_subscription_grace(&self, subscription_id: &str) -> Result<usize> {
        let _guard = self.commit_guard()?;

        let cf_rewards = self.cf(cf::REWARDS)?;
        let mut batch = WriteBatch::default();
        let mut cleared = 0;

        for mut reward in self.subscription_rewards(subscription_id)? {
            if reward.status != RewardStatus::Pending || reward.grace_end_at.is_none() {
                continue;
            }
            reward.grace_end_at = None;
            batch.put_cf(
                &cf_rewards,
                keys::reward_key(&reward.id),
                Self::serialize(&reward)?,
            );
            cleared += 1;
        }

        if cleared > 0 {
            self.write(batch)?;
        }
        Ok(cleared)
    }

    fn claimable_rewards(&self, user_id: &UserId, currency: &str) -> Result<Vec<Reward>> {
        let rewards = self.rewards_for_user(user_id)?;
        Ok(rewards
            .into_iter()
            .filter(|r| r.is_claimable() && r.value.currency() == Some(currency))
            .collect())
    }

    // =========================================================================
    // Payouts
    // =========================================================================

    fn create_payout(&self, user_id: &UserId, currency: &str) -> Result<Option<Payout>> {
        let _guard = self.commit_guard()?;

        let claimable = self.claimable_rewards(user_id, currency)?;
        if claimable.is_empty() {
            return Ok(None);
        }

        let total: i64 = claimable.iter().map(|r| r.value.amount_cents()).sum();
        let reward_ids: Vec<RewardId> = claimable.iter().map(|r| r.id).collect();
        let payout = Payout::new(*user_id, reward_ids, total, currency.to_string());

        let cf_rewards = self.cf(cf::REWARDS)?;
        let cf_payouts = self.cf(cf::PAYOUTS)?;
        let cf_by_user = self.cf(cf::PAYOUTS_BY_USER)?;

        let mut batch = WriteBatch::default();
        for mut reward in claimable {
            reward.claimed_by = Some(payout.id);
            batch.put_cf(
                &cf_rewards,
                keys::reward_key(&reward.id),
                Self::serialize(&reward)?,
            );
        }
        batch.put_cf(&cf_payouts, keys::payout_key(&payout.id), Self::serialize(&payout)?);
        batch.put_cf(&cf_by_user, keys::user_payout_key(user_id, &payout.id), b"");

        self.write(batch)?;
        Ok(Some(payout))
    }

    fn get_payout(&self, id: &PayoutId) -> Result<Option<Payout>> {
        self.get_value(cf::PAYOUTS, &keys::payout_key(id))
    }

    fn payouts_for_user(&self, user_id: &UserId) -> Result<Vec<Payout>> {
        let entries = self.prefix_scan(cf::PAYOUTS_BY_USER, &keys::user_prefix(user_id))?;

        let mut payouts = Vec::with_capacity(entries.len());
        for (key, _) in entries {
            let id = PayoutId::from_bytes(keys::ulid_bytes_from_user_key(&key));
            if let Some(payout) = self.get_payout(&id)? {
                payouts.push(payout);
            }
        }
        Ok(payouts)
    }

    fn apply_payout_action(
        &self,
        id: &PayoutId,
        action: &PayoutAction,
        now: DateTime<Utc>,
    ) -> Result<PayoutWrite> {
        let _guard = self.commit_guard()?;

        let mut payout = self.get_payout(id)?.ok_or_else(|| StoreError::NotFound {
            entity: "payout",
            id: id.to_string(),
        })?;

        // Repeating an identical admin request is a no-op success.
        if payout.status == action.target() {
            return Ok(PayoutWrite::AlreadyInTarget(payout));
        }
        if payout.status != action.expected_from() {
            return Err(StoreError::InvalidTransition {
                from: payout.status,
                to: action.target(),
            });
        }

        payout.apply(action, now);

        let cf_payouts = self.cf(cf::PAYOUTS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_payouts, keys::payout_key(id), Self::serialize(&payout)?);

        match action {
            PayoutAction::Reject { .. } => {
                // Return the claimed rewards so the user can request again.
                let cf_rewards = self.cf(cf::REWARDS)?;
                for reward_id in &payout.reward_ids {
                    let Some(mut reward) = self.get_reward(reward_id)? else {
                        continue;
                    };
                    if reward.claimed_by == Some(payout.id) {
                        reward.claimed_by = None;
                        batch.put_cf(
                            &cf_rewards,
                            keys::reward_key(reward_id),
                            Self::serialize(&reward)?,
                        );
                    }
                }
            }
            PayoutAction::MarkPaid { .. } => {
                let entry = LedgerEntry::payout_paid(
                    payout.user_id,
                    payout.id,
                    payout.total_amount_cents,
                    payout.currency.clone(),
                );
                self.stage_ledger_write(&mut batch, None, &entry)?;
            }
            PayoutAction::Approve { .. } => {}
        }

        self.write(batch)?;
        Ok(PayoutWrite::Applied(payout))
    }

    // =========================================================================
    // Promotions
    // =========================================================================

    fn put_promotion(&self, promotion: &Promotion) -> Result<()> {
        let _guard = self.commit_guard()?;

        let cf_codes = self.cf(cf::PROMOTION_CODES)?;
        let taken = self
            .db
            .get_cf(&cf_codes, keys::promotion_code_key(&promotion.code))
            .map_err(|e| StoreError::Database(e.to_string()))?;
        if let Some(existing_id) = taken {
            if existing_id.as_slice() != promotion.id.to_bytes() {
                return Err(StoreError::AlreadyExists {
                    entity: "promotion",
                    id: promotion.code.clone(),
                });
            }
        }

        let cf_promotions = self.cf(cf::PROMOTIONS)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_promotions,
            keys::promotion_key(&promotion.id),
            Self::serialize(promotion)?,
        );
        batch.put_cf(
            &cf_codes,
            keys::promotion_code_key(&promotion.code),
            promotion.id.to_bytes(),
        );
        self.write(batch)
    }

    fn promotion_by_code(&self, code: &str) -> Result<Option<Promotion>> {
        let cf_codes = self.cf(cf::PROMOTION_CODES)?;
        let Some(id_bytes) = self
            .db
            .get_cf(&cf_codes, keys::promotion_code_key(code))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let mut bytes = [0u8; 16];
        if id_bytes.len() != 16 {
            return Err(StoreError::Serialization(
                "malformed promotion code index value".into(),
            ));
        }
        bytes.copy_from_slice(&id_bytes);
        self.get_value(cf::PROMOTIONS, &keys::promotion_key(&PromotionId::from_bytes(bytes)))
    }

    fn set_promotion_active(&self, code: &str, active: bool) -> Result<()> {
        let _guard = self.commit_guard()?;

        let mut promotion = self
            .promotion_by_code(code)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "promotion",
                id: code.to_string(),
            })?;
        promotion.is_active = active;

        let cf_promotions = self.cf(cf::PROMOTIONS)?;
        self.db
            .put_cf(
                &cf_promotions,
                keys::promotion_key(&promotion.id),
                Self::serialize(&promotion)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn promotion_use_count(&self, promotion_id: &PromotionId) -> Result<u32> {
        self.prefix_count(cf::USES_BY_PROMOTION, &keys::promotion_uses_prefix(promotion_id))
    }

    fn promotion_use_count_for_user(
        &self,
        promotion_id: &PromotionId,
        user_id: &UserId,
    ) -> Result<u32> {
        self.prefix_count(
            cf::USES_BY_PROMOTION,
            &keys::promotion_user_uses_prefix(promotion_id, user_id),
        )
    }

    fn record_promotion_use(&self, promotion: &Promotion, use_row: &PromotionUse) -> Result<()> {
        let _guard = self.commit_guard()?;

        // Recount under the lock: this is the check concurrent applies
        // serialize on, so caps can never be jointly overrun.
        if let Some(max_uses) = promotion.max_uses {
            if self.promotion_use_count(&promotion.id)? >= max_uses {
                return Err(StoreError::CapReached {
                    code: promotion.code.clone(),
                    per_user: false,
                });
            }
        }
        if self.promotion_use_count_for_user(&promotion.id, &use_row.user_id)?
            >= promotion.max_uses_per_user
        {
            return Err(StoreError::CapReached {
                code: promotion.code.clone(),
                per_user: true,
            });
        }

        let cf_uses = self.cf(cf::PROMOTION_USES)?;
        let cf_index = self.cf(cf::USES_BY_PROMOTION)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &cf_uses,
            keys::promotion_use_key(&use_row.id),
            Self::serialize(use_row)?,
        );
        batch.put_cf(
            &cf_index,
            keys::promotion_use_index_key(&promotion.id, &use_row.user_id, &use_row.id),
            b"",
        );

        if let PromotionKind::BonusCredits { amount_cents } = &promotion.kind {
            let mut account = self.account_or_new(&use_row.user_id)?;
            account.credit_cents += amount_cents;
            account.lifetime_bonus_cents += amount_cents;
            account.updated_at = use_row.applied_at;

            let entry = LedgerEntry::promotion_bonus(
                use_row.user_id,
                promotion.id,
                *amount_cents,
                account.credit_cents,
                &promotion.code,
            );
            self.stage_ledger_write(&mut batch, Some(&account), &entry)?;
        }

        self.write(batch)
    }

    // =========================================================================
    // Accounts & Ledger
    // =========================================================================

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn ledger_entries(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let mut entries = self.prefix_scan(cf::LEDGER_BY_USER, &keys::user_prefix(user_id))?;
        entries.reverse(); // ULIDs are time-ordered, so reversed = newest first.

        let mut out = Vec::new();
        for (key, _) in entries.into_iter().skip(offset).take(limit) {
            let id = refledger_core::EntryId::from_bytes(keys::ulid_bytes_from_user_key(&key));
            if let Some(entry) = self.get_value(cf::LEDGER, &keys::ledger_key(&id))? {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    use refledger_core::{PayoutStatus, Promotion, PromotionKind};

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn pending_commission(user: UserId, event: &str, sub: &str, cents: i64) -> Reward {
        Reward::subscription_commission(
            user,
            UserId::generate(),
            1,
            cents,
            "EUR".into(),
            sub.into(),
            Utc::now() - Duration::days(1), // already due
            event.into(),
        )
    }

    #[test]
    fn attribution_chain_is_write_once() {
        let (store, _dir) = create_test_store();
        let referee = UserId::generate();
        let referrer = UserId::generate();
        let grand = UserId::generate();

        let rows = vec![
            Attribution::new(referrer, referee, 1, "CODE".into()),
            Attribution::new(grand, referee, 2, "CODE".into()),
        ];
        store.insert_attribution_chain(&rows).unwrap();

        let chain = store.attribution_chain(&referee).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].level, 1);
        assert_eq!(chain[0].referrer_id, referrer);
        assert_eq!(chain[1].level, 2);

        let again = vec![Attribution::new(grand, referee, 1, "OTHER".into())];
        let err = store.insert_attribution_chain(&again).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn referral_code_uniqueness() {
        let (store, _dir) = create_test_store();
        let owner = UserId::generate();
        store
            .put_referral_code(&ReferralCode::new(owner, "FRIEND"))
            .unwrap();
        // Same owner re-registering is fine.
        store
            .put_referral_code(&ReferralCode::new(owner, "FRIEND"))
            .unwrap();
        // A different owner is not.
        let err = store
            .put_referral_code(&ReferralCode::new(UserId::generate(), "FRIEND"))
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));
    }

    #[test]
    fn accrual_is_idempotent_per_event() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();

        let first = store
            .insert_rewards_for_event("evt_1", vec![pending_commission(user, "evt_1", "sub", 100)])
            .unwrap();
        assert!(first.is_created());

        let second = store
            .insert_rewards_for_event("evt_1", vec![pending_commission(user, "evt_1", "sub", 999)])
            .unwrap();
        assert!(!second.is_created());
        assert_eq!(second.rewards().len(), 1);
        assert_eq!(second.rewards()[0].value.amount_cents(), 100);

        // Similar event ids do not collide through the prefix index.
        let other = store
            .insert_rewards_for_event(
                "evt_10",
                vec![pending_commission(user, "evt_10", "sub", 50)],
            )
            .unwrap();
        assert!(other.is_created());
    }

    #[test]
    fn release_is_conditional_and_credits_once() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let reward = Reward::registration_credit(
            user,
            UserId::generate(),
            1,
            1000,
            Utc::now() - Duration::days(1),
            "evt_reg".into(),
        );
        let id = reward.id;
        store.insert_rewards_for_event("evt_reg", vec![reward]).unwrap();

        let released = store.release_reward(&id, Utc::now()).unwrap().unwrap();
        assert_eq!(released.status, RewardStatus::Released);

        // Second release is a no-op: the guard sees Released.
        assert!(store.release_reward(&id, Utc::now()).unwrap().is_none());
        // Voiding after release is also refused.
        assert!(store.void_reward(&id, Utc::now()).unwrap().is_none());

        let account = store.get_account(&user).unwrap().unwrap();
        assert_eq!(account.credit_cents, 1000);
        assert_eq!(account.lifetime_reward_cents, 1000);

        let entries = store.ledger_entries(&user, 10, 0).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].balance_after_cents, Some(1000));

        // The due index no longer carries the reward.
        assert!(store.pending_rewards().unwrap().is_empty());
    }

    #[test]
    fn grace_mark_and_clear() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let reward = pending_commission(user, "evt_g", "sub_g", 250);
        let id = reward.id;
        store.insert_rewards_for_event("evt_g", vec![reward]).unwrap();

        let grace = Utc::now() + Duration::days(7);
        assert_eq!(store.mark_subscription_grace("sub_g", grace).unwrap(), 1);
        // Already stamped: nothing more to do.
        assert_eq!(store.mark_subscription_grace("sub_g", grace).unwrap(), 0);

        let stored = store.get_reward(&id).unwrap().unwrap();
        assert_eq!(stored.grace_end_at, Some(grace));

        assert_eq!(store.clear_subscription_grace("sub_g").unwrap(), 1);
        assert!(store.get_reward(&id).unwrap().unwrap().grace_end_at.is_none());
    }

    #[test]
    fn payout_claims_all_and_only_claimable() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();

        for (i, cents) in [1000, 2000, 2000].iter().enumerate() {
            let event = format!("evt_p{i}");
            let reward = pending_commission(user, &event, "sub_p", *cents);
            let id = reward.id;
            store.insert_rewards_for_event(&event, vec![reward]).unwrap();
            store.release_reward(&id, Utc::now()).unwrap();
        }

        let payout = store.create_payout(&user, "EUR").unwrap().unwrap();
        assert_eq!(payout.total_amount_cents, 5000);
        assert_eq!(payout.reward_ids.len(), 3);
        assert_eq!(payout.status, PayoutStatus::Pending);

        // Everything is claimed now; a second request finds nothing.
        assert!(store.create_payout(&user, "EUR").unwrap().is_none());
    }

    #[test]
    fn payout_transitions_and_idempotency() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let admin = UserId::generate();

        let reward = pending_commission(user, "evt_t", "sub_t", 500);
        let reward_id = reward.id;
        store.insert_rewards_for_event("evt_t", vec![reward]).unwrap();
        store.release_reward(&reward_id, Utc::now()).unwrap();
        let payout = store.create_payout(&user, "EUR").unwrap().unwrap();

        let approve = PayoutAction::Approve {
            admin_id: admin,
            notes: None,
        };
        let applied = store
            .apply_payout_action(&payout.id, &approve, Utc::now())
            .unwrap();
        assert!(matches!(applied, PayoutWrite::Applied(_)));

        // Re-approving is a no-op success.
        let repeat = store
            .apply_payout_action(&payout.id, &approve, Utc::now())
            .unwrap();
        assert!(matches!(repeat, PayoutWrite::AlreadyInTarget(_)));

        // Rejecting an approved payout is illegal.
        let reject = PayoutAction::Reject {
            admin_id: admin,
            reason: "too late".into(),
        };
        let err = store
            .apply_payout_action(&payout.id, &reject, Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidTransition {
                from: PayoutStatus::Approved,
                to: PayoutStatus::Rejected,
            }
        ));

        let paid = store
            .apply_payout_action(
                &payout.id,
                &PayoutAction::MarkPaid { admin_id: admin },
                Utc::now(),
            )
            .unwrap();
        assert_eq!(paid.payout().status, PayoutStatus::Paid);

        // Settlement appended a negative ledger entry.
        let entries = store.ledger_entries(&user, 10, 0).unwrap();
        assert!(entries
            .iter()
            .any(|e| e.amount_cents == -500 && e.currency.as_deref() == Some("EUR")));
    }

    #[test]
    fn rejection_returns_rewards_to_pool() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();
        let admin = UserId::generate();

        let reward = pending_commission(user, "evt_r", "sub_r", 750);
        let reward_id = reward.id;
        store.insert_rewards_for_event("evt_r", vec![reward]).unwrap();
        store.release_reward(&reward_id, Utc::now()).unwrap();
        let payout = store.create_payout(&user, "EUR").unwrap().unwrap();

        store
            .apply_payout_action(
                &payout.id,
                &PayoutAction::Reject {
                    admin_id: admin,
                    reason: "bank details invalid".into(),
                },
                Utc::now(),
            )
            .unwrap();

        let reward = store.get_reward(&reward_id).unwrap().unwrap();
        assert!(reward.is_claimable());

        // The returned reward is available to a fresh payout.
        let second = store.create_payout(&user, "EUR").unwrap().unwrap();
        assert_eq!(second.total_amount_cents, 750);
    }

    #[test]
    fn promotion_caps_are_enforced() {
        let (store, _dir) = create_test_store();
        let promo = Promotion::new(
            "SUMMER10",
            PromotionKind::BonusCredits { amount_cents: 500 },
            1,
        )
        .with_max_uses(2);
        store.put_promotion(&promo).unwrap();

        let user_a = UserId::generate();
        let user_b = UserId::generate();
        let user_c = UserId::generate();

        store
            .record_promotion_use(&promo, &PromotionUse::new(promo.id, user_a, None))
            .unwrap();

        // Per-user cap: second use by the same user is refused.
        let err = store
            .record_promotion_use(&promo, &PromotionUse::new(promo.id, user_a, None))
            .unwrap_err();
        assert!(matches!(err, StoreError::CapReached { per_user: true, .. }));

        store
            .record_promotion_use(&promo, &PromotionUse::new(promo.id, user_b, None))
            .unwrap();

        // Global cap: a third user is refused.
        let err = store
            .record_promotion_use(&promo, &PromotionUse::new(promo.id, user_c, None))
            .unwrap_err();
        assert!(matches!(err, StoreError::CapReached { per_user: false, .. }));

        assert_eq!(store.promotion_use_count(&promo.id).unwrap(), 2);
        assert_eq!(
            store.promotion_use_count_for_user(&promo.id, &user_a).unwrap(),
            1
        );

        // Bonus credits landed with the use.
        let account = store.get_account(&user_a).unwrap().unwrap();
        assert_eq!(account.credit_cents, 500);
        assert_eq!(account.lifetime_bonus_cents, 500);
    }

    #[test]
    fn duplicate_promotion_code_rejected() {
        let (store, _dir) = create_test_store();
        let promo = Promotion::new(
            "ONCE",
            PromotionKind::BonusCredits { amount_cents: 100 },
            1,
        );
        store.put_promotion(&promo).unwrap();

        let clash = Promotion::new(
            "ONCE",
            PromotionKind::BonusCredits { amount_cents: 200 },
            1,
        );
        assert!(matches!(
            store.put_promotion(&clash).unwrap_err(),
            StoreError::AlreadyExists { .. }
        ));

        // Updating the same promotion (same id) is allowed.
        let mut updated = promo.clone();
        updated.is_active = false;
        store.put_promotion(&updated).unwrap();
        assert!(!store.promotion_by_code("ONCE").unwrap().unwrap().is_active);
    }

    #[test]
    fn ledger_listing_is_newest_first_with_pagination() {
        let (store, _dir) = create_test_store();
        let user = UserId::generate();

        for i in 0..3 {
            let event = format!("evt_l{i}");
            let reward = Reward::registration_credit(
                user,
                UserId::generate(),
                1,
                100,
                Utc::now() - Duration::days(1),
                event.clone(),
            );
            let id = reward.id;
            store.insert_rewards_for_event(&event, vec![reward]).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(2)); // Distinct ULID timestamps
            store.release_reward(&id, Utc::now()).unwrap();
        }

        let all = store.ledger_entries(&user, 10, 0).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].balance_after_cents, Some(300)); // Newest first

        let page = store.ledger_entries(&user, 1, 1).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].balance_after_cents, Some(200));
    }

    #[test]
    fn void_attribution_is_sticky() {
        let (store, _dir) = create_test_store();
        let referee = UserId::generate();
        let row = Attribution::new(UserId::generate(), referee, 1, "C".into());
        let id = row.id;
        store.insert_attribution_chain(&[row]).unwrap();

        assert!(store.void_attribution(&id, Utc::now()).unwrap());
        assert!(!store.void_attribution(&id, Utc::now()).unwrap());
        assert!(store.attribution_chain(&referee).unwrap()[0].is_voided());
    }
}
