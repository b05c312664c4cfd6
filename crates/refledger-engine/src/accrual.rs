//! Reward accrual from qualifying events.

use std::sync::Arc;

use chrono::{Duration, Utc};

use refledger_core::{
    commission_cents, Attribution, Result, Reward, RewardEvent, RewardKind, RewardSchedule,
};
use refledger_store::Store;

use crate::store_err;

/// Outcome of processing one event.
#[derive(Debug, Clone)]
pub struct Accrual {
    /// The rewards for the event, newly created or pre-existing.
    pub rewards: Vec<Reward>,

    /// Whether the event had already been processed (webhook redelivery).
    pub duplicate: bool,
}

/// Turns qualifying events into pending rewards along the subject's
/// attribution chain.
///
/// Processing is idempotent on `source_event_id`: redelivering an event
/// returns the original reward set unchanged.
pub struct AccrualEngine {
    store: Arc<dyn Store>,
    schedule: Arc<RewardSchedule>,
}

impl AccrualEngine {
    /// Create the engine over a store and a reward schedule.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, schedule: Arc<RewardSchedule>) -> Self {
        Self { store, schedule }
    }

    /// Process one qualifying event.
    ///
    /// A subscription payment also clears any cancellation grace on the
    /// subscription's held rewards: a renewed payment reinstates them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn accrue(&self, event: &RewardEvent) -> Result<Accrual> {
        if let RewardEvent::SubscriptionPayment {
            subscription_id, ..
        } = event
        {
            let cleared = self
                .store
                .clear_subscription_grace(subscription_id)
                .map_err(store_err)?;
            if cleared > 0 {
                tracing::info!(
                    subscription_id,
                    cleared,
                    "renewed payment reinstated held rewards"
                );
            }
        }

        let chain = self
            .store
            .attribution_chain(&event.subject())
            .map_err(store_err)?;

        let now = Utc::now();
        let mut rewards = Vec::new();
        for attribution in &chain {
            if attribution.is_voided() || attribution.level > self.schedule.max_levels {
                continue;
            }
            if let Some(reward) = self.reward_for(event, attribution, now) {
                rewards.push(reward);
            }
        }

        if rewards.is_empty() {
            // Unattributed subjects and schedule-less levels accrue nothing;
            // there is no write to dedupe against.
            return Ok(Accrual {
                rewards,
                duplicate: false,
            });
        }

        let write = self
            .store
            .insert_rewards_for_event(event.source_event_id(), rewards)
            .map_err(store_err)?;

        let duplicate = !write.is_created();
        if duplicate {
            tracing::info!(
                source_event_id = event.source_event_id(),
                "event already processed, returning existing rewards"
            );
        } else {
            tracing::info!(
                source_event_id = event.source_event_id(),
                count = write.rewards().len(),
                "rewards accrued"
            );
        }

        Ok(Accrual {
            rewards: write.rewards().to_vec(),
            duplicate,
        })
    }

    /// Stamp a grace deadline on a cancelled subscription's held rewards,
    /// measured from the cancellation time. Returns how many rewards entered
    /// grace.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn subscription_cancelled(
        &self,
        subscription_id: &str,
        at: chrono::DateTime<Utc>,
    ) -> Result<usize> {
        let grace_end = at + Duration::days(self.schedule.grace_period_days);
        let stamped = self
            .store
            .mark_subscription_grace(subscription_id, grace_end)
            .map_err(store_err)?;
        tracing::info!(
            subscription_id,
            stamped,
            grace_end = %grace_end,
            "subscription cancelled, rewards in grace"
        );
        Ok(stamped)
    }

    fn reward_for(
        &self,
        event: &RewardEvent,
        attribution: &Attribution,
        now: chrono::DateTime<Utc>,
    ) -> Option<Reward> {
        match event {
            RewardEvent::Registration {
                source_event_id,
                referee_id,
            } => {
                let terms = self
                    .schedule
                    .terms(RewardKind::RegistrationCredit, attribution.level)?;
                let amount = terms.fixed_credit_cents?;
                if amount <= 0 {
                    return None;
                }
                Some(Reward::registration_credit(
                    attribution.referrer_id,
                    *referee_id,
                    attribution.level,
                    amount,
                    now + Duration::days(terms.hold_window_days),
                    source_event_id.clone(),
                ))
            }
            RewardEvent::SubscriptionPayment {
                source_event_id,
                payer_id,
                amount_cents,
                currency,
                subscription_id,
            } => {
                let terms = self
                    .schedule
                    .terms(RewardKind::SubscriptionCommission, attribution.level)?;
                let rate = terms.commission_rate_bps?;
                let amount = commission_cents(*amount_cents, rate);
                if amount <= 0 {
                    return None;
                }
                Some(Reward::subscription_commission(
                    attribution.referrer_id,
                    *payer_id,
                    attribution.level,
                    amount,
                    currency.clone(),
                    subscription_id.clone(),
                    now + Duration::days(terms.hold_window_days),
                    source_event_id.clone(),
                ))
            }
        }
    }

    /// The schedule this engine accrues against.
    #[must_use]
    pub fn schedule(&self) -> &RewardSchedule {
        &self.schedule
    }
}
