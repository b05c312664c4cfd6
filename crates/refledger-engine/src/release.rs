//! Hold-window maturation and grace voiding.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use refledger_core::{Result, Reward};
use refledger_store::Store;

use crate::store_err;
use crate::sync::ProviderSync;

/// Outcome of one release sweep.
#[derive(Debug, Default)]
pub struct ReleaseOutcome {
    /// Rewards that matured into their owners' balances.
    pub released: Vec<Reward>,

    /// Rewards voided because their cancellation grace lapsed.
    pub voided: Vec<Reward>,
}

/// Periodically sweeps pending rewards: voids those whose cancellation grace
/// lapsed, releases those past their hold window.
///
/// The scheduler never decides transitions itself; it nominates candidates
/// and lets the store's conditional transition arbitrate, so concurrent
/// sweeps cannot double-release a reward.
pub struct ReleaseScheduler {
    store: Arc<dyn Store>,
    sync: Arc<dyn ProviderSync>,
}

impl ReleaseScheduler {
    /// Create the scheduler over a store and a provider sync.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, sync: Arc<dyn ProviderSync>) -> Self {
        Self { store, sync }
    }

    /// Run one sweep against the given reference time.
    ///
    /// A reward in unexpired grace is held: neither released nor voided until
    /// the grace resolves one way or the other. Provider notification happens
    /// after each commit; failures are logged, not propagated.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn release_due(&self, reference: DateTime<Utc>) -> Result<ReleaseOutcome> {
        let pending = self.store.pending_rewards().map_err(store_err)?;
        let mut outcome = ReleaseOutcome::default();

        for reward in pending {
            if reward.grace_lapsed(reference) {
                if let Some(voided) = self
                    .store
                    .void_reward(&reward.id, reference)
                    .map_err(store_err)?
                {
                    tracing::info!(
                        reward_id = %voided.id,
                        user_id = %voided.user_id,
                        "reward voided, grace lapsed without renewal"
                    );
                    outcome.voided.push(voided);
                }
                continue;
            }

            if reward.grace_end_at.is_some() || !reward.is_due(reference) {
                continue;
            }

            if let Some(released) = self
                .store
                .release_reward(&reward.id, reference)
                .map_err(store_err)?
            {
                if let Err(err) = self.sync.reward_released(&released).await {
                    tracing::warn!(
                        reward_id = %released.id,
                        error = %err,
                        "provider notification failed for released reward"
                    );
                }
                outcome.released.push(released);
            }
        }

        if !outcome.released.is_empty() || !outcome.voided.is_empty() {
            tracing::info!(
                released = outcome.released.len(),
                voided = outcome.voided.len(),
                "release sweep finished"
            );
        }
        Ok(outcome)
    }

    /// Sweep forever at the given interval. Errors are logged and the next
    /// tick retries.
    pub async fn run(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.release_due(Utc::now()).await {
                tracing::error!(error = %err, "release sweep failed");
            }
        }
    }
}
