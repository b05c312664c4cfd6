//! Admin-reviewed payout disbursement.

use std::sync::Arc;

use chrono::Utc;

use refledger_core::{LedgerError, Payout, PayoutAction, PayoutId, Result, UserId};
use refledger_store::{PayoutWrite, Store};

use crate::store_err;
use crate::sync::ProviderSync;

/// Decides who may perform admin payout actions.
///
/// The engine has no session machinery; the embedding service supplies the
/// admin check through this seam.
pub trait AdminGate: Send + Sync {
    /// Whether the user may approve, reject, and settle payouts.
    fn is_admin(&self, user_id: &UserId) -> bool;
}

/// A gate that admits everyone. For tests and single-operator deployments.
pub struct AllowAll;

impl AdminGate for AllowAll {
    fn is_admin(&self, _user_id: &UserId) -> bool {
        true
    }
}

/// Aggregates released commissions into payouts and drives their review
/// lifecycle: `Pending -> Approved -> Paid`, or `Pending -> Rejected`.
pub struct PayoutService {
    store: Arc<dyn Store>,
    gate: Arc<dyn AdminGate>,
    sync: Arc<dyn ProviderSync>,
}

impl PayoutService {
    /// Create the service over a store, an admin gate, and a provider sync.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gate: Arc<dyn AdminGate>, sync: Arc<dyn ProviderSync>) -> Self {
        Self { store, gate, sync }
    }

    /// Request a payout over every claimable reward the user holds in the
    /// given currency.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NothingToPayOut`] if the user has no released,
    ///   unclaimed rewards in that currency.
    pub fn request(&self, user_id: UserId, currency: &str) -> Result<Payout> {
        let payout = self
            .store
            .create_payout(&user_id, currency)
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::NothingToPayOut {
                user_id: user_id.to_string(),
                currency: currency.to_string(),
            })?;

        tracing::info!(
            payout_id = %payout.id,
            user_id = %user_id,
            total_cents = payout.total_amount_cents,
            currency,
            rewards = payout.reward_ids.len(),
            "payout requested"
        );
        Ok(payout)
    }

    /// Approve a pending payout.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if the caller is not an admin.
    /// - [`LedgerError::InvalidTransition`] if the payout is not pending.
    pub fn approve(
        &self,
        admin_id: UserId,
        payout_id: &PayoutId,
        notes: Option<String>,
    ) -> Result<Payout> {
        self.apply(
            payout_id,
            &PayoutAction::Approve { admin_id, notes },
        )
    }

    /// Reject a pending payout, returning its claimed rewards to the pool.
    /// The reason is mandatory.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] if the reason is blank.
    /// - [`LedgerError::Unauthorized`] if the caller is not an admin.
    /// - [`LedgerError::InvalidTransition`] if the payout is not pending.
    pub fn reject(&self, admin_id: UserId, payout_id: &PayoutId, reason: &str) -> Result<Payout> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::InvalidInput(
                "rejection reason is required".into(),
            ));
        }
        self.apply(
            payout_id,
            &PayoutAction::Reject {
                admin_id,
                reason: reason.to_string(),
            },
        )
    }

    /// Record that an approved payout was settled on the external rail, then
    /// notify the provider. Notification failure is logged; the settlement
    /// stands.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if the caller is not an admin.
    /// - [`LedgerError::InvalidTransition`] if the payout is not approved.
    pub async fn mark_paid(&self, admin_id: UserId, payout_id: &PayoutId) -> Result<Payout> {
        let write = self.apply_write(payout_id, &PayoutAction::MarkPaid { admin_id })?;

        // Only a fresh transition notifies; an idempotent repeat must not
        // re-send the settlement.
        if let PayoutWrite::Applied(payout) = &write {
            if let Err(err) = self.sync.payout_settled(payout).await {
                tracing::warn!(
                    payout_id = %payout.id,
                    error = %err,
                    "provider notification failed for settled payout"
                );
            }
        }
        Ok(write.payout().clone())
    }

    /// Approve a batch of payouts. Each item succeeds or fails on its own;
    /// one illegal transition does not block the rest.
    pub fn approve_batch(
        &self,
        admin_id: UserId,
        payout_ids: &[PayoutId],
        notes: Option<String>,
    ) -> Vec<(PayoutId, Result<Payout>)> {
        payout_ids
            .iter()
            .map(|id| (*id, self.approve(admin_id, id, notes.clone())))
            .collect()
    }

    /// Look a payout up by id.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the payout does not exist.
    pub fn payout(&self, id: &PayoutId) -> Result<Payout> {
        self.store
            .get_payout(id)
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "payout",
                id: id.to_string(),
            })
    }

    /// A user's payouts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn payouts_for_user(&self, user_id: &UserId) -> Result<Vec<Payout>> {
        self.store.payouts_for_user(user_id).map_err(store_err)
    }

    fn apply(&self, payout_id: &PayoutId, action: &PayoutAction) -> Result<Payout> {
        Ok(self.apply_write(payout_id, action)?.payout().clone())
    }

    fn apply_write(&self, payout_id: &PayoutId, action: &PayoutAction) -> Result<PayoutWrite> {
        let admin_id = action.admin_id();
        if !self.gate.is_admin(&admin_id) {
            return Err(LedgerError::Unauthorized {
                admin_id: admin_id.to_string(),
            });
        }

        let write = self
            .store
            .apply_payout_action(payout_id, action, Utc::now())
            .map_err(store_err)?;

        match &write {
            PayoutWrite::Applied(payout) => {
                tracing::info!(
                    payout_id = %payout.id,
                    status = ?payout.status,
                    admin_id = %admin_id,
                    "payout transition applied"
                );
            }
            PayoutWrite::AlreadyInTarget(payout) => {
                tracing::debug!(
                    payout_id = %payout.id,
                    status = ?payout.status,
                    "payout already in target state, no-op"
                );
            }
        }
        Ok(write)
    }
}
