//! Referral codes and the attribution chain.

use std::sync::Arc;

use refledger_core::{Attribution, AttributionId, LedgerError, ReferralCode, Result, UserId};
use refledger_store::{Store, StoreError};

use crate::store_err;

/// Records who referred whom, up to the configured chain depth.
///
/// Attribution is first-touch and permanent: the chain is written once at
/// registration and only ever soft-voided afterwards.
pub struct AttributionService {
    store: Arc<dyn Store>,
    max_levels: u8,
}

impl AttributionService {
    /// Create the service over a store with the given chain depth cap.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, max_levels: u8) -> Self {
        Self { store, max_levels }
    }

    /// Issue a referral code for a user.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] if the code is empty or taken by
    ///   another user.
    pub fn register_code(&self, owner_id: UserId, code: &str) -> Result<ReferralCode> {
        let code = code.trim();
        if code.is_empty() {
            return Err(LedgerError::InvalidInput("referral code is empty".into()));
        }

        let row = ReferralCode::new(owner_id, code);
        match self.store.put_referral_code(&row) {
            Ok(()) => {
                tracing::info!(owner_id = %owner_id, code, "referral code registered");
                Ok(row)
            }
            Err(StoreError::AlreadyExists { .. }) => Err(LedgerError::InvalidInput(format!(
                "referral code already taken: {code}"
            ))),
            Err(err) => Err(store_err(err)),
        }
    }

    /// Attribute a newly registered user to the owner of `code`, extending
    /// the chain up the owner's own ancestry to at most `max_levels`.
    ///
    /// Returns the written chain, level ascending.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidCode`] if the code does not resolve.
    /// - [`LedgerError::SelfReferral`] if the code belongs to the referee.
    /// - [`LedgerError::AlreadyAttributed`] if the referee has a chain.
    pub fn record_attribution(&self, referee_id: UserId, code: &str) -> Result<Vec<Attribution>> {
        let resolved = self
            .store
            .get_referral_code(code)
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::InvalidCode { code: code.into() })?;

        if resolved.owner_id == referee_id {
            return Err(LedgerError::SelfReferral {
                user_id: referee_id.to_string(),
            });
        }

        let mut chain = vec![Attribution::new(
            resolved.owner_id,
            referee_id,
            1,
            code.to_string(),
        )];

        // The referrer's own ancestry becomes the referee's indirect levels.
        // Voided ancestor links stop the walk: rewards must not flow past a
        // fraud finding.
        for ancestor in self
            .store
            .attribution_chain(&resolved.owner_id)
            .map_err(store_err)?
        {
            if ancestor.is_voided() {
                break;
            }
            let level = ancestor.level.saturating_add(1);
            if level > self.max_levels {
                break;
            }
            chain.push(Attribution::new(
                ancestor.referrer_id,
                referee_id,
                level,
                code.to_string(),
            ));
        }

        match self.store.insert_attribution_chain(&chain) {
            Ok(()) => {
                tracing::info!(
                    referee_id = %referee_id,
                    referrer_id = %resolved.owner_id,
                    depth = chain.len(),
                    "attribution chain recorded"
                );
                Ok(chain)
            }
            Err(StoreError::AlreadyExists { .. }) => Err(LedgerError::AlreadyAttributed {
                referee_id: referee_id.to_string(),
            }),
            Err(err) => Err(store_err(err)),
        }
    }

    /// The referee's chain, level ascending, voided rows included.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn chain(&self, referee_id: &UserId) -> Result<Vec<Attribution>> {
        self.store.attribution_chain(referee_id).map_err(store_err)
    }

    /// Soft-void an attribution after a fraud finding. Already-released
    /// rewards are untouched; the link stops producing new ones.
    ///
    /// Returns `false` if the attribution was already voided.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the attribution does not exist.
    pub fn void(&self, id: &AttributionId) -> Result<bool> {
        let voided = self
            .store
            .void_attribution(id, chrono::Utc::now())
            .map_err(store_err)?;
        if voided {
            tracing::warn!(attribution_id = %id, "attribution voided");
        }
        Ok(voided)
    }
}
