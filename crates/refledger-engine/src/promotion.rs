//! Capped promotional codes.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use refledger_core::{
    Discount, LedgerError, Promotion, PromotionKind, PromotionUse, Result, UserId,
};
use refledger_store::{Store, StoreError};

use crate::store_err;

/// What applying a promotion granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromotionGrant {
    /// A provider coupon to attach at checkout. No use is committed until
    /// [`PromotionService::confirm_coupon_use`] reports the confirmed
    /// payment.
    CouponAttached {
        /// The provider-side coupon identifier.
        coupon_id: String,
        /// The discount the coupon carries.
        discount: Discount,
    },

    /// Bonus credits landed in the user's ledger. The use is committed.
    CreditsGranted {
        /// Granted credits, in credit cents.
        amount_cents: i64,
    },
}

/// Creates, validates, and applies promotional codes.
pub struct PromotionService {
    store: Arc<dyn Store>,
}

impl PromotionService {
    /// Create the service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Create a promotion.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] for an empty code, a taken code, a
    ///   percent discount over 100, or a non-positive grant.
    pub fn create(&self, promotion: Promotion) -> Result<Promotion> {
        if promotion.code.trim().is_empty() {
            return Err(LedgerError::InvalidInput("promotion code is empty".into()));
        }
        match &promotion.kind {
            PromotionKind::StripeCoupon {
                discount: Discount::Percent(pct),
                ..
            } if *pct > 100 => {
                return Err(LedgerError::InvalidInput(format!(
                    "percent discount out of range: {pct}"
                )));
            }
            PromotionKind::StripeCoupon {
                discount: Discount::AmountCents(cents),
                ..
            }
            | PromotionKind::BonusCredits {
                amount_cents: cents,
            } if *cents <= 0 => {
                return Err(LedgerError::InvalidInput(
                    "promotion grant must be positive".into(),
                ));
            }
            _ => {}
        }

        match self.store.put_promotion(&promotion) {
            Ok(()) => {
                tracing::info!(code = %promotion.code, "promotion created");
                Ok(promotion)
            }
            Err(StoreError::AlreadyExists { .. }) => Err(LedgerError::InvalidInput(format!(
                "promotion code already exists: {}",
                promotion.code
            ))),
            Err(err) => Err(store_err(err)),
        }
    }

    /// Soft-disable a promotion. Committed uses keep their effects.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the code does not resolve.
    pub fn disable(&self, code: &str) -> Result<()> {
        self.store
            .set_promotion_active(code, false)
            .map_err(store_err)?;
        tracing::info!(code, "promotion disabled");
        Ok(())
    }

    /// Re-enable a soft-disabled promotion.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the code does not resolve.
    pub fn enable(&self, code: &str) -> Result<()> {
        self.store
            .set_promotion_active(code, true)
            .map_err(store_err)?;
        tracing::info!(code, "promotion enabled");
        Ok(())
    }

    /// Check whether a user could apply a code right now.
    ///
    /// Advisory only: a concurrent apply can still take the last use between
    /// this check and [`apply`](Self::apply). The commit is where caps are
    /// finally arbitrated.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the code does not resolve.
    /// - [`LedgerError::PromotionInactive`] if it is soft-disabled.
    /// - [`LedgerError::PromotionExpired`] if `now` is outside the window.
    /// - [`LedgerError::PromotionExhausted`] if a cap is already met.
    pub fn validate(&self, code: &str, user_id: &UserId, now: DateTime<Utc>) -> Result<Promotion> {
        let promotion = self
            .store
            .promotion_by_code(code)
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "promotion",
                id: code.to_string(),
            })?;

        if !promotion.is_active {
            return Err(LedgerError::PromotionInactive { code: code.into() });
        }
        if !promotion.in_window(now) {
            return Err(LedgerError::PromotionExpired { code: code.into() });
        }
        if let Some(max_uses) = promotion.max_uses {
            if self
                .store
                .promotion_use_count(&promotion.id)
                .map_err(store_err)?
                >= max_uses
            {
                return Err(LedgerError::PromotionExhausted { code: code.into() });
            }
        }
        if self
            .store
            .promotion_use_count_for_user(&promotion.id, user_id)
            .map_err(store_err)?
            >= promotion.max_uses_per_user
        {
            return Err(LedgerError::PromotionExhausted { code: code.into() });
        }

        Ok(promotion)
    }

    /// Apply a promotion for a user.
    ///
    /// Bonus-credit promotions commit their use (and the credit grant)
    /// immediately. Coupon promotions only hand the coupon back; the use is
    /// committed by [`confirm_coupon_use`](Self::confirm_coupon_use) once the
    /// external payment confirms, so an abandoned checkout burns nothing.
    ///
    /// # Errors
    ///
    /// Same as [`validate`](Self::validate), with the cap errors now final.
    pub fn apply(&self, code: &str, user_id: UserId, now: DateTime<Utc>) -> Result<PromotionGrant> {
        let promotion = self.validate(code, &user_id, now)?;

        match &promotion.kind {
            PromotionKind::StripeCoupon {
                coupon_id,
                discount,
            } => Ok(PromotionGrant::CouponAttached {
                coupon_id: coupon_id.clone(),
                discount: *discount,
            }),
            PromotionKind::BonusCredits { amount_cents } => {
                let use_row = PromotionUse::new(promotion.id, user_id, None);
                self.store
                    .record_promotion_use(&promotion, &use_row)
                    .map_err(store_err)?;
                tracing::info!(code, user_id = %user_id, amount_cents, "bonus credits granted");
                Ok(PromotionGrant::CreditsGranted {
                    amount_cents: *amount_cents,
                })
            }
        }
    }

    /// Commit a coupon promotion's use after its payment confirmed.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] if the code is not a coupon promotion.
    /// - [`LedgerError::PromotionExhausted`] if the caps filled up between
    ///   checkout and confirmation.
    pub fn confirm_coupon_use(
        &self,
        code: &str,
        user_id: UserId,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PromotionUse> {
        let promotion = self.validate(code, &user_id, now)?;
        if !matches!(promotion.kind, PromotionKind::StripeCoupon { .. }) {
            return Err(LedgerError::InvalidInput(format!(
                "promotion {code} is not a coupon promotion"
            )));
        }

        let use_row = PromotionUse::new(promotion.id, user_id, Some(payment_id.to_string()));
        self.store
            .record_promotion_use(&promotion, &use_row)
            .map_err(store_err)?;
        tracing::info!(code, user_id = %user_id, payment_id, "coupon use confirmed");
        Ok(use_row)
    }

    /// Look a promotion up by code.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::NotFound`] if the code does not resolve.
    pub fn by_code(&self, code: &str) -> Result<Promotion> {
        self.store
            .promotion_by_code(code)
            .map_err(store_err)?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "promotion",
                id: code.to_string(),
            })
    }
}
