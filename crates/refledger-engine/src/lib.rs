//! Referral attribution, commission accrual, and payout engine.
//!
//! The engine layers domain services over the storage trait:
//!
//! - [`AttributionService`]: referral codes and the multi-level chain.
//! - [`AccrualEngine`]: idempotent reward accrual from qualifying events.
//! - [`ReleaseScheduler`]: hold-window maturation and grace voiding.
//! - [`PayoutService`]: admin-reviewed disbursement of released commissions.
//! - [`PromotionService`]: capped promotional codes.
//!
//! Services hold `Arc<dyn Store>` so every compound state transition inherits
//! the store's atomicity contract; the engine itself adds validation,
//! schedule math, and post-commit provider notification.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod accrual;
pub mod attribution;
pub mod config;
pub mod payout;
pub mod promotion;
pub mod release;
pub mod sync;

pub use accrual::{Accrual, AccrualEngine};
pub use attribution::AttributionService;
pub use config::EngineConfig;
pub use payout::{AdminGate, AllowAll, PayoutService};
pub use promotion::{PromotionGrant, PromotionService};
pub use release::{ReleaseOutcome, ReleaseScheduler};
pub use sync::{HttpProviderSync, NoopSync, ProviderSync, SyncError};

use refledger_core::LedgerError;
use refledger_store::StoreError;

/// Lift a storage error into the domain error taxonomy.
///
/// Variants with a direct domain meaning map through; everything else is an
/// opaque storage failure. Context-sensitive cases (a duplicate attribution,
/// a taken code) are mapped at the call site instead.
pub(crate) fn store_err(err: StoreError) -> LedgerError {
    match err {
        StoreError::NotFound { entity, id } => LedgerError::NotFound { entity, id },
        StoreError::InvalidTransition { from, to } => LedgerError::InvalidTransition { from, to },
        StoreError::CapReached { code, .. } => LedgerError::PromotionExhausted { code },
        StoreError::AlreadyExists { .. }
        | StoreError::Database(_)
        | StoreError::Serialization(_) => LedgerError::Storage(err.to_string()),
    }
}
