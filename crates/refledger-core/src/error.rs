//! Error taxonomy for refledger operations.

use crate::ids::IdError;
use crate::PayoutStatus;

/// Result type for refledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors surfaced by the ledger subsystem.
///
/// Duplicate-event accrual and repeated idempotent admin transitions are not
/// represented here: both recover silently and return current state. Every
/// variant below corresponds to a rolled-back operation.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// The referral code does not resolve to a referrer.
    #[error("invalid referral code: {code}")]
    InvalidCode {
        /// The unresolvable code.
        code: String,
    },

    /// A user tried to refer themselves.
    #[error("self-referral rejected for user {user_id}")]
    SelfReferral {
        /// The offending user.
        user_id: String,
    },

    /// The referee already has a direct attribution.
    #[error("user {referee_id} is already attributed")]
    AlreadyAttributed {
        /// The already-attributed referee.
        referee_id: String,
    },

    /// Illegal payout state transition.
    #[error("invalid payout transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: PayoutStatus,
        /// Requested state.
        to: PayoutStatus,
    },

    /// The caller is not an administrator.
    #[error("unauthorized: {admin_id} is not an administrator")]
    Unauthorized {
        /// The rejected caller.
        admin_id: String,
    },

    /// The promotion's validity window does not cover now.
    #[error("promotion expired: {code}")]
    PromotionExpired {
        /// The expired code.
        code: String,
    },

    /// A usage cap (global or per-user) is already reached.
    #[error("promotion exhausted: {code}")]
    PromotionExhausted {
        /// The exhausted code.
        code: String,
    },

    /// The promotion is soft-disabled.
    #[error("promotion inactive: {code}")]
    PromotionInactive {
        /// The inactive code.
        code: String,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// The missing id.
        id: String,
    },

    /// A payout rejection without a reason, or other invalid input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// No released, unclaimed rewards to pay out.
    #[error("nothing to pay out for user {user_id} in {currency}")]
    NothingToPayOut {
        /// The requesting user.
        user_id: String,
        /// The requested currency.
        currency: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(String),
}
