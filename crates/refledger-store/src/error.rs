//! Error types for refledger storage.

use refledger_core::PayoutStatus;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind.
        entity: &'static str,
        /// The missing id.
        id: String,
    },

    /// Uniqueness violated (duplicate code, second level-1 attribution).
    #[error("{entity} already exists: {id}")]
    AlreadyExists {
        /// Entity kind.
        entity: &'static str,
        /// The conflicting id.
        id: String,
    },

    /// A payout action did not match the payout's current state.
    #[error("invalid payout transition from {from:?} to {to:?}")]
    InvalidTransition {
        /// Current state.
        from: PayoutStatus,
        /// Requested state.
        to: PayoutStatus,
    },

    /// A promotion use would exceed a cap.
    #[error("promotion cap reached: {code} (per_user={per_user})")]
    CapReached {
        /// The capped promotion code.
        code: String,
        /// Whether the per-user cap (vs the global cap) was hit.
        per_user: bool,
    },
}
