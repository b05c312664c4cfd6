//! Core types for the refledger referral/commission ledger.
//!
//! This crate provides the foundational types used throughout refledger:
//!
//! - **Identifiers**: `UserId`, `AttributionId`, `RewardId`, `PayoutId`,
//!   `PromotionId`, `UseId`, `EntryId`
//! - **Attribution**: `Attribution`, `ReferralCode`
//! - **Rewards**: `Reward`, `RewardKind`, `RewardStatus`, `RewardValue`
//! - **Payouts**: `Payout`, `PayoutStatus`, `PayoutAction`
//! - **Promotions**: `Promotion`, `PromotionKind`, `PromotionUse`
//! - **Ledger**: `Account`, `LedgerEntry`, `EntryKind`
//! - **Schedule**: `RewardSchedule`, `LevelTerms`
//!
//! # Money
//!
//! All amounts are `i64` minor units (cents) to avoid floating point
//! precision issues. Commission rates are integer basis points.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod attribution;
pub mod error;
pub mod event;
pub mod ids;
pub mod ledger;
pub mod payout;
pub mod promotion;
pub mod reward;
pub mod schedule;

pub use attribution::{Attribution, ReferralCode};
pub use error::{LedgerError, Result};
pub use event::RewardEvent;
pub use ids::{
    AttributionId, EntryId, IdError, PayoutId, PromotionId, RewardId, UseId, UserId,
};
pub use ledger::{Account, EntryKind, LedgerEntry};
pub use payout::{Payout, PayoutAction, PayoutStatus};
pub use promotion::{Discount, Promotion, PromotionKind, PromotionUse};
pub use reward::{Reward, RewardKind, RewardStatus, RewardValue};
pub use schedule::{commission_cents, LevelTerms, RewardSchedule, ScheduleKey};
