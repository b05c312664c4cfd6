//! Payout types and the payout state machine table.
//!
//! A payout aggregates a user's released, unclaimed commission rewards into a
//! single admin-reviewed disbursement request. The legal status sequences are
//! `Pending -> Approved -> Paid` and `Pending -> Rejected`; nothing else.
//! Admin actions are a closed variant set ([`PayoutAction`]) so the
//! transition table is checked at compile time rather than dispatched over
//! strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{PayoutId, RewardId, UserId};

/// Lifecycle state of a payout request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Requested, awaiting admin review.
    Pending,

    /// Approved by an admin, awaiting settlement.
    Approved,

    /// Rejected by an admin. Terminal; claimed rewards are returned.
    Rejected,

    /// Settled by the external payment rail. Terminal.
    Paid,
}

impl PayoutStatus {
    /// Check whether this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Paid)
    }
}

/// An admin-invoked payout transition.
///
/// Every action carries the acting `admin_id` so each ledger write stays
/// attributable without ambient session state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum PayoutAction {
    /// `Pending -> Approved`.
    Approve {
        /// The administrator performing the approval.
        admin_id: UserId,
        /// Optional review notes.
        notes: Option<String>,
    },

    /// `Pending -> Rejected`. The reason is mandatory.
    Reject {
        /// The administrator performing the rejection.
        admin_id: UserId,
        /// Why the payout was rejected.
        reason: String,
    },

    /// `Approved -> Paid`.
    MarkPaid {
        /// The administrator confirming settlement.
        admin_id: UserId,
    },
}

impl PayoutAction {
    /// The state this action requires the payout to be in.
    #[must_use]
    pub const fn expected_from(&self) -> PayoutStatus {
        match self {
            Self::Approve { .. } | Self::Reject { .. } => PayoutStatus::Pending,
            Self::MarkPaid { .. } => PayoutStatus::Approved,
        }
    }

    /// The state this action transitions the payout into.
    #[must_use]
    pub const fn target(&self) -> PayoutStatus {
        match self {
            Self::Approve { .. } => PayoutStatus::Approved,
            Self::Reject { .. } => PayoutStatus::Rejected,
            Self::MarkPaid { .. } => PayoutStatus::Paid,
        }
    }

    /// The administrator performing the action.
    #[must_use]
    pub const fn admin_id(&self) -> UserId {
        match self {
            Self::Approve { admin_id, .. }
            | Self::Reject { admin_id, .. }
            | Self::MarkPaid { admin_id } => *admin_id,
        }
    }
}

/// An aggregated, admin-reviewed disbursement of released rewards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    /// Unique payout ID (ULID for time-ordering).
    pub id: PayoutId,

    /// The user being paid.
    pub user_id: UserId,

    /// The rewards claimed by this payout.
    pub reward_ids: Vec<RewardId>,

    /// Sum of the claimed rewards' amounts at creation time, in minor units.
    pub total_amount_cents: i64,

    /// ISO currency code shared by all claimed rewards.
    pub currency: String,

    /// Lifecycle state.
    pub status: PayoutStatus,

    /// Admin who approved the payout.
    pub approved_by: Option<UserId>,

    /// When the payout was approved.
    pub approved_at: Option<DateTime<Utc>>,

    /// Review notes recorded at approval.
    pub notes: Option<String>,

    /// Why the payout was rejected, if it was.
    pub rejection_reason: Option<String>,

    /// When the payout was settled, if it was.
    pub paid_at: Option<DateTime<Utc>>,

    /// When the payout was requested.
    pub created_at: DateTime<Utc>,

    /// When the payout last changed state.
    pub updated_at: DateTime<Utc>,
}

impl Payout {
    /// Create a new pending payout over the given claimed rewards.
    #[must_use]
    pub fn new(
        user_id: UserId,
        reward_ids: Vec<RewardId>,
        total_amount_cents: i64,
        currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PayoutId::generate(),
            user_id,
            reward_ids,
            total_amount_cents,
            currency,
            status: PayoutStatus::Pending,
            approved_by: None,
            approved_at: None,
            notes: None,
            rejection_reason: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an action's side effects to this payout. The caller has already
    /// verified `self.status == action.expected_from()`.
    pub fn apply(&mut self, action: &PayoutAction, now: DateTime<Utc>) {
        match action {
            PayoutAction::Approve { admin_id, notes } => {
                self.status = PayoutStatus::Approved;
                self.approved_by = Some(*admin_id);
                self.approved_at = Some(now);
                self.notes.clone_from(notes);
            }
            PayoutAction::Reject { reason, .. } => {
                self.status = PayoutStatus::Rejected;
                self.rejection_reason = Some(reason.clone());
            }
            PayoutAction::MarkPaid { .. } => {
                self.status = PayoutStatus::Paid;
                self.paid_at = Some(now);
            }
        }
        self.updated_at = now;
    }
}
