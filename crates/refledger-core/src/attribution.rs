//! Attribution types.
//!
//! An [`Attribution`] records one referrer→referee relationship at a given
//! chain depth. A referee gets one row per level: level 1 is the direct
//! referrer, level 2 the referrer's referrer, and so on up to the configured
//! maximum depth. Rows are written once at registration and never mutated
//! except for soft-voiding on retroactive fraud findings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AttributionId, UserId};

/// A recorded referrer→referee relationship at a given chain depth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribution {
    /// Unique attribution ID (ULID for time-ordering).
    pub id: AttributionId,

    /// The user who earns rewards from this relationship.
    pub referrer_id: UserId,

    /// The referred user.
    pub referee_id: UserId,

    /// Chain depth: 1 = direct referrer.
    pub level: u8,

    /// The referral code that established the direct relationship.
    pub code: String,

    /// When the attribution was recorded.
    pub created_at: DateTime<Utc>,

    /// Set when the attribution is retroactively voided for fraud.
    /// Voided attributions stop producing rewards but stay on record.
    pub voided_at: Option<DateTime<Utc>>,
}

impl Attribution {
    /// Create a new attribution row at the given level.
    #[must_use]
    pub fn new(referrer_id: UserId, referee_id: UserId, level: u8, code: String) -> Self {
        Self {
            id: AttributionId::generate(),
            referrer_id,
            referee_id,
            level,
            code,
            created_at: Utc::now(),
            voided_at: None,
        }
    }

    /// Check whether this attribution has been soft-voided.
    #[must_use]
    pub const fn is_voided(&self) -> bool {
        self.voided_at.is_some()
    }
}

/// A referral code owned by a user.
///
/// The Attribution Store resolves incoming codes through this table to find
/// the direct referrer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralCode {
    /// The code itself (unique).
    pub code: String,

    /// The user this code refers signups to.
    pub owner_id: UserId,

    /// When the code was issued.
    pub created_at: DateTime<Utc>,
}

impl ReferralCode {
    /// Issue a new referral code for a user.
    #[must_use]
    pub fn new(owner_id: UserId, code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            owner_id,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_attribution_is_live() {
        let a = Attribution::new(UserId::generate(), UserId::generate(), 1, "FRIEND".into());
        assert_eq!(a.level, 1);
        assert!(!a.is_voided());
    }

    #[test]
    fn voided_attribution() {
        let mut a = Attribution::new(UserId::generate(), UserId::generate(), 2, "FRIEND".into());
        a.voided_at = Some(Utc::now());
        assert!(a.is_voided());
    }
}
