//! Reward schedule configuration.
//!
//! The per-level rate table keyed by `(event type, level)` is the one piece
//! of semantically significant configuration this subsystem consumes. Rates
//! and hold windows are inputs, never hardcoded in engine code; the
//! `Default` impl ships a working decaying table so a fresh deployment
//! accrues something sensible out of the box.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::RewardKind;

/// Table key: which event type at which chain depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ScheduleKey {
    /// The accruing event type.
    pub kind: RewardKind,

    /// Chain depth, 1-based.
    pub level: u8,
}

impl ScheduleKey {
    /// Create a key.
    #[must_use]
    pub const fn new(kind: RewardKind, level: u8) -> Self {
        Self { kind, level }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RewardKind::RegistrationCredit => "registration_credit",
            RewardKind::SubscriptionCommission => "subscription_commission",
        };
        write!(f, "{kind}/{}", self.level)
    }
}

impl FromStr for ScheduleKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, level) = s
            .split_once('/')
            .ok_or_else(|| format!("schedule key missing '/': {s}"))?;
        let kind = match kind {
            "registration_credit" => RewardKind::RegistrationCredit,
            "subscription_commission" => RewardKind::SubscriptionCommission,
            other => return Err(format!("unknown event type: {other}")),
        };
        let level: u8 = level
            .parse()
            .map_err(|_| format!("invalid level in schedule key: {s}"))?;
        Ok(Self { kind, level })
    }
}

impl TryFrom<String> for ScheduleKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduleKey> for String {
    fn from(key: ScheduleKey) -> Self {
        key.to_string()
    }
}

/// Terms for one `(event type, level)` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelTerms {
    /// Fixed credit grant in credit cents (registration events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_credit_cents: Option<i64>,

    /// Commission rate in basis points of the payment amount
    /// (subscription events).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commission_rate_bps: Option<u32>,

    /// Days a reward from this cell is held before release.
    pub hold_window_days: i64,
}

/// The full reward schedule: chain depth cap, cancellation grace, and the
/// per-level rate table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardSchedule {
    /// Hard cap on attribution chain depth.
    pub max_levels: u8,

    /// Days a cancelled subscription's pending rewards wait for a renewed
    /// payment before being voided.
    pub grace_period_days: i64,

    /// Per-level terms. Levels absent from the table accrue nothing.
    pub terms: HashMap<ScheduleKey, LevelTerms>,
}

impl Default for RewardSchedule {
    fn default() -> Self {
        let mut terms = HashMap::new();

        // Registration credits, decaying by level.
        terms.insert(
            ScheduleKey::new(RewardKind::RegistrationCredit, 1),
            LevelTerms {
                fixed_credit_cents: Some(1000), // 10.00 credits
                commission_rate_bps: None,
                hold_window_days: 14,
            },
        );
        terms.insert(
            ScheduleKey::new(RewardKind::RegistrationCredit, 2),
            LevelTerms {
                fixed_credit_cents: Some(500),
                commission_rate_bps: None,
                hold_window_days: 14,
            },
        );
        terms.insert(
            ScheduleKey::new(RewardKind::RegistrationCredit, 3),
            LevelTerms {
                fixed_credit_cents: Some(250),
                commission_rate_bps: None,
                hold_window_days: 14,
            },
        );

        // Subscription commissions, decaying by level.
        terms.insert(
            ScheduleKey::new(RewardKind::SubscriptionCommission, 1),
            LevelTerms {
                fixed_credit_cents: None,
                commission_rate_bps: Some(1000), // 10%
                hold_window_days: 14,
            },
        );
        terms.insert(
            ScheduleKey::new(RewardKind::SubscriptionCommission, 2),
            LevelTerms {
                fixed_credit_cents: None,
                commission_rate_bps: Some(500), // 5%
                hold_window_days: 14,
            },
        );
        terms.insert(
            ScheduleKey::new(RewardKind::SubscriptionCommission, 3),
            LevelTerms {
                fixed_credit_cents: None,
                commission_rate_bps: Some(250), // 2.5%
                hold_window_days: 14,
            },
        );

        Self {
            max_levels: 3,
            grace_period_days: 7,
            terms,
        }
    }
}

impl RewardSchedule {
    /// Terms for the given event type and level, if that cell accrues.
    #[must_use]
    pub fn terms(&self, kind: RewardKind, level: u8) -> Option<&LevelTerms> {
        self.terms.get(&ScheduleKey::new(kind, level))
    }
}

/// Commission amount in minor units for a payment, computed in widened
/// integers so large amounts cannot overflow.
#[must_use]
pub fn commission_cents(payment_cents: i64, rate_bps: u32) -> i64 {
    let widened = i128::from(payment_cents) * i128::from(rate_bps) / 10_000;
    i64::try_from(widened).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_decays() {
        let schedule = RewardSchedule::default();
        let l1 = schedule
            .terms(RewardKind::RegistrationCredit, 1)
            .unwrap()
            .fixed_credit_cents
            .unwrap();
        let l2 = schedule
            .terms(RewardKind::RegistrationCredit, 2)
            .unwrap()
            .fixed_credit_cents
            .unwrap();
        assert!(l1 > l2);

        let c1 = schedule
            .terms(RewardKind::SubscriptionCommission, 1)
            .unwrap()
            .commission_rate_bps
            .unwrap();
        let c2 = schedule
            .terms(RewardKind::SubscriptionCommission, 2)
            .unwrap()
            .commission_rate_bps
            .unwrap();
        assert!(c1 > c2);
    }

    #[test]
    fn missing_level_accrues_nothing() {
        let schedule = RewardSchedule::default();
        assert!(schedule.terms(RewardKind::RegistrationCredit, 9).is_none());
    }

    #[test]
    fn commission_math() {
        assert_eq!(commission_cents(10_000, 1000), 1000); // 10% of 100.00
        assert_eq!(commission_cents(2999, 500), 149); // 5% of 29.99, floored
        assert_eq!(commission_cents(0, 1000), 0);
    }

    #[test]
    fn commission_does_not_overflow() {
        assert_eq!(
            commission_cents(i64::MAX, 10_000),
            i64::MAX // 100% of max stays representable
        );
    }

    #[test]
    fn schedule_key_serde_roundtrip() {
        let key = ScheduleKey::new(RewardKind::SubscriptionCommission, 2);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, "\"subscription_commission/2\"");
        let parsed: ScheduleKey = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, key);
    }

    #[test]
    fn schedule_json_roundtrip() {
        let schedule = RewardSchedule::default();
        let json = serde_json::to_string(&schedule).unwrap();
        let parsed: RewardSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_levels, schedule.max_levels);
        assert_eq!(parsed.terms.len(), schedule.terms.len());
    }
}
