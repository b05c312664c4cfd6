//! Qualifying events delivered by the payment/subscription event source.
//!
//! Delivery is webhook-style at-least-once; `source_event_id` is the
//! idempotency key the accrual engine dedupes on.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// An external event that accrues rewards.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event_type")]
pub enum RewardEvent {
    /// A referred user completed registration.
    Registration {
        /// Idempotency key from the event source.
        source_event_id: String,
        /// The newly registered referee.
        referee_id: UserId,
    },

    /// A referred user's subscription invoice was paid.
    SubscriptionPayment {
        /// Idempotency key from the event source.
        source_event_id: String,
        /// The paying user.
        payer_id: UserId,
        /// Payment amount in minor units.
        amount_cents: i64,
        /// ISO currency code of the payment.
        currency: String,
        /// The subscription the payment belongs to.
        subscription_id: String,
    },
}

impl RewardEvent {
    /// The idempotency key of this event.
    #[must_use]
    pub fn source_event_id(&self) -> &str {
        match self {
            Self::Registration {
                source_event_id, ..
            }
            | Self::SubscriptionPayment {
                source_event_id, ..
            } => source_event_id,
        }
    }

    /// The user whose attribution chain the event pays out along.
    #[must_use]
    pub const fn subject(&self) -> UserId {
        match self {
            Self::Registration { referee_id, .. } => *referee_id,
            Self::SubscriptionPayment { payer_id, .. } => *payer_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_accessors() {
        let user = UserId::generate();
        let event = RewardEvent::SubscriptionPayment {
            source_event_id: "evt_42".into(),
            payer_id: user,
            amount_cents: 2999,
            currency: "EUR".into(),
            subscription_id: "sub_1".into(),
        };
        assert_eq!(event.source_event_id(), "evt_42");
        assert_eq!(event.subject(), user);
    }

    #[test]
    fn event_serde_tagging() {
        let event = RewardEvent::Registration {
            source_event_id: "evt_1".into(),
            referee_id: UserId::generate(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "registration");
    }
}
