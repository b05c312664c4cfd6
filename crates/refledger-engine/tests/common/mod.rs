//! Shared test harness: a full engine stack over a temporary store.

#![allow(dead_code)]

use std::sync::Arc;

use refledger_core::{RewardEvent, RewardSchedule, UserId};
use refledger_engine::{
    AccrualEngine, AllowAll, AttributionService, NoopSync, PayoutService, PromotionService,
    ReleaseScheduler,
};
use refledger_store::RocksStore;
use tempfile::TempDir;

pub struct TestEnv {
    pub store: Arc<RocksStore>,
    pub attribution: AttributionService,
    pub accrual: AccrualEngine,
    pub release: ReleaseScheduler,
    pub payouts: PayoutService,
    pub promotions: PromotionService,
    _dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RocksStore::open(dir.path()).unwrap());
        let schedule = Arc::new(RewardSchedule::default());
        let sync = Arc::new(NoopSync);

        Self {
            attribution: AttributionService::new(store.clone(), schedule.max_levels),
            accrual: AccrualEngine::new(store.clone(), schedule),
            release: ReleaseScheduler::new(store.clone(), sync.clone()),
            payouts: PayoutService::new(store.clone(), Arc::new(AllowAll), sync),
            promotions: PromotionService::new(store.clone()),
            store,
            _dir: dir,
        }
    }

    /// Attribute `referee` to `referrer` through a fresh code.
    pub fn refer(&self, referrer: UserId, referee: UserId, code: &str) {
        self.attribution.register_code(referrer, code).unwrap();
        self.attribution.record_attribution(referee, code).unwrap();
    }
}

pub fn registration(event_id: &str, referee: UserId) -> RewardEvent {
    RewardEvent::Registration {
        source_event_id: event_id.into(),
        referee_id: referee,
    }
}

pub fn payment(event_id: &str, payer: UserId, amount_cents: i64, subscription: &str) -> RewardEvent {
    RewardEvent::SubscriptionPayment {
        source_event_id: event_id.into(),
        payer_id: payer,
        amount_cents,
        currency: "EUR".into(),
        subscription_id: subscription.into(),
    }
}
