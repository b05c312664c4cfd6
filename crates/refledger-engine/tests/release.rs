//! Hold-window release, cancellation grace, and sweep concurrency.

mod common;

use chrono::{Duration, Utc};

use common::{payment, registration, TestEnv};
use refledger_core::{RewardStatus, UserId};
use refledger_store::Store;

#[tokio::test]
async fn rewards_mature_after_the_hold_window() {
    let env = TestEnv::new();
    let referrer = UserId::generate();
    let referee = UserId::generate();
    env.refer(referrer, referee, "CODE");
    env.accrual.accrue(&registration("evt_1", referee)).unwrap();

    // Inside the 14-day hold nothing moves.
    let outcome = env.release.release_due(Utc::now()).await.unwrap();
    assert!(outcome.released.is_empty());
    assert!(env.store.get_account(&referrer).unwrap().is_none());

    // Past the hold the credit lands.
    let outcome = env
        .release
        .release_due(Utc::now() + Duration::days(15))
        .await
        .unwrap();
    assert_eq!(outcome.released.len(), 1);
    assert_eq!(outcome.released[0].status, RewardStatus::Released);

    let account = env.store.get_account(&referrer).unwrap().unwrap();
    assert_eq!(account.credit_cents, 1000);

    // A second sweep finds nothing left.
    let outcome = env
        .release
        .release_due(Utc::now() + Duration::days(16))
        .await
        .unwrap();
    assert!(outcome.released.is_empty());
    assert_eq!(
        env.store.get_account(&referrer).unwrap().unwrap().credit_cents,
        1000
    );
}

#[tokio::test]
async fn grace_holds_then_voids() {
    let env = TestEnv::new();
    let referrer = UserId::generate();
    let payer = UserId::generate();
    env.refer(referrer, payer, "CODE");
    env.accrual
        .accrue(&payment("evt_1", payer, 10_000, "sub_1"))
        .unwrap();

    let now = Utc::now();
    env.store
        .mark_subscription_grace("sub_1", now + Duration::days(20))
        .unwrap();

    // Due but in unexpired grace: held, not released, not voided.
    let outcome = env.release.release_due(now + Duration::days(15)).await.unwrap();
    assert!(outcome.released.is_empty());
    assert!(outcome.voided.is_empty());

    // Grace lapsed without a renewal: voided, never released.
    let outcome = env.release.release_due(now + Duration::days(21)).await.unwrap();
    assert!(outcome.released.is_empty());
    assert_eq!(outcome.voided.len(), 1);
    assert_eq!(outcome.voided[0].status, RewardStatus::Void);

    let stored = env
        .store
        .get_reward(&outcome.voided[0].id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, RewardStatus::Void);
    assert!(stored.voided_at.is_some());
}

#[tokio::test]
async fn renewed_payment_reinstates_held_rewards() {
    let env = TestEnv::new();
    let referrer = UserId::generate();
    let payer = UserId::generate();
    env.refer(referrer, payer, "CODE");
    env.accrual
        .accrue(&payment("evt_1", payer, 10_000, "sub_1"))
        .unwrap();

    let cancelled = env
        .accrual
        .subscription_cancelled("sub_1", Utc::now())
        .unwrap();
    assert_eq!(cancelled, 1);

    // The renewal clears the grace; both rewards then mature normally.
    env.accrual
        .accrue(&payment("evt_2", payer, 10_000, "sub_1"))
        .unwrap();

    let outcome = env
        .release
        .release_due(Utc::now() + Duration::days(15))
        .await
        .unwrap();
    assert_eq!(outcome.released.len(), 2);
    assert!(outcome.voided.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_sweeps_release_each_reward_once() {
    let env = TestEnv::new();
    let referrer = UserId::generate();
    let referee = UserId::generate();
    env.refer(referrer, referee, "CODE");
    env.accrual.accrue(&registration("evt_1", referee)).unwrap();

    let reference = Utc::now() + Duration::days(15);
    let (a, b) = tokio::join!(
        env.release.release_due(reference),
        env.release.release_due(reference)
    );

    let total = a.unwrap().released.len() + b.unwrap().released.len();
    assert_eq!(total, 1);

    // The balance was credited exactly once.
    let account = env.store.get_account(&referrer).unwrap().unwrap();
    assert_eq!(account.credit_cents, 1000);
    assert_eq!(env.store.ledger_entries(&referrer, 10, 0).unwrap().len(), 1);
}
