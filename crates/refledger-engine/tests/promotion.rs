//! Promotion validation, application, and cap races.

mod common;

use std::sync::Arc;

use chrono::{Duration, Utc};

use common::TestEnv;
use refledger_core::{Discount, LedgerError, Promotion, PromotionKind, UserId};
use refledger_engine::PromotionGrant;
use refledger_store::Store;

fn bonus(code: &str, amount_cents: i64, per_user: u32) -> Promotion {
    Promotion::new(code, PromotionKind::BonusCredits { amount_cents }, per_user)
}

#[test]
fn bonus_credits_land_immediately() {
    let env = TestEnv::new();
    env.promotions.create(bonus("WELCOME", 500, 1)).unwrap();

    let user = UserId::generate();
    let grant = env.promotions.apply("WELCOME", user, Utc::now()).unwrap();
    assert_eq!(grant, PromotionGrant::CreditsGranted { amount_cents: 500 });

    let account = env.store.get_account(&user).unwrap().unwrap();
    assert_eq!(account.credit_cents, 500);
    assert_eq!(account.lifetime_bonus_cents, 500);

    // Per-user cap of one: a second apply is exhausted.
    assert!(matches!(
        env.promotions.apply("WELCOME", user, Utc::now()).unwrap_err(),
        LedgerError::PromotionExhausted { .. }
    ));
    assert_eq!(
        env.store.get_account(&user).unwrap().unwrap().credit_cents,
        500
    );
}

#[test]
fn coupon_use_commits_only_on_confirmation() {
    let env = TestEnv::new();
    let promo = env
        .promotions
        .create(
            Promotion::new(
                "TEN_OFF",
                PromotionKind::StripeCoupon {
                    coupon_id: "coup_10".into(),
                    discount: Discount::Percent(10),
                },
                1,
            )
            .with_max_uses(100),
        )
        .unwrap();

    let user = UserId::generate();
    let grant = env.promotions.apply("TEN_OFF", user, Utc::now()).unwrap();
    assert_eq!(
        grant,
        PromotionGrant::CouponAttached {
            coupon_id: "coup_10".into(),
            discount: Discount::Percent(10),
        }
    );

    // An abandoned checkout burned nothing.
    assert_eq!(env.store.promotion_use_count(&promo.id).unwrap(), 0);

    let use_row = env
        .promotions
        .confirm_coupon_use("TEN_OFF", user, "pay_123", Utc::now())
        .unwrap();
    assert_eq!(use_row.payment_id.as_deref(), Some("pay_123"));
    assert_eq!(env.store.promotion_use_count(&promo.id).unwrap(), 1);

    // Confirming again would exceed the per-user cap.
    assert!(matches!(
        env.promotions
            .confirm_coupon_use("TEN_OFF", user, "pay_124", Utc::now())
            .unwrap_err(),
        LedgerError::PromotionExhausted { .. }
    ));
}

#[test]
fn validation_order_and_lifecycle() {
    let env = TestEnv::new();
    let now = Utc::now();
    env.promotions
        .create(bonus("FLASH", 250, 1).with_window(now, Some(now + Duration::days(1))))
        .unwrap();

    let user = UserId::generate();

    assert!(matches!(
        env.promotions.validate("MISSING", &user, now).unwrap_err(),
        LedgerError::NotFound { .. }
    ));

    assert!(matches!(
        env.promotions
            .validate("FLASH", &user, now + Duration::days(2))
            .unwrap_err(),
        LedgerError::PromotionExpired { .. }
    ));

    env.promotions.disable("FLASH").unwrap();
    assert!(matches!(
        env.promotions.validate("FLASH", &user, now).unwrap_err(),
        LedgerError::PromotionInactive { .. }
    ));

    env.promotions.enable("FLASH").unwrap();
    env.promotions.validate("FLASH", &user, now).unwrap();
}

#[test]
fn create_rejects_bad_input() {
    let env = TestEnv::new();

    assert!(matches!(
        env.promotions.create(bonus("  ", 100, 1)).unwrap_err(),
        LedgerError::InvalidInput(_)
    ));
    assert!(matches!(
        env.promotions.create(bonus("ZERO", 0, 1)).unwrap_err(),
        LedgerError::InvalidInput(_)
    ));
    assert!(matches!(
        env.promotions
            .create(Promotion::new(
                "OVER",
                PromotionKind::StripeCoupon {
                    coupon_id: "c".into(),
                    discount: Discount::Percent(101),
                },
                1,
            ))
            .unwrap_err(),
        LedgerError::InvalidInput(_)
    ));

    env.promotions.create(bonus("TAKEN", 100, 1)).unwrap();
    assert!(matches!(
        env.promotions.create(bonus("TAKEN", 200, 1)).unwrap_err(),
        LedgerError::InvalidInput(_)
    ));
}

#[test]
fn concurrent_applies_cannot_overrun_the_last_use() {
    let env = Arc::new(TestEnv::new());
    env.promotions
        .create(bonus("SUMMER10", 1000, 1).with_max_uses(3))
        .unwrap();

    // Burn two of the three global uses.
    env.promotions
        .apply("SUMMER10", UserId::generate(), Utc::now())
        .unwrap();
    env.promotions
        .apply("SUMMER10", UserId::generate(), Utc::now())
        .unwrap();

    // Two users race for the last use.
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let env = env.clone();
            std::thread::spawn(move || {
                env.promotions
                    .apply("SUMMER10", UserId::generate(), Utc::now())
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(LedgerError::PromotionExhausted { .. })
    )));

    let promo = env.promotions.by_code("SUMMER10").unwrap();
    assert_eq!(env.store.promotion_use_count(&promo.id).unwrap(), 3);
}
