//! Guarded billing state machine, as enforced in SQL.

#![allow(clippy::unwrap_used)]

use rust_decimal::Decimal;
use sqlx::PgPool;

use shopgate_core::{Email, MerchantId, ShopDomain, SubscriptionStatus};
use shopgate_gateway::db::{MerchantRepository, RepositoryError, SubscriptionRepository};

async fn seed_merchant(pool: &PgPool, handle: &str) -> MerchantId {
    let shop = ShopDomain::parse(handle).unwrap();
    MerchantRepository::new(pool)
        .upsert(&shop, &Email::for_shop(&shop))
        .await
        .unwrap()
        .id
}

fn plan_price() -> Decimal {
    Decimal::new(1999, 2)
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn stale_active_webhook_cannot_resurrect_cancelled_row(pool: PgPool) {
    let merchant_id = seed_merchant(&pool, "acme").await;
    let repo = SubscriptionRepository::new(&pool);

    repo.create_pending(merchant_id, 42, "Pro", plan_price(), 7)
        .await
        .unwrap();
    repo.transition_by_charge_id(42, SubscriptionStatus::Active)
        .await
        .unwrap();
    repo.transition_by_charge_id(42, SubscriptionStatus::Cancelled)
        .await
        .unwrap();

    // Out-of-order redelivery carrying the older state.
    let after = repo
        .transition_by_charge_id(42, SubscriptionStatus::Active)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, SubscriptionStatus::Cancelled);
    assert!(after.cancelled_at.is_some());
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn declined_subscription_stays_declined(pool: PgPool) {
    let merchant_id = seed_merchant(&pool, "acme").await;
    let repo = SubscriptionRepository::new(&pool);

    repo.create_pending(merchant_id, 42, "Pro", plan_price(), 0)
        .await
        .unwrap();
    repo.transition_by_charge_id(42, SubscriptionStatus::Declined)
        .await
        .unwrap();

    let after = repo
        .transition_by_charge_id(42, SubscriptionStatus::Active)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.status, SubscriptionStatus::Declined);
    assert!(after.activated_at.is_none());
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn transition_for_unknown_charge_returns_none(pool: PgPool) {
    let repo = SubscriptionRepository::new(&pool);

    let result = repo
        .transition_by_charge_id(9999, SubscriptionStatus::Active)
        .await
        .unwrap();
    assert!(result.is_none());
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn second_open_subscription_is_a_conflict(pool: PgPool) {
    let merchant_id = seed_merchant(&pool, "acme").await;
    let repo = SubscriptionRepository::new(&pool);

    repo.create_pending(merchant_id, 42, "Pro", plan_price(), 0)
        .await
        .unwrap();

    // A second charge for the same merchant while one is open.
    let result = repo
        .create_pending(merchant_id, 43, "Pro", plan_price(), 0)
        .await;
    assert!(matches!(result, Err(RepositoryError::Conflict(_))));
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn closed_subscription_frees_the_merchant_for_a_new_charge(pool: PgPool) {
    let merchant_id = seed_merchant(&pool, "acme").await;
    let repo = SubscriptionRepository::new(&pool);

    repo.create_pending(merchant_id, 42, "Pro", plan_price(), 0)
        .await
        .unwrap();
    repo.transition_by_charge_id(42, SubscriptionStatus::Active)
        .await
        .unwrap();
    repo.transition_by_charge_id(42, SubscriptionStatus::Cancelled)
        .await
        .unwrap();

    let fresh = repo
        .create_pending(merchant_id, 43, "Pro", plan_price(), 0)
        .await
        .unwrap();
    assert_eq!(fresh.status, SubscriptionStatus::Pending);
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn open_lookup_sees_pending_and_active_only(pool: PgPool) {
    let merchant_id = seed_merchant(&pool, "acme").await;
    let repo = SubscriptionRepository::new(&pool);

    assert!(repo.get_open_for_merchant(merchant_id).await.unwrap().is_none());

    repo.create_pending(merchant_id, 42, "Pro", plan_price(), 0)
        .await
        .unwrap();
    let open = repo.get_open_for_merchant(merchant_id).await.unwrap().unwrap();
    assert_eq!(open.status, SubscriptionStatus::Pending);

    repo.transition_by_charge_id(42, SubscriptionStatus::Active)
        .await
        .unwrap();
    let open = repo.get_open_for_merchant(merchant_id).await.unwrap().unwrap();
    assert_eq!(open.status, SubscriptionStatus::Active);

    repo.transition_by_charge_id(42, SubscriptionStatus::Cancelled)
        .await
        .unwrap();
    assert!(repo.get_open_for_merchant(merchant_id).await.unwrap().is_none());
}
