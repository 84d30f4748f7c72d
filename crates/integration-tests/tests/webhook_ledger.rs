//! Idempotency ledger for at-least-once webhook delivery.

#![allow(clippy::unwrap_used)]

use sqlx::PgPool;

use shopgate_core::ShopDomain;
use shopgate_gateway::db::WebhookReceiptRepository;

#[sqlx::test(migrations = "../gateway/migrations")]
async fn duplicate_delivery_id_is_detected(pool: PgPool) {
    let shop = ShopDomain::parse("acme").unwrap();
    let repo = WebhookReceiptRepository::new(&pool);

    assert!(repo.record("delivery-1", "app/uninstalled", &shop).await.unwrap());

    // Redelivery of the same id, even under a different topic, is a dup.
    assert!(!repo.record("delivery-1", "app/uninstalled", &shop).await.unwrap());
    assert!(!repo.record("delivery-1", "shop/redact", &shop).await.unwrap());
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn distinct_delivery_ids_are_independent(pool: PgPool) {
    let shop = ShopDomain::parse("acme").unwrap();
    let repo = WebhookReceiptRepository::new(&pool);

    assert!(repo.record("delivery-1", "app/uninstalled", &shop).await.unwrap());
    assert!(repo.record("delivery-2", "app/uninstalled", &shop).await.unwrap());
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn prune_keeps_recent_receipts(pool: PgPool) {
    let shop = ShopDomain::parse("acme").unwrap();
    let repo = WebhookReceiptRepository::new(&pool);

    repo.record("delivery-1", "app/uninstalled", &shop).await.unwrap();
    assert_eq!(repo.prune_older_than_days(90).await.unwrap(), 0);

    // The fresh receipt still dedups after the prune.
    assert!(!repo.record("delivery-1", "app/uninstalled", &shop).await.unwrap());
}
