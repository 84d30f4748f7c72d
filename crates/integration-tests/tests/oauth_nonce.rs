//! Single-use guarantees of the OAuth state nonce store.

#![allow(clippy::unwrap_used)]

use sqlx::PgPool;

use shopgate_core::ShopDomain;
use shopgate_gateway::db::OAuthNonceRepository;

#[sqlx::test(migrations = "../gateway/migrations")]
async fn nonce_is_single_use(pool: PgPool) {
    let shop = ShopDomain::parse("acme").unwrap();
    let repo = OAuthNonceRepository::new(&pool);
    let nonce = uuid::Uuid::new_v4().to_string();

    repo.issue(&nonce, &shop).await.unwrap();
    assert!(repo.consume(&nonce, &shop).await.unwrap());

    // A replayed callback carries the same state value; the row is gone.
    assert!(!repo.consume(&nonce, &shop).await.unwrap());
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn nonce_is_bound_to_issuing_shop(pool: PgPool) {
    let issued_for = ShopDomain::parse("acme").unwrap();
    let other = ShopDomain::parse("mallory").unwrap();
    let repo = OAuthNonceRepository::new(&pool);
    let nonce = uuid::Uuid::new_v4().to_string();

    repo.issue(&nonce, &issued_for).await.unwrap();

    // A callback naming a different shop must not consume it.
    assert!(!repo.consume(&nonce, &other).await.unwrap());

    // The nonce stays valid for the shop it was issued to.
    assert!(repo.consume(&nonce, &issued_for).await.unwrap());
}

#[sqlx::test(migrations = "../gateway/migrations")]
async fn unknown_nonce_is_rejected(pool: PgPool) {
    let shop = ShopDomain::parse("acme").unwrap();
    let repo = OAuthNonceRepository::new(&pool);

    assert!(!repo.consume("never-issued", &shop).await.unwrap());
}
