//! Shopgate gateway library.
//!
//! The gateway binary, the CLI maintenance commands, and the
//! integration tests all build on this crate. It owns the trust
//! boundary with the platform:
//!
//! - Shopify OAuth install flow with server-side state nonces
//! - HMAC-verified webhooks with an idempotency ledger
//! - Encrypted credential vault for per-shop access tokens
//! - Recurring billing via `RecurringApplicationCharge`
//! - `PostgreSQL` for all local state (shared across instances)

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod retry;
pub mod routes;
pub mod session_token;
pub mod shopify;
pub mod state;
pub mod vault;
