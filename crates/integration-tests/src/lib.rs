//! Database-backed integration tests for Shopgate.
//!
//! The interesting invariants of the gateway live in SQL (single-use
//! nonces, the webhook idempotency ledger, the guarded billing state
//! machine), so the tests in `tests/` run against a real `PostgreSQL`
//! database via `#[sqlx::test]`. Each test gets its own database with
//! the gateway migrations applied.
//!
//! # Running
//!
//! ```bash
//! # Needs a reachable Postgres server
//! DATABASE_URL=postgres://localhost/shopgate_test \
//!     cargo test -p shopgate-integration-tests
//! ```

pub use shopgate_core;
pub use shopgate_gateway;
