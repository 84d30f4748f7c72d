//! Database migration command.
//!
//! Migrations live in `crates/gateway/migrations/` and are embedded at
//! compile time; the gateway itself never runs them on startup.

use super::{CommandError, connect};

/// Run gateway database migrations.
///
/// # Errors
///
/// Returns `CommandError` if the database is unreachable or a migration
/// fails.
pub async fn run() -> Result<(), CommandError> {
    tracing::info!("Connecting to gateway database...");
    let pool = connect().await?;

    tracing::info!("Running gateway migrations...");
    sqlx::migrate!("../gateway/migrations").run(&pool).await?;

    tracing::info!("Gateway migrations complete!");
    Ok(())
}
