//! Shopgate CLI - Database migrations and maintenance tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! shopgate migrate
//!
//! # Prune expired OAuth nonces and old webhook receipts
//! shopgate prune
//! shopgate prune --receipt-days 30
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `prune` - Remove expired nonces and old webhook receipts

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "shopgate")]
#[command(author, version, about = "Shopgate CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Remove expired OAuth nonces and old webhook receipts
    Prune {
        /// Delete webhook receipts older than this many days
        #[arg(long, default_value_t = 90)]
        receipt_days: i32,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Prune { receipt_days } => commands::prune::run(receipt_days).await?,
    }
    Ok(())
}
