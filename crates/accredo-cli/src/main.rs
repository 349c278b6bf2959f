//! Accredo CLI
//!
//! Command-line interface for the accreditation governance service.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "accredo")]
#[command(author, version, about = "Accredo: DAO-governed credential issuer accreditation", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Accredo server
    Server {
        /// Configuration file (defaults to ./accredo.toml when present)
        #[arg(short, long, env = "ACCREDO_CONFIG")]
        config: Option<String>,
    },

    /// Database management
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Bearer tokens for the HTTP API
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Show configuration and status
    Status,

    /// Walk through an accreditation vote against in-memory state
    Demo,
}

#[derive(Subcommand)]
enum DbAction {
    /// Apply pending migrations
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },

    /// Show connection health and table counts
    Status {
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue a token for a wallet address
    Issue {
        /// Wallet address the token authenticates (0x-prefixed)
        #[arg(short, long)]
        address: String,

        /// Lifetime in hours
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| format!("accredo={log_level},audit=info,tower_http={log_level}")),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Server { config } => {
            commands::server::run(config.as_deref()).await?;
        }
        Commands::Db { action } => match action {
            DbAction::Migrate { database_url } => commands::db::migrate(database_url).await?,
            DbAction::Status { database_url } => commands::db::status(database_url).await?,
        },
        Commands::Token { action } => match action {
            TokenAction::Issue { address, ttl_hours } => {
                commands::token::issue(&address, ttl_hours)?;
            }
        },
        Commands::Status => {
            commands::status::show();
        }
        Commands::Demo => {
            commands::demo::run().await?;
        }
    }

    Ok(())
}
