//! Database management commands

use accredo_db::{DatabaseConfig, DatabasePool};
use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TABLES: [&str; 9] = [
    "accounts",
    "issuers",
    "credentials",
    "proposals",
    "votes",
    "timelock_entries",
    "governance_params",
    "governance_clock",
    "audit_log",
];

fn config_for(database_url: Option<String>) -> DatabaseConfig {
    match database_url {
        Some(url) => DatabaseConfig::new(url),
        None => DatabaseConfig::from_env(),
    }
}

fn spinner(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

/// Run database migrations
pub async fn migrate(database_url: Option<String>) -> Result<()> {
    let config = config_for(database_url);

    let bar = spinner("Connecting to database...");
    let pool = DatabasePool::new(&config)
        .await
        .context("connecting to database")?;

    bar.set_message("Running migrations...");
    let result = pool.run_migrations().await;
    bar.finish_and_clear();
    result.context("running migrations")?;

    let applied = pool.applied_migrations().await?;
    println!(
        "{} {} migration(s) applied",
        style("✓").green(),
        applied.len()
    );
    pool.close().await;

    Ok(())
}

/// Show database status
pub async fn status(database_url: Option<String>) -> Result<()> {
    let config = config_for(database_url);

    let bar = spinner("Connecting to database...");
    let pool = DatabasePool::new(&config).await;
    bar.finish_and_clear();
    let pool = match pool {
        Ok(pool) => pool,
        Err(e) => {
            println!("{} {}", style("Failed to connect:").red(), e);
            return Ok(());
        }
    };

    match pool.health_check().await {
        Ok(true) => println!("Database: {}", style("connected").green()),
        Ok(false) => println!("Database: {}", style("unhealthy").yellow()),
        Err(e) => println!("Database: {} - {}", style("error").red(), e),
    }

    let stats = pool.stats();
    println!("Pool size: {}", stats.size);
    println!("Idle connections: {}", stats.idle);

    match pool.applied_migrations().await {
        Ok(versions) => println!("Migrations: {versions:?}"),
        Err(_) => println!("Migrations: {}", style("none applied").yellow()),
    }

    println!("\nTable counts:");
    for table in TABLES {
        match sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool.pool())
            .await
        {
            Ok(count) => println!("  {table}: {count}"),
            Err(_) => println!("  {table}: (table not found)"),
        }
    }

    pool.close().await;
    Ok(())
}
