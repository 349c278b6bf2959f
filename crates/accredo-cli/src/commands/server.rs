//! Server command - starts the Accredo HTTP API

use accredo_server::config::ServerConfig;
use anyhow::{Context, Result};
use console::style;

pub async fn run(config_path: Option<&str>) -> Result<()> {
    let config = match config_path {
        Some(path) => ServerConfig::load_file(path),
        None => ServerConfig::load(),
    }
    .context("loading configuration")?;

    println!("\n{}", style("Accredo governance server").cyan().bold());
    println!("  Bind:      {}", style(&config.bind).green());
    println!(
        "  Storage:   {}",
        if config.database_url.is_some() {
            style("PostgreSQL").green()
        } else {
            style("in-memory").yellow()
        }
    );
    println!(
        "  Chain:     {}",
        match &config.chain {
            Some(chain) => style(chain.rpc_url.as_str()).green(),
            None => style("disabled").yellow(),
        }
    );
    println!("  Admins:    {}", config.bootstrap_admins.len());
    println!();

    accredo_server::run(config).await
}
