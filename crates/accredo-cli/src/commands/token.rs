//! Token command - mint API bearer tokens from the server secret

use accredo_core::WalletAddress;
use accredo_server::auth::JwtKeys;
use accredo_server::config::ServerConfig;
use anyhow::{bail, Context, Result};
use console::style;

pub fn issue(address: &str, ttl_hours: i64) -> Result<()> {
    if ttl_hours <= 0 {
        bail!("ttl must be at least one hour");
    }
    let address = WalletAddress::parse(address).context("invalid wallet address")?;
    let config = ServerConfig::load().context("loading configuration")?;

    let keys = JwtKeys::new(config.jwt_secret.as_bytes(), &config.jwt_issuer);
    let token = keys.issue(&address, chrono::Duration::hours(ttl_hours))?;

    eprintln!(
        "{} token for {} valid {}h",
        style("Issued").green(),
        style(address).cyan(),
        ttl_hours
    );
    println!("{token}");
    Ok(())
}
