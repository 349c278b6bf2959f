//! Status command - show configuration and status

use accredo_server::config::ServerConfig;
use console::style;

pub fn show() {
    println!("\n{}", style("Accredo Status").cyan().bold());
    println!();

    println!("{}", style("Version").bold().underlined());
    println!("  accredo-cli:     {}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            println!("{}", style("Configuration").bold().underlined());
            println!("  {} {}", style("invalid:").red(), e);
            return;
        }
    };

    println!("{}", style("Server").bold().underlined());
    println!("  Bind:            {}", config.bind);
    println!(
        "  Storage:         {}",
        if config.database_url.is_some() {
            style("PostgreSQL").green()
        } else {
            style("in-memory").yellow()
        }
    );
    println!("  CORS origins:    {}", config.cors_origins.join(", "));
    println!("  Bootstrap admins:{:>3}", config.bootstrap_admins.len());
    println!(
        "  Rate limit:      {} req / {}s (+{} burst)",
        config.rate_limit.max_requests, config.rate_limit.window_secs, config.rate_limit.burst
    );
    println!(
        "  Production:      {}",
        if config.production {
            style("yes").green()
        } else {
            style("no").yellow()
        }
    );
    println!();

    let params = &config.governance;
    println!("{}", style("Governance").bold().underlined());
    println!("  Voting delay:    {} blocks", params.voting_delay_blocks);
    println!("  Voting period:   {} blocks", params.voting_period_blocks);
    println!("  Quorum:          {}", params.quorum);
    println!("  Threshold:       {}", params.proposal_threshold);
    println!("  Timelock delay:  {}s", params.timelock_delay_secs);
    println!("  Grace period:    {}s", params.grace_period_secs);
    println!("  Block time:      {}s", params.block_time_secs);
    println!("  Suspension:      {:?}", config.suspension_policy);
    println!();

    println!("{}", style("Chain mirror").bold().underlined());
    match &config.chain {
        Some(chain) => {
            println!("  RPC:             {}", chain.rpc_url);
            println!("  Registry:        {}", chain.registry_contract);
            println!("  Sender:          {}", chain.from_address);
        }
        None => println!("  {}", style("disabled").yellow()),
    }
    println!();

    println!("{}", style("Quick Start").bold().underlined());
    println!("  Start server:    accredo server");
    println!("  Migrate:         accredo db migrate");
    println!("  Issue token:     accredo token issue --address 0x...");
    println!("  Try it out:      accredo demo");
}
