//! Handler for the `check-config` command.

use std::path::Path;

use crate::config::Config;
use crate::error::Result;
use crate::exchange::ExchangeFactory;

/// Validate a configuration file without starting the engine.
pub fn execute_config<P: AsRef<Path>>(config_path: P) -> Result<()> {
    let path = config_path.as_ref();
    println!("Checking configuration: {}", path.display());
    println!();

    let config = Config::load(path)?;
    println!("✓ Configuration file is valid");
    println!();
    println!("Summary:");
    println!("  Mode: {}", if config.paper.enabled { "paper" } else { "live" });
    println!(
        "  Min profit: {}%  Max per trade: {}%  Max concurrent: {}",
        config.risk.min_profit_percentage,
        config.risk.max_capital_per_trade_percentage,
        config.risk.max_concurrent_trades
    );
    println!("  Execution timeout: {}ms", config.execution.timeout_ms);
    println!();

    println!("Venues:");
    for venue in &config.venues {
        match ExchangeFactory::create(venue) {
            Ok(_) => println!("  ✓ {} ({:?})", venue.id, venue.kind),
            Err(e) => println!("  ⚠ {}: {e}", venue.id),
        }
    }
    println!();

    println!("Pairs:");
    for (pair, venues) in &config.pairs {
        let names: Vec<_> = venues.iter().map(ToString::to_string).collect();
        println!("  {pair}: {}", names.join(", "));
        if venues.len() < 2 {
            println!("    ⚠ fewer than two venues, no cross-venue spread possible");
        }
    }

    if config.paper.enabled && config.paper.balances.is_empty() {
        println!();
        println!("⚠ Paper trading is enabled but no paper balances are configured");
    }

    println!();
    println!("Configuration is ready to use.");
    Ok(())
}
