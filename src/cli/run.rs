//! Handler for the `run` command.

use std::fs::OpenOptions;

use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use crate::app::{Engine, JsonLinesSink, SinkRegistry};
use crate::cli::RunArgs;
use crate::config::Config;
use crate::error::Result;

/// Execute the run command.
pub async fn execute(args: &RunArgs) -> Result<()> {
    let mut config = Config::load(&args.config)?;

    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.format = "json".to_string();
    }
    config.init_logging();

    let mut sinks = SinkRegistry::new();
    if let Some(ref path) = args.jsonl {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        sinks.register(Box::new(JsonLinesSink::new(file)));
        info!(path = %path.display(), "Writing JSON lines output");
    }

    let engine = Engine::from_config(&config, args.live, sinks)?;
    info!(
        live = args.live,
        venues = config.venues.len(),
        pairs = config.pairs.len(),
        "spreadwatch starting"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl-C"),
        }
        let _ = shutdown_tx.send(true);
    });

    engine.run(shutdown_rx).await;
    info!("spreadwatch stopped");
    Ok(())
}
