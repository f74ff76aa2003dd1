use anyhow::Context;
use clap::Parser;
use spreadwatch::cli::{self, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => cli::run::execute(&args)
            .await
            .with_context(|| format!("run failed ({})", args.config.display())),
        Commands::CheckConfig(args) => cli::check::execute_config(&args.config)
            .with_context(|| format!("invalid configuration ({})", args.config.display())),
    }
}
