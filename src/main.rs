use anyhow::Context;
use clap::Parser;
use wsmux::adapter::inbound::cli::command::{Cli, Commands};
use wsmux::adapter::inbound::cli::{check, run};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => {
            // A second install attempt only fails if a provider is already set.
            let _ = rustls::crypto::ring::default_provider().install_default();
            run::execute(&args)
                .await
                .with_context(|| format!("wsmux run failed (config: {})", args.config.display()))?;
        }
        Commands::Check(args) => {
            check::execute(&args)
                .with_context(|| format!("invalid configuration: {}", args.config.display()))?;
        }
    }

    Ok(())
}
