//! Command-line interface definitions.
//!
//! Defines the CLI structure for the wsmux binary using `clap`: `run` keeps
//! a pool of upstream WebSocket connections open until interrupted, `check`
//! validates a configuration file and prints the effective settings.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Persistent WebSocket connection pool
#[derive(Parser, Debug)]
#[command(name = "wsmux")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the wsmux CLI.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Open the pool against the configured upstream and keep it running
    Run(RunArgs),

    /// Validate configuration and print the effective pool settings
    Check(CheckArgs),
}

/// Arguments for `wsmux run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

/// Arguments for `wsmux check`.
#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// JSON output for scripting
    #[arg(long)]
    pub json: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn check_defaults_to_config_toml() {
        let cli = Cli::parse_from(["wsmux", "check"]);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.config, PathBuf::from("config.toml"));
                assert!(!args.json);
            }
            Commands::Run(_) => panic!("expected check"),
        }
    }

    #[test]
    fn run_accepts_config_path() {
        let cli = Cli::parse_from(["wsmux", "run", "--config", "/etc/wsmux.toml"]);
        assert!(matches!(
            cli.command,
            Commands::Run(RunArgs { config }) if config == PathBuf::from("/etc/wsmux.toml")
        ));
    }
}
