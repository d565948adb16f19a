//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::run::RunArgs;

#[derive(Parser, Debug)]
#[command(name = "multichat")]
#[command(about = "multichat - merge live chat from several sources into one feed", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .multichat/config.yaml + local.yaml)
    #[arg(short, long, global = true, env = "MULTICHAT_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the coordinator until interrupted
    Run(RunArgs),

    /// Show the status token and per-source artifact activity
    Status,

    /// Validate configuration and the runtime environment
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "multichat",
            "run",
            "--output",
            "feed.json",
            "--max-messages",
            "30",
            "--config",
            "custom.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.yaml")));
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.output, Some(PathBuf::from("feed.json")));
                assert_eq!(args.max_messages, Some(30));
            }
            other => panic!("Expected run command, got {other:?}"),
        }
    }

    #[test]
    fn test_global_json_flag() {
        let cli = Cli::try_parse_from(["multichat", "status", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn test_zero_max_messages_rejected() {
        assert!(Cli::try_parse_from(["multichat", "run", "--max-messages", "0"]).is_err());
    }
}
