//! Implementation of the `multichat run` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, CoordinatorState};
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::Logger;
use crate::infrastructure::process::CommandLauncher;
use crate::services::{write_status_token, Coordinator};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Merged feed path (overrides feed.output_path)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Feed capacity (overrides feed.max_messages)
    #[arg(short, long, value_parser = parse_max_messages)]
    pub max_messages: Option<usize>,
}

fn parse_max_messages(value: &str) -> Result<usize, String> {
    let parsed: usize = value.parse().map_err(|e| format!("{e}"))?;
    if parsed == 0 {
        return Err("must be at least 1".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub feed_path: PathBuf,
    pub feed_items: usize,
    pub sources: usize,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        format!(
            "Stopped. {} item(s) from {} source(s) left in {}",
            self.feed_items,
            self.sources,
            self.feed_path.display()
        )
    }
}

/// Apply command-line overrides on top of the loaded configuration.
pub fn apply_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(ref path) = args.output {
        config.feed.output_path.clone_from(path);
    }
    if let Some(max) = args.max_messages {
        config.feed.max_messages = max;
    }
}

pub async fn execute(args: RunArgs, config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let mut config = ConfigLoader::load_unvalidated(config_path)?;
    apply_overrides(&mut config, &args);

    let _logger = Logger::init(&config.logging)?;

    if let Err(e) = ConfigLoader::validate(&config) {
        write_status_token(&config.status.path, &CoordinatorState::Error(e.to_string())).await;
        return Err(e).context("Invalid configuration");
    }

    let launcher = Arc::new(CommandLauncher::from_config(&config.supervisor));
    let feed_path = config.feed.output_path.clone();
    let sources = config.active_sources().len();

    let mut coordinator = Coordinator::new(config, launcher)?;
    if let Some(path) = config_path {
        coordinator = coordinator.with_config_path(path);
    }

    info!(sources, feed = %feed_path.display(), "multichat starting");
    coordinator
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for Ctrl-C, running until killed");
                std::future::pending::<()>().await;
            }
        })
        .await;

    let feed_items = coordinator.feed().read().await.len();
    output(
        &RunOutput {
            feed_path,
            feed_items,
            sources,
        },
        json_mode,
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_max_messages() {
        assert_eq!(parse_max_messages("25"), Ok(25));
        assert!(parse_max_messages("0").is_err());
        assert!(parse_max_messages("many").is_err());
    }

    #[test]
    fn test_apply_overrides() {
        let mut config = Config::default();
        apply_overrides(
            &mut config,
            &RunArgs {
                output: Some(PathBuf::from("/tmp/feed.json")),
                max_messages: Some(12),
            },
        );
        assert_eq!(config.feed.output_path, PathBuf::from("/tmp/feed.json"));
        assert_eq!(config.feed.max_messages, 12);

        let before = config.clone();
        apply_overrides(
            &mut config,
            &RunArgs {
                output: None,
                max_messages: None,
            },
        );
        assert_eq!(config.feed.output_path, before.feed.output_path);
    }
}
