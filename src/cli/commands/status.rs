//! Implementation of the `multichat status` command.
//!
//! Works from the outside: it reads the status token, the feed and each
//! source artifact, so it can inspect a coordinator running elsewhere.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::time::SystemTime;

use crate::cli::models::{Liveness, SourceReport, StatusReport};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::{Config, SourceConfig};
use crate::infrastructure::artifact::{artifact_path, read_artifact};
use crate::infrastructure::config::ConfigLoader;

impl CommandOutput for StatusReport {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Status: {}",
            self.status.as_deref().unwrap_or("unknown (no status file)")
        )];
        lines.push(match self.feed_items {
            Some(n) => format!("Feed:   {n} item(s) in {}", self.feed_path.display()),
            None => format!("Feed:   {} not readable", self.feed_path.display()),
        });

        if self.sources.is_empty() {
            lines.push("\nNo sources configured".to_string());
        } else {
            lines.push(String::new());
            lines.push(TableFormatter::new().format_sources(&self.sources));
        }
        lines.join("\n")
    }
}

async fn inspect_source(source: &SourceConfig, artifact_dir: &Path) -> SourceReport {
    let id = source.id();
    let artifact = artifact_path(artifact_dir, &id);
    let metadata = tokio::fs::metadata(&artifact).await.ok();

    let (items, size_bytes, modified_at, idle_secs, liveness) = match metadata {
        Some(meta) => {
            let modified = meta.modified().ok();
            let idle_secs = modified
                .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                .map_or(0, |age| age.as_secs());
            let items = read_artifact(&artifact)
                .await
                .ok()
                .flatten()
                .map(|snapshot| snapshot.len());
            (
                items,
                Some(meta.len()),
                modified.map(DateTime::<Utc>::from),
                Some(idle_secs),
                Liveness::from_idle_secs(idle_secs),
            )
        }
        None => (None, None, None, None, Liveness::Missing),
    };

    SourceReport {
        id,
        name: source.name.clone(),
        prefix: source.prefix.clone(),
        enabled: source.enabled,
        artifact,
        items,
        size_bytes,
        modified_at,
        idle_secs,
        liveness,
    }
}

/// Build the report for `config` from what is on disk.
pub async fn collect(config: &Config) -> StatusReport {
    let status = tokio::fs::read_to_string(&config.status.path)
        .await
        .ok()
        .map(|s| s.trim().to_string());

    let feed_items = tokio::fs::read_to_string(&config.feed.output_path)
        .await
        .ok()
        .and_then(|content| serde_json::from_str::<Vec<serde_json::Value>>(&content).ok())
        .map(|items| items.len());

    let mut sources = Vec::with_capacity(config.sources.len());
    for source in config.sources.iter().filter(|s| s.is_valid()) {
        sources.push(inspect_source(source, &config.supervisor.artifact_dir).await);
    }

    StatusReport {
        status,
        feed_path: config.feed.output_path.clone(),
        feed_items,
        sources,
    }
}

pub async fn execute(config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_unvalidated(config_path)?;
    let report = collect(&config).await;
    output(&report, json_mode);
    Ok(())
}
