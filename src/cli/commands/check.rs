//! Implementation of the `multichat check` command.

use anyhow::{bail, Result};
use std::env;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::cli::models::{CheckItem, CheckReport};
use crate::cli::output::{output, CommandOutput, TableFormatter};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

impl CommandOutput for CheckReport {
    fn to_human(&self) -> String {
        let summary = if self.passed() {
            "All checks passed".to_string()
        } else {
            format!("{} check(s) failed", self.failures())
        };
        format!(
            "{}\n{summary}",
            TableFormatter::new().format_checks(&self.checks)
        )
    }
}

/// Locate `command` the way a spawn would: as a path when it contains a
/// separator, otherwise through `PATH`.
pub fn resolve_command(command: &str) -> Option<PathBuf> {
    let candidate = Path::new(command);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }

    let path_var = env::var_os("PATH")?;
    env::split_paths(&path_var)
        .map(|dir| dir.join(command))
        .find(|full| full.is_file())
}

/// Check that files can be created in `dir`, creating it if needed.
pub async fn probe_writable(dir: &Path) -> Result<(), String> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| format!("cannot create: {e}"))?;
    let probe = dir.join(format!(".multichat-probe-{}", Uuid::new_v4()));
    tokio::fs::write(&probe, b"probe")
        .await
        .map_err(|e| format!("not writable: {e}"))?;
    // Best effort.
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Run every diagnostic against `config`.
pub async fn diagnose(config: &Config) -> CheckReport {
    let mut checks = Vec::new();

    match ConfigLoader::validate(config) {
        Ok(()) => checks.push(CheckItem::pass("configuration", "valid")),
        Err(e) => checks.push(CheckItem::fail("configuration", e.to_string())),
    }

    for source in &config.sources {
        let name = format!("source {}", source.prefix);
        let item = match source.validation_error() {
            Some(problem) => CheckItem::fail(name, problem),
            None if !source.enabled => CheckItem::pass(name, format!("{} (disabled)", source.name)),
            None => CheckItem::pass(name, format!("{} -> {}", source.name, source.target)),
        };
        checks.push(item);
    }

    let command = &config.supervisor.worker_command;
    checks.push(match resolve_command(command) {
        Some(path) => CheckItem::pass("worker command", path.display().to_string()),
        None => CheckItem::fail("worker command", format!("'{command}' not found")),
    });

    let directories = [
        ("feed directory", parent_dir(&config.feed.output_path)),
        ("artifact directory", config.supervisor.artifact_dir.clone()),
        ("status directory", parent_dir(&config.status.path)),
    ];
    for (name, dir) in directories {
        checks.push(match probe_writable(&dir).await {
            Ok(()) => CheckItem::pass(name, dir.display().to_string()),
            Err(problem) => CheckItem::fail(name, format!("{}: {problem}", dir.display())),
        });
    }

    CheckReport { checks }
}

pub async fn execute(config_path: Option<&Path>, json_mode: bool) -> Result<()> {
    let config = ConfigLoader::load_unvalidated(config_path)?;
    let report = diagnose(&config).await;
    output(&report, json_mode);

    if !report.passed() {
        bail!("{} check(s) failed", report.failures());
    }
    Ok(())
}
