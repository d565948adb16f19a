//! Common test utilities for integration tests
//!
//! Provides a scriptable worker launcher, config fixtures and item builders
//! shared across the integration test files.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use multichat::domain::models::{ChatItem, Config, EnrichedItem, SourceConfig, SourceId};
use multichat::domain::ports::{Termination, WorkerExit, WorkerLauncher, WorkerProcess};

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Call this at the beginning of tests that need logging.
pub fn setup_test_logging() {
    use tracing_subscriber::fmt;

    let _ = fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Shared handle onto one fake worker
#[derive(Debug)]
pub struct FakeWorker {
    pub source: SourceId,
    pub artifact: PathBuf,
    alive: AtomicBool,
    terminated: AtomicBool,
}

impl FakeWorker {
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn was_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Simulate the process dying on its own.
    pub fn crash(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }
}

struct FakeProcess {
    pid: u32,
    worker: Arc<FakeWorker>,
}

#[async_trait]
impl WorkerProcess for FakeProcess {
    fn pid(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn try_exit(&mut self) -> std::io::Result<Option<WorkerExit>> {
        if self.worker.is_alive() {
            Ok(None)
        } else {
            Ok(Some(WorkerExit { code: Some(1) }))
        }
    }

    async fn terminate(&mut self, _grace: Duration) -> std::io::Result<Termination> {
        self.worker.terminated.store(true, Ordering::SeqCst);
        if self.worker.alive.swap(false, Ordering::SeqCst) {
            Ok(Termination::Graceful(WorkerExit { code: Some(0) }))
        } else {
            Ok(Termination::AlreadyExited(WorkerExit { code: Some(1) }))
        }
    }
}

/// Launcher that hands out in-memory workers and records every launch
#[derive(Default)]
pub struct FakeLauncher {
    next_pid: AtomicUsize,
    launched: Mutex<Vec<Arc<FakeWorker>>>,
    failing: Mutex<HashSet<SourceId>>,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_pid: AtomicUsize::new(1000),
            ..Default::default()
        })
    }

    /// Make every launch for `source` fail.
    pub fn fail_for(&self, source: &str) {
        self.failing.lock().unwrap().insert(SourceId::new(source));
    }

    pub fn launches(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub fn launches_for(&self, source: &str) -> usize {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.source.as_str() == source)
            .count()
    }

    /// Most recent worker launched for `source`.
    pub fn latest(&self, source: &str) -> Option<Arc<FakeWorker>> {
        self.launched
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|w| w.source.as_str() == source)
            .cloned()
    }

    pub fn crash_all(&self) {
        for worker in self.launched.lock().unwrap().iter() {
            worker.crash();
        }
    }
}

impl WorkerLauncher for FakeLauncher {
    fn launch(&self, source: &SourceConfig, artifact: &Path) -> std::io::Result<Box<dyn WorkerProcess>> {
        let id = source.id();
        if self.failing.lock().unwrap().contains(&id) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "worker binary missing",
            ));
        }

        let worker = Arc::new(FakeWorker {
            source: id,
            artifact: artifact.to_path_buf(),
            alive: AtomicBool::new(true),
            terminated: AtomicBool::new(false),
        });
        self.launched.lock().unwrap().push(Arc::clone(&worker));

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst) as u32;
        Ok(Box::new(FakeProcess { pid, worker }))
    }
}

/// Config rooted in `dir` with two sources and fast timings.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.sources = vec![
        SourceConfig::new("[YT]", "YouTube", "https://youtube.example/live"),
        SourceConfig::new("[TW]", "Twitch", "twitch_channel"),
    ];
    config.feed.output_path = dir.join("messages.json");
    config.feed.max_messages = 50;
    config.feed.merge_interval_ms = 50;
    config.intake.poll_interval_ms = 20;
    config.supervisor.artifact_dir = dir.join("sources");
    config.supervisor.grace_period_secs = 1;
    config.supervisor.full_restart_delay_secs = 1;
    config.status.path = dir.join("status.txt");
    config
}

pub fn source(prefix: &str) -> SourceConfig {
    SourceConfig::new(prefix, prefix.trim_matches(['[', ']']), "target")
}

/// Build an enriched item for `prefix` with `id` at `timestamp`.
pub fn item(prefix: &str, id: &str, timestamp: i64) -> EnrichedItem {
    EnrichedItem::enrich(
        ChatItem::new(id, "viewer", format!("message {id}"), timestamp),
        &source(prefix),
    )
}

/// One artifact record line as a worker would append it.
pub fn artifact_line(id: &str, timestamp: i64) -> String {
    format!(
        r#"{{"id":"{id}","author":{{"name":"viewer"}},"text":"message {id}","timestamp":{timestamp}}}"#
    )
}

/// Append complete records to an artifact.
pub fn append_records(path: &Path, records: &[(&str, i64)]) {
    use std::io::Write;

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .expect("Failed to open artifact");
    for (id, ts) in records {
        writeln!(file, "{}", artifact_line(id, *ts)).expect("Failed to append record");
    }
}

/// Poll `predicate` every 10ms until it holds or `timeout_ms` passes.
pub async fn wait_for<F>(mut predicate: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}
