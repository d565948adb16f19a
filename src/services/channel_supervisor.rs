//! Channel supervisor
//!
//! Owns one worker process and one intake reader per source. Starts and
//! stops them together, restarts a single source behind a per-source
//! cooldown, and reports per-source liveness.

use futures::future::join_all;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::domain::errors::{SupervisorError, SupervisorResult};
use crate::domain::models::{IntakeConfig, SourceConfig, SourceId, SourceStatus, SupervisorConfig};
use crate::domain::ports::{Termination, WorkerExit, WorkerLauncher, WorkerProcess};
use crate::infrastructure::artifact::{self, artifact_path};
use crate::services::intake_reader::{IntakeReader, RestartRequests, SourceActivity};
use crate::services::merge_scheduler::FeedState;
use crate::services::persistence_writer::PersistenceWriter;
use crate::services::source_queue::SourceQueues;
use crate::services::stop_flag::StopFlag;
use crate::services::timers::Cooldown;

/// Result of a restart request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartOutcome {
    Restarted,
    /// Refused; the source was restarted too recently
    CoolingDown { remaining: Duration },
}

/// A running source: its worker, artifact and reader
struct WorkerHandle {
    source: SourceConfig,
    process: Box<dyn WorkerProcess>,
    artifact: PathBuf,
    activity: Arc<SourceActivity>,
    last_restart: Instant,
    reader_stop: StopFlag,
    reader: JoinHandle<()>,
    last_exit: Option<WorkerExit>,
}

impl WorkerHandle {
    fn id(&self) -> SourceId {
        self.source.id()
    }

    /// Poll the process and record an exit the first time it is seen.
    fn refresh(&mut self) -> bool {
        if self.last_exit.is_some() {
            return false;
        }
        match self.process.try_exit() {
            Ok(None) => true,
            Ok(Some(exit)) => {
                warn!(source = %self.id(), exit_code = ?exit.code, "Worker process exited");
                self.last_exit = Some(exit);
                self.activity.set_alive(false);
                false
            }
            Err(e) => {
                warn!(source = %self.id(), error = %e, "Failed to poll worker process");
                self.activity.set_alive(false);
                false
            }
        }
    }
}

/// Supervises the worker processes of all sources
pub struct ChannelSupervisor {
    launcher: Arc<dyn WorkerLauncher>,
    config: SupervisorConfig,
    intake: IntakeConfig,
    queues: Arc<SourceQueues>,
    restarts: Arc<RestartRequests>,
    feed: Arc<RwLock<FeedState>>,
    writer: PersistenceWriter,
    stop: StopFlag,
    started_once: AtomicBool,
    sources: Mutex<Vec<SourceConfig>>,
    cooldown: Mutex<Cooldown<SourceId>>,
    workers: tokio::sync::Mutex<BTreeMap<SourceId, WorkerHandle>>,
}

impl ChannelSupervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        launcher: Arc<dyn WorkerLauncher>,
        config: SupervisorConfig,
        intake: IntakeConfig,
        queues: Arc<SourceQueues>,
        restarts: Arc<RestartRequests>,
        feed: Arc<RwLock<FeedState>>,
        writer: PersistenceWriter,
    ) -> Self {
        let cooldown = Cooldown::new(config.restart_cooldown());
        Self {
            launcher,
            config,
            intake,
            queues,
            restarts,
            feed,
            writer,
            stop: StopFlag::new(),
            started_once: AtomicBool::new(false),
            sources: Mutex::new(Vec::new()),
            cooldown: Mutex::new(cooldown),
            workers: tokio::sync::Mutex::new(BTreeMap::new()),
        }
    }

    pub fn queues(&self) -> &Arc<SourceQueues> {
        &self.queues
    }

    pub fn restart_requests(&self) -> &Arc<RestartRequests> {
        &self.restarts
    }

    /// Configured sources that are eligible to run, in config order.
    pub fn sources(&self) -> Vec<SourceConfig> {
        self.sources
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start a worker and reader for every enabled source.
    ///
    /// The first start also clears the published feed. A source that fails
    /// to start is logged and skipped. Returns the number started.
    pub async fn start(&self, sources: &[SourceConfig]) -> usize {
        self.stop.reset();

        if !self.started_once.swap(true, Ordering::SeqCst) {
            let revision = {
                let mut feed = self.feed.write().await;
                feed.clear();
                feed.revision()
            };
            if let Err(e) = self.writer.publish(&[], revision).await {
                warn!(error = %e, "Failed to clear feed artifact");
            }
        }

        let eligible: Vec<SourceConfig> = sources
            .iter()
            .filter(|s| s.enabled && s.is_valid())
            .cloned()
            .collect();
        *self.sources.lock().unwrap_or_else(PoisonError::into_inner) = eligible.clone();

        let mut started = 0;
        for source in &eligible {
            match self.spawn_source(source).await {
                Ok(()) => started += 1,
                Err(e) => error!(source = %source.id(), error = %e, "Failed to start source"),
            }
        }

        info!(started, total = eligible.len(), "Sources started");
        started
    }

    async fn spawn_source(&self, source: &SourceConfig) -> SupervisorResult<()> {
        let id = source.id();
        let path = artifact_path(&self.config.artifact_dir, &id);
        artifact::source_log::create_fresh(&path)
            .await
            .map_err(|error| SupervisorError::Artifact {
                path: path.clone(),
                error,
            })?;

        let process = self
            .launcher
            .launch(source, &path)
            .map_err(|error| SupervisorError::Spawn {
                source_id: id.clone(),
                error,
            })?;

        let activity = Arc::new(SourceActivity::new());
        let reader_stop = StopFlag::new();
        let reader = IntakeReader::new(
            source.clone(),
            path.clone(),
            self.queues.get_or_create(&id),
            Arc::clone(&activity),
            Arc::clone(&self.restarts),
            self.intake.clone(),
        );
        let reader = tokio::spawn(reader.run(self.stop.clone(), reader_stop.clone()));

        info!(source = %id, name = %source.name, pid = ?process.pid(), "Source started");

        let handle = WorkerHandle {
            source: source.clone(),
            process,
            artifact: path,
            activity,
            last_restart: Instant::now(),
            reader_stop,
            reader,
            last_exit: None,
        };
        self.workers.lock().await.insert(id, handle);
        Ok(())
    }

    async fn shutdown_handle(&self, mut handle: WorkerHandle) {
        let id = handle.id();
        handle.reader_stop.stop();
        handle.reader.abort();

        match handle.process.terminate(self.config.grace_period()).await {
            Ok(Termination::Forced) => warn!(source = %id, "Worker killed after grace period"),
            Ok(Termination::Graceful(exit)) => {
                debug!(source = %id, exit_code = ?exit.code, "Worker stopped");
            }
            Ok(Termination::AlreadyExited(exit)) => {
                debug!(source = %id, exit_code = ?exit.code, "Worker had already exited");
            }
            Err(e) => warn!(source = %id, error = %e, "Failed to terminate worker"),
        }

        if let Err(e) = artifact::source_log::remove(&handle.artifact).await {
            warn!(source = %id, path = %handle.artifact.display(), error = %e, "Failed to remove artifact");
        }
    }

    /// Stop every worker and reader, remove their artifacts and flush the feed.
    pub async fn stop(&self) {
        self.stop.stop();

        let handles = std::mem::take(&mut *self.workers.lock().await);
        let count = handles.len();
        join_all(handles.into_values().map(|h| self.shutdown_handle(h))).await;
        info!(stopped = count, "All sources stopped");

        let (items, revision) = self.feed.read().await.snapshot();
        if !items.is_empty() {
            match self.writer.publish(&items, revision).await {
                Ok(Some(_)) => debug!(items = items.len(), revision, "Final feed flush"),
                Ok(None) => debug!(revision, "Feed already flushed at a newer revision"),
                Err(e) => warn!(error = %e, "Final feed flush failed"),
            }
        }
    }

    /// Replace the worker of one source, unless it is cooling down.
    ///
    /// The attempt starts a new cooldown even if the replacement fails to
    /// spawn. The source's queue is kept.
    pub async fn restart(&self, id: &SourceId) -> SupervisorResult<RestartOutcome> {
        let source = self
            .sources()
            .into_iter()
            .find(|s| &s.id() == id)
            .ok_or_else(|| SupervisorError::UnknownSource(id.clone()))?;

        let acquired = self
            .cooldown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_acquire(id);
        if let Err(remaining) = acquired {
            info!(
                source = %id,
                remaining_secs = remaining.as_secs(),
                "Restart skipped, source is cooling down"
            );
            return Ok(RestartOutcome::CoolingDown { remaining });
        }

        let previous = self.workers.lock().await.remove(id);
        if let Some(handle) = previous {
            warn!(
                source = %id,
                name = %source.name,
                uptime_secs = handle.last_restart.elapsed().as_secs(),
                "Restarting source"
            );
            self.shutdown_handle(handle).await;
        } else {
            warn!(source = %id, name = %source.name, "Starting source that had no worker");
        }

        self.spawn_source(&source).await?;
        Ok(RestartOutcome::Restarted)
    }

    /// Per-source snapshot in config order, including sources that failed
    /// to start.
    pub async fn status(&self) -> Vec<SourceStatus> {
        let sources = self.sources();
        let mut workers = self.workers.lock().await;

        sources
            .iter()
            .map(|source| {
                let id = source.id();
                let (queue_depth, shed_total) = self
                    .queues
                    .get(&id)
                    .map_or((0, 0), |q| (q.len(), q.shed_total()));
                match workers.get_mut(&id) {
                    Some(handle) => {
                        let alive = handle.refresh();
                        SourceStatus {
                            name: source.name.clone(),
                            prefix: source.prefix.clone(),
                            alive,
                            pid: if alive { handle.process.pid() } else { None },
                            exit_code: handle.last_exit.and_then(|e| e.code),
                            queue_depth,
                            shed_total,
                            idle_secs: handle.activity.idle().as_secs(),
                            id,
                        }
                    }
                    None => SourceStatus {
                        name: source.name.clone(),
                        prefix: source.prefix.clone(),
                        alive: false,
                        pid: None,
                        exit_code: None,
                        queue_depth,
                        shed_total,
                        idle_secs: 0,
                        id,
                    },
                }
            })
            .collect()
    }

    /// Number of sources with a handle, alive or not.
    pub async fn worker_count(&self) -> usize {
        self.workers.lock().await.len()
    }
}
