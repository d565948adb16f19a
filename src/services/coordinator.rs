//! Coordinator
//!
//! Wires the supervisor, merge scheduler and status reporter together and
//! runs the monitor loop: dead or stalled sources are restarted subject to
//! their cooldown, and a total outage triggers a restart of every source.

use std::collections::BTreeSet;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::domain::models::{Config, CoordinatorState, SourceId};
use crate::domain::ports::WorkerLauncher;
use crate::infrastructure::config::{ConfigError, ConfigLoader};
use crate::services::channel_supervisor::{ChannelSupervisor, RestartOutcome};
use crate::services::intake_reader::RestartRequests;
use crate::services::merge_scheduler::{FeedState, MergeScheduler};
use crate::services::persistence_writer::PersistenceWriter;
use crate::services::source_queue::SourceQueues;
use crate::services::status_reporter::StatusReporter;
use crate::services::stop_flag::StopFlag;
use crate::services::timers::Cooldown;

/// What one monitor tick did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonitorReport {
    pub alive: usize,
    pub total: usize,
    pub restarted: Vec<SourceId>,
    pub cooling_down: Vec<SourceId>,
    pub full_restart: bool,
}

/// Top-level run loop of the aggregation service
pub struct Coordinator {
    config: Config,
    config_path: Option<PathBuf>,
    supervisor: Arc<ChannelSupervisor>,
    scheduler: Arc<MergeScheduler>,
    feed: Arc<RwLock<FeedState>>,
    reporter: StatusReporter,
    full_restart_gate: Cooldown<()>,
    stop: StopFlag,
}

impl Coordinator {
    /// Validate `config` and assemble the components.
    pub fn new(config: Config, launcher: Arc<dyn WorkerLauncher>) -> Result<Self, ConfigError> {
        ConfigLoader::validate(&config)?;

        let active = config.active_sources();
        let capacity = config.feed_capacity(active.len());
        info!(
            sources = active.len(),
            capacity,
            output = %config.feed.output_path.display(),
            "Coordinator configured"
        );

        let queues = Arc::new(SourceQueues::new(
            config.intake.queue_soft_limit,
            config.intake.queue_shed_batch,
        ));
        let feed = Arc::new(RwLock::new(FeedState::new(
            capacity,
            config.feed.min_per_source,
        )));
        let writer = PersistenceWriter::new(&config.feed.output_path, &config.persistence);

        let supervisor = Arc::new(ChannelSupervisor::new(
            launcher,
            config.supervisor.clone(),
            config.intake.clone(),
            Arc::clone(&queues),
            Arc::new(RestartRequests::new()),
            Arc::clone(&feed),
            writer.clone(),
        ));

        let scheduler = Arc::new(
            MergeScheduler::new(queues, Arc::clone(&feed), writer, config.feed.merge_interval())
                .with_burst_warning(config.feed.burst_warning_threshold)
                .with_throttle(config.performance.cycle_cap(), config.performance.item_delay()),
        );

        let reporter = StatusReporter::new(
            &config.status.path,
            std::time::Duration::from_secs(config.status.interval_secs),
        );

        Ok(Self {
            full_restart_gate: Cooldown::new(config.supervisor.full_restart_cooldown()),
            config,
            config_path: None,
            supervisor,
            scheduler,
            feed,
            reporter,
            stop: StopFlag::new(),
        })
    }

    /// Re-read sources from `path` on a full restart.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn supervisor(&self) -> &Arc<ChannelSupervisor> {
        &self.supervisor
    }

    pub fn feed(&self) -> &Arc<RwLock<FeedState>> {
        &self.feed
    }

    pub fn reporter(&self) -> &StatusReporter {
        &self.reporter
    }

    /// Start sources and set the running state.
    pub async fn start(&self) -> usize {
        self.reporter.set(CoordinatorState::Starting).await;
        let sources = self.config.active_sources();
        let started = self.supervisor.start(&sources).await;
        self.reporter
            .set(CoordinatorState::Running {
                alive: started,
                total: sources.len(),
            })
            .await;
        started
    }

    /// Run until `shutdown` resolves, then stop everything.
    pub async fn run(&mut self, shutdown: impl Future<Output = ()>) {
        self.stop.reset();
        self.start().await;

        let merge_task = tokio::spawn(Arc::clone(&self.scheduler).run(self.stop.clone()));
        let status_task = tokio::spawn(
            self.reporter
                .clone()
                .run(Arc::clone(&self.supervisor), self.stop.clone()),
        );

        let mut ticker = interval(self.config.supervisor.monitor_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; sources were just started.
        ticker.tick().await;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = ticker.tick() => {
                    self.monitor_tick().await;
                }
            }
        }

        // Background loops finish before the final merge and status writes.
        self.stop.stop();
        for (name, task) in [("merge", merge_task), ("status", status_task)] {
            if let Err(e) = task.await {
                debug!(task = name, error = %e, "Background task ended abnormally");
            }
        }

        self.shutdown().await;
    }

    /// Stop workers, merge whatever the readers already queued and publish.
    pub async fn shutdown(&self) {
        self.reporter.set(CoordinatorState::Stopping).await;
        self.stop.stop();
        self.supervisor.stop().await;
        let outcome = self.scheduler.run_cycle().await;
        info!(feed_len = outcome.len, "Coordinator stopped");
        self.reporter.set(CoordinatorState::Stopped).await;
    }

    /// Inspect every source once and restart what needs restarting.
    pub async fn monitor_tick(&mut self) -> MonitorReport {
        let statuses = self.supervisor.status().await;
        let mut report = MonitorReport {
            alive: statuses.iter().filter(|s| s.alive).count(),
            total: statuses.len(),
            ..Default::default()
        };

        for status in &statuses {
            if status.queue_depth > self.config.supervisor.queue_warning_depth {
                warn!(
                    source = %status.id,
                    depth = status.queue_depth,
                    shed_total = status.shed_total,
                    "Queue backlog"
                );
            }
        }
        debug!(
            alive = report.alive,
            total = report.total,
            queued = self.supervisor.queues().total_depth(),
            "Monitor tick"
        );

        if report.total > 0 && report.alive == 0 {
            match self.full_restart_gate.try_acquire(&()) {
                Ok(()) => {
                    error!(total = report.total, "All sources are down, restarting everything");
                    self.full_restart().await;
                    report.full_restart = true;
                    return report;
                }
                Err(remaining) => warn!(
                    total = report.total,
                    remaining_secs = remaining.as_secs(),
                    "All sources are down, full restart cooling down; restarting individually"
                ),
            }
        }

        let mut candidates: BTreeSet<SourceId> = self.supervisor.restart_requests().take_all();
        candidates.extend(statuses.iter().filter(|s| !s.alive).map(|s| s.id.clone()));

        for id in candidates {
            match self.supervisor.restart(&id).await {
                Ok(RestartOutcome::Restarted) => report.restarted.push(id),
                Ok(RestartOutcome::CoolingDown { .. }) => report.cooling_down.push(id),
                Err(e) => warn!(source = %id, error = %e, "Restart failed"),
            }
        }

        report
    }

    /// Stop all sources, wait, optionally reload sources, and start again.
    ///
    /// Only the source list is reloaded; feed settings, including command
    /// line overrides, stay as they were and the capacity is rescaled to
    /// the new source count. The feed is kept; only the very first start
    /// clears it.
    pub async fn full_restart(&mut self) {
        self.reporter.set(CoordinatorState::Starting).await;
        self.supervisor.stop().await;
        sleep(self.config.supervisor.full_restart_delay()).await;

        if let Some(path) = &self.config_path {
            match ConfigLoader::load_from_file(path) {
                Ok(reloaded) => {
                    self.config.sources = reloaded.sources;
                    let capacity = self.config.feed_capacity(self.config.active_sources().len());
                    self.feed.write().await.set_capacity(capacity);
                    info!(path = %path.display(), capacity, "Reloaded source configuration");
                }
                Err(e) => warn!(path = %path.display(), error = %e, "Config reload failed, keeping sources"),
            }
        }

        let sources = self.config.active_sources();
        let started = self.supervisor.start(&sources).await;
        self.reporter
            .set(CoordinatorState::Running {
                alive: started,
                total: sources.len(),
            })
            .await;
    }
}
