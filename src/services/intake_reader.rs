//! Intake reader
//!
//! One reader per source polls the source's artifact, turns newly appended
//! records into enriched items and pushes them onto the source's queue. It
//! also notices when the artifact shrinks (the worker started over) and when
//! a live worker has gone quiet for too long.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::domain::errors::IntakeError;
use crate::domain::models::{EnrichedItem, IntakeConfig, SourceConfig, SourceId};
use crate::infrastructure::artifact::{read_artifact, Record};
use crate::services::source_queue::SourceQueue;
use crate::services::stop_flag::StopFlag;
use crate::services::timers::InactivityTimer;

const PARSE_RETRY_DELAY: Duration = Duration::from_millis(500);
const IO_BACKOFF: Duration = Duration::from_secs(5);
const IO_BACKOFF_ESCALATE_AFTER: u32 = 5;
const IO_BACKOFF_MAX_SECS: u32 = 30;

/// Liveness shared between a source's reader and its supervisor
#[derive(Debug)]
pub struct SourceActivity {
    last_activity: Mutex<Instant>,
    alive: AtomicBool,
}

impl Default for SourceActivity {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceActivity {
    pub fn new() -> Self {
        Self {
            last_activity: Mutex::new(Instant::now()),
            alive: AtomicBool::new(true),
        }
    }

    pub fn touch(&self) {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self
            .last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn idle(&self) -> Duration {
        self.last_activity().elapsed()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn set_alive(&self, alive: bool) {
        self.alive.store(alive, Ordering::SeqCst);
    }
}

/// Sources whose readers asked for a worker restart
#[derive(Debug, Default)]
pub struct RestartRequests(Mutex<BTreeSet<SourceId>>);

impl RestartRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when a request for `source` was already pending.
    pub fn request(&self, source: SourceId) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source)
    }

    pub fn take_all(&self) -> BTreeSet<SourceId> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn contains(&self, source: &SourceId) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(source)
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_empty()
    }
}

/// What a single poll observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The artifact does not exist (yet)
    Missing,
    Unchanged,
    /// New records since the last poll
    Appended {
        items: usize,
        malformed: usize,
        shed: usize,
    },
    /// The artifact holds fewer records than before; counting restarts there
    Reset { from: usize, to: usize },
    /// No growth for the inactivity timeout
    Stalled { restart_requested: bool },
    /// Unparseable content, most likely caught mid-write
    TransientError { consecutive: u32 },
    /// Reading the artifact failed
    IoError { consecutive: u32 },
}

/// Polls one source artifact into its queue
#[derive(Debug)]
pub struct IntakeReader {
    source: SourceConfig,
    id: SourceId,
    artifact: PathBuf,
    queue: Arc<SourceQueue>,
    activity: Arc<SourceActivity>,
    restarts: Arc<RestartRequests>,
    config: IntakeConfig,
    last_count: usize,
    inactivity: InactivityTimer,
    parse_errors: u32,
    io_errors: u32,
}

impl IntakeReader {
    pub fn new(
        source: SourceConfig,
        artifact: PathBuf,
        queue: Arc<SourceQueue>,
        activity: Arc<SourceActivity>,
        restarts: Arc<RestartRequests>,
        config: IntakeConfig,
    ) -> Self {
        let inactivity = InactivityTimer::new(config.inactivity_timeout());
        Self {
            id: source.id(),
            source,
            artifact,
            queue,
            activity,
            restarts,
            config,
            last_count: 0,
            inactivity,
            parse_errors: 0,
            io_errors: 0,
        }
    }

    pub const fn last_count(&self) -> usize {
        self.last_count
    }

    /// Poll the artifact once.
    pub async fn poll_once(&mut self) -> PollOutcome {
        let snapshot = match read_artifact(&self.artifact).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                self.parse_errors = 0;
                self.io_errors = 0;
                return self.check_inactivity().unwrap_or(PollOutcome::Missing);
            }
            Err(IntakeError::Parse(e)) => {
                self.parse_errors += 1;
                if self.parse_errors > self.config.error_warning_threshold {
                    warn!(
                        source = %self.id,
                        consecutive = self.parse_errors,
                        error = %e,
                        "Artifact repeatedly unparseable"
                    );
                } else {
                    debug!(source = %self.id, error = %e, "Artifact unparseable, retrying");
                }
                // Unreadable content is not progress; a silent worker still stalls.
                return self.check_inactivity().unwrap_or(PollOutcome::TransientError {
                    consecutive: self.parse_errors,
                });
            }
            Err(e) => {
                self.io_errors += 1;
                warn!(source = %self.id, consecutive = self.io_errors, error = %e, "Failed to read artifact");
                return self.check_inactivity().unwrap_or(PollOutcome::IoError {
                    consecutive: self.io_errors,
                });
            }
        };

        self.parse_errors = 0;
        self.io_errors = 0;

        let count = snapshot.len();
        if count < self.last_count {
            info!(
                source = %self.id,
                from = self.last_count,
                to = count,
                "Artifact shrank, resynchronizing"
            );
            let from = self.last_count;
            self.last_count = count;
            self.mark_active();
            return PollOutcome::Reset { from, to: count };
        }

        if count == self.last_count {
            return self.check_inactivity().unwrap_or(PollOutcome::Unchanged);
        }

        let mut items = Vec::with_capacity(count - self.last_count);
        let mut malformed = 0;
        for record in snapshot.records.into_iter().skip(self.last_count) {
            match record {
                Record::Item(item) => {
                    let enriched = EnrichedItem::enrich(item, &self.source);
                    trace!(
                        source = %self.id,
                        author = %enriched.item.author.name,
                        roles = ?enriched.item.author.roles(),
                        "Enriched chat item"
                    );
                    items.push(enriched);
                }
                Record::Malformed { position, error } => {
                    malformed += 1;
                    warn!(source = %self.id, position, error = %error, "Skipping malformed record");
                }
            }
        }
        self.last_count = count;
        self.mark_active();

        let appended = items.len();
        if appended > self.config.high_activity_threshold {
            warn!(
                source = %self.id,
                items = appended,
                threshold = self.config.high_activity_threshold,
                "High chat activity"
            );
        }
        let shed = self.queue.extend(items);
        debug!(source = %self.id, items = appended, malformed, depth = self.queue.len(), "Ingested records");

        PollOutcome::Appended {
            items: appended,
            malformed,
            shed,
        }
    }

    fn mark_active(&mut self) {
        self.inactivity.touch();
        self.activity.touch();
    }

    fn check_inactivity(&mut self) -> Option<PollOutcome> {
        if !self.inactivity.is_expired() {
            return None;
        }

        let idle_secs = self.inactivity.idle().as_secs();
        // Reset so a silent source produces one request per timeout, not one per poll.
        self.inactivity.touch();

        if self.activity.is_alive() {
            warn!(source = %self.id, idle_secs, "No new chat, requesting worker restart");
            self.restarts.request(self.id.clone());
            Some(PollOutcome::Stalled {
                restart_requested: true,
            })
        } else {
            info!(source = %self.id, idle_secs, "Source silent and worker gone; left to dead-worker recovery");
            Some(PollOutcome::Stalled {
                restart_requested: false,
            })
        }
    }

    /// Delay before the next poll after `outcome`.
    pub fn next_delay(&self, outcome: &PollOutcome) -> Duration {
        match outcome {
            PollOutcome::TransientError { .. } => PARSE_RETRY_DELAY,
            PollOutcome::IoError { consecutive } if *consecutive > IO_BACKOFF_ESCALATE_AFTER => {
                Duration::from_secs(u64::from((*consecutive).min(IO_BACKOFF_MAX_SECS)))
            }
            PollOutcome::IoError { .. } => IO_BACKOFF,
            _ => self.config.poll_interval(),
        }
    }

    /// Poll until either flag is raised.
    pub async fn run(mut self, global_stop: StopFlag, reader_stop: StopFlag) {
        debug!(source = %self.id, artifact = %self.artifact.display(), "Intake reader started");
        while !global_stop.is_stopped() && !reader_stop.is_stopped() {
            let outcome = self.poll_once().await;
            let delay = self.next_delay(&outcome);
            tokio::time::sleep(delay).await;
        }
        debug!(source = %self.id, "Intake reader stopped");
    }
}
