//! Status artifact writer
//!
//! Keeps a single status token in a small text file for external monitors.
//! Writing the token never fails the coordinator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

use crate::domain::models::CoordinatorState;
use crate::services::channel_supervisor::ChannelSupervisor;
use crate::services::stop_flag::StopFlag;

/// Write `state` to `path`, logging failures at debug level.
pub async fn write_status_token(path: &Path, state: &CoordinatorState) -> bool {
    match tokio::fs::write(path, state.to_string()).await {
        Ok(()) => true,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Failed to write status");
            false
        }
    }
}

/// Read the token currently in the status artifact.
pub async fn read_status_token(path: &Path) -> Option<CoordinatorState> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    content.parse().ok()
}

/// Tracks the coordinator lifecycle and mirrors it to the status artifact
///
/// The state lock is held across each file write, so the artifact always
/// ends up holding the last state set.
#[derive(Clone)]
pub struct StatusReporter {
    path: PathBuf,
    interval: Duration,
    state: Arc<Mutex<CoordinatorState>>,
}

impl StatusReporter {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            state: Arc::new(Mutex::new(CoordinatorState::Stopped)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn state(&self) -> CoordinatorState {
        self.state.lock().await.clone()
    }

    /// Move to `next` and write it. Illegal transitions are logged and
    /// still applied, so the artifact always reflects reality.
    pub async fn set(&self, next: CoordinatorState) {
        let mut state = self.state.lock().await;
        if !state.can_transition_to(&next) {
            debug!(from = %state, to = %next, "Unexpected status transition");
        }
        *state = next;
        write_status_token(&self.path, &state).await;
    }

    /// Update the source counts, but only while still running.
    ///
    /// A lifecycle change made since the counts were gathered wins; the
    /// current token is rewritten unchanged. Returns whether counts applied.
    pub async fn refresh_running(&self, alive: usize, total: usize) -> bool {
        let mut state = self.state.lock().await;
        let applied = state.is_running();
        if applied {
            *state = CoordinatorState::Running { alive, total };
        }
        write_status_token(&self.path, &state).await;
        applied
    }

    /// Refresh the running token from the supervisor on every tick.
    pub async fn run(self, supervisor: Arc<ChannelSupervisor>, stop: StopFlag) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = stop.stopped() => break,
            }

            let statuses = supervisor.status().await;
            let alive = statuses.iter().filter(|s| s.alive).count();
            self.refresh_running(alive, statuses.len()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_writes_token() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = StatusReporter::new(dir.path().join("status.txt"), Duration::from_secs(10));

        reporter.set(CoordinatorState::Starting).await;
        assert_eq!(
            std::fs::read_to_string(reporter.path()).unwrap(),
            "STARTING"
        );

        reporter
            .set(CoordinatorState::Running { alive: 2, total: 3 })
            .await;
        assert_eq!(
            read_status_token(reporter.path()).await,
            Some(CoordinatorState::Running { alive: 2, total: 3 })
        );
        assert!(reporter.state().await.is_running());
    }

    #[tokio::test]
    async fn test_unwritable_path_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir/status.txt");
        assert!(!write_status_token(&path, &CoordinatorState::Stopped).await);

        let reporter = StatusReporter::new(path, Duration::from_secs(10));
        reporter.set(CoordinatorState::Error("boom".into())).await;
        assert_eq!(reporter.state().await, CoordinatorState::Error("boom".into()));
    }

    #[tokio::test]
    async fn test_refresh_does_not_overwrite_lifecycle_change() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = StatusReporter::new(dir.path().join("status.txt"), Duration::from_secs(10));
        reporter
            .set(CoordinatorState::Running { alive: 2, total: 2 })
            .await;

        assert!(reporter.refresh_running(1, 2).await);
        assert_eq!(
            read_status_token(reporter.path()).await,
            Some(CoordinatorState::Running { alive: 1, total: 2 })
        );

        // Counts gathered before shutdown began must not resurrect RUNNING.
        reporter.set(CoordinatorState::Stopping).await;
        assert!(!reporter.refresh_running(2, 2).await);
        assert_eq!(reporter.state().await, CoordinatorState::Stopping);
        assert_eq!(
            read_status_token(reporter.path()).await,
            Some(CoordinatorState::Stopping)
        );
    }
}
