//! Worker Port
//!
//! Abstraction over the external scraping processes. The coordinator never
//! looks inside a worker: it launches one with a target and an artifact
//! path, checks whether it is still running, and terminates it.

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use crate::domain::models::SourceConfig;

/// How a worker process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// `None` when the process was killed by a signal
    pub code: Option<i32>,
}

impl WorkerExit {
    pub const fn success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Result of a graceful-then-forced termination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Nothing to do, the process was already gone
    AlreadyExited(WorkerExit),
    /// Exited within the grace period after the polite signal
    Graceful(WorkerExit),
    /// Killed after the grace period ran out
    Forced,
}

/// A running worker process
#[async_trait]
pub trait WorkerProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Non-blocking exit check; `Ok(None)` while the process runs.
    fn try_exit(&mut self) -> std::io::Result<Option<WorkerExit>>;

    /// Ask the process to stop, wait up to `grace`, then kill it.
    async fn terminate(&mut self, grace: Duration) -> std::io::Result<Termination>;
}

/// Starts worker processes
pub trait WorkerLauncher: Send + Sync {
    /// Spawn a worker that appends `source`'s chat to `artifact`.
    fn launch(&self, source: &SourceConfig, artifact: &Path) -> std::io::Result<Box<dyn WorkerProcess>>;
}
