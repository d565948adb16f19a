use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use super::source::SourceId;

/// Lifecycle state of the coordinator, written to the status artifact.
///
/// The textual form is the wire format read by external monitors:
/// `STARTING`, `RUNNING: 3/4 sources`, `STOPPING`, `STOPPED`, `ERROR: <reason>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorState {
    Starting,
    Running { alive: usize, total: usize },
    Stopping,
    Stopped,
    Error(String),
}

impl CoordinatorState {
    /// Whether moving from `self` to `next` is a legal lifecycle step.
    ///
    /// `Running -> Starting` covers the full restart after a total outage.
    pub fn can_transition_to(&self, next: &Self) -> bool {
        use CoordinatorState::{Error, Running, Starting, Stopped, Stopping};
        match (self, next) {
            (_, Error(_)) => true,
            (Stopped | Error(_), Starting) => true,
            (Starting | Running { .. }, Running { .. }) => true,
            (Running { .. }, Starting) => true,
            (Starting | Running { .. } | Error(_), Stopping) => true,
            (Stopping | Error(_), Stopped) => true,
            _ => false,
        }
    }

    pub const fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }
}

impl fmt::Display for CoordinatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => f.write_str("STARTING"),
            Self::Running { alive, total } => write!(f, "RUNNING: {alive}/{total} sources"),
            Self::Stopping => f.write_str("STOPPING"),
            Self::Stopped => f.write_str("STOPPED"),
            Self::Error(reason) => write!(f, "ERROR: {reason}"),
        }
    }
}

impl FromStr for CoordinatorState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "STARTING" => return Ok(Self::Starting),
            "STOPPING" => return Ok(Self::Stopping),
            "STOPPED" => return Ok(Self::Stopped),
            "RUNNING" => return Ok(Self::Running { alive: 0, total: 0 }),
            _ => {}
        }

        if let Some(reason) = s.strip_prefix("ERROR:") {
            return Ok(Self::Error(reason.trim().to_string()));
        }

        if let Some(rest) = s.strip_prefix("RUNNING:") {
            let ratio = rest.trim().split_whitespace().next().unwrap_or_default();
            if let Some((alive, total)) = ratio.split_once('/') {
                let alive = alive.parse().map_err(|_| format!("invalid alive count in '{s}'"))?;
                let total = total.parse().map_err(|_| format!("invalid total count in '{s}'"))?;
                return Ok(Self::Running { alive, total });
            }
        }

        Err(format!("unrecognized status token: '{s}'"))
    }
}

/// Point-in-time view of one supervised source
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceStatus {
    pub id: SourceId,
    pub name: String,
    pub prefix: String,
    pub alive: bool,
    pub pid: Option<u32>,
    /// Exit code of the last worker process, once it has exited
    pub exit_code: Option<i32>,
    pub queue_depth: usize,
    /// Items the source's queue has dropped under load
    pub shed_total: u64,
    /// Seconds since the reader last saw growth or a reset
    pub idle_secs: u64,
}
