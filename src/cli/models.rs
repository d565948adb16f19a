//! Report models rendered by the CLI commands.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::domain::models::SourceId;

/// Artifact freshness thresholds, in seconds
pub const ACTIVE_WITHIN_SECS: u64 = 120;
pub const SUSPECT_WITHIN_SECS: u64 = 300;

/// Liveness verdict derived from an artifact's age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Active,
    Suspect,
    Stalled,
    /// No artifact on disk
    Missing,
}

impl Liveness {
    pub const fn from_idle_secs(idle_secs: u64) -> Self {
        if idle_secs < ACTIVE_WITHIN_SECS {
            Self::Active
        } else if idle_secs < SUSPECT_WITHIN_SECS {
            Self::Suspect
        } else {
            Self::Stalled
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspect => "suspect",
            Self::Stalled => "stalled",
            Self::Missing => "missing",
        }
    }
}

impl fmt::Display for Liveness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source as seen from its artifact
#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub id: SourceId,
    pub name: String,
    pub prefix: String,
    pub enabled: bool,
    pub artifact: PathBuf,
    /// Complete records, `None` when missing or unreadable
    pub items: Option<usize>,
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    /// Seconds since the artifact was last modified
    pub idle_secs: Option<u64>,
    pub liveness: Liveness,
}

/// Output of `multichat status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    /// Raw token from the status artifact
    pub status: Option<String>,
    pub feed_path: PathBuf,
    pub feed_items: Option<usize>,
    pub sources: Vec<SourceReport>,
}

/// One diagnostic result
#[derive(Debug, Clone, Serialize)]
pub struct CheckItem {
    pub name: String,
    pub ok: bool,
    pub detail: String,
}

impl CheckItem {
    pub fn pass(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: true,
            detail: detail.into(),
        }
    }

    pub fn fail(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ok: false,
            detail: detail.into(),
        }
    }
}

/// Output of `multichat check`
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub checks: Vec<CheckItem>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.ok)
    }

    pub fn failures(&self) -> usize {
        self.checks.iter().filter(|c| !c.ok).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_thresholds() {
        assert_eq!(Liveness::from_idle_secs(0), Liveness::Active);
        assert_eq!(Liveness::from_idle_secs(119), Liveness::Active);
        assert_eq!(Liveness::from_idle_secs(120), Liveness::Suspect);
        assert_eq!(Liveness::from_idle_secs(299), Liveness::Suspect);
        assert_eq!(Liveness::from_idle_secs(300), Liveness::Stalled);
    }

    #[test]
    fn test_check_report_summary() {
        let report = CheckReport {
            checks: vec![CheckItem::pass("a", "fine"), CheckItem::fail("b", "broken")],
        };
        assert!(!report.passed());
        assert_eq!(report.failures(), 1);
        assert_eq!(serde_json::to_value(&report.checks[1]).unwrap()["ok"], false);
    }
}
