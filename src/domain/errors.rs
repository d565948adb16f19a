//! Error types for the coordinator components.

use std::path::PathBuf;
use thiserror::Error;

use super::models::SourceId;

/// Errors raised while supervising worker processes
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Unknown source: {0}")]
    UnknownSource(SourceId),

    #[error("Failed to spawn worker for source {source_id}: {error}")]
    Spawn {
        source_id: SourceId,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to prepare artifact {path}: {error}")]
    Artifact {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Errors raised while reading a source artifact
#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("I/O error reading {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Artifact is not parseable (possibly mid-write): {0}")]
    Parse(#[from] serde_json::Error),
}

/// Errors raised while publishing the merged feed
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Failed to serialize feed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
