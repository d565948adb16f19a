//! Per-source output artifacts.
//!
//! Workers append one JSON chat item per line. A trailing line without a
//! newline is an append in progress and is not visible until it completes.
//! Older workers rewrite the whole file as a JSON array; that form is also
//! accepted, and a half-written array surfaces as a parse error the reader
//! retries.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::errors::IntakeError;
use crate::domain::models::{ChatItem, SourceId};

/// One record position in an artifact
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Item(ChatItem),
    /// A complete line that is not a chat item; still occupies its position
    Malformed { position: usize, error: String },
}

/// Parsed content of an artifact at one point in time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtifactSnapshot {
    pub records: Vec<Record>,
}

impl ArtifactSnapshot {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn items(&self) -> impl Iterator<Item = &ChatItem> {
        self.records.iter().filter_map(|r| match r {
            Record::Item(item) => Some(item),
            Record::Malformed { .. } => None,
        })
    }
}

/// Parse artifact content in either supported format.
///
/// Content is taken as raw bytes; a complete line that is not valid UTF-8
/// becomes a malformed record like any other undecodable line.
pub fn parse_artifact(content: impl AsRef<[u8]>) -> Result<ArtifactSnapshot, IntakeError> {
    let content = content.as_ref();
    if content.trim_ascii_start().first() == Some(&b'[') {
        parse_array(content)
    } else {
        Ok(parse_lines(content))
    }
}

fn parse_array(content: &[u8]) -> Result<ArtifactSnapshot, IntakeError> {
    let values: Vec<serde_json::Value> = serde_json::from_slice(content)?;
    let records = values
        .into_iter()
        .enumerate()
        .map(|(position, value)| match serde_json::from_value::<ChatItem>(value) {
            Ok(item) => Record::Item(item),
            Err(e) => Record::Malformed {
                position,
                error: e.to_string(),
            },
        })
        .collect();
    Ok(ArtifactSnapshot { records })
}

fn parse_lines(content: &[u8]) -> ArtifactSnapshot {
    // Everything after the last newline is still being written.
    let complete: &[u8] = match content.iter().rposition(|&b| b == b'\n') {
        Some(end) => &content[..end],
        None => &[],
    };

    let records = complete
        .split(|&b| b == b'\n')
        .map(<[u8]>::trim_ascii)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(position, line)| match serde_json::from_slice::<ChatItem>(line) {
            Ok(item) => Record::Item(item),
            Err(e) => Record::Malformed {
                position,
                error: e.to_string(),
            },
        })
        .collect();

    ArtifactSnapshot { records }
}

/// Read and parse an artifact. `Ok(None)` when it does not exist yet.
pub async fn read_artifact(path: &Path) -> Result<Option<ArtifactSnapshot>, IntakeError> {
    match tokio::fs::read(path).await {
        Ok(content) => parse_artifact(&content).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(error) => Err(IntakeError::Io {
            path: path.to_path_buf(),
            error,
        }),
    }
}

/// Location of a source's artifact inside `dir`.
pub fn artifact_path(dir: &Path, source: &SourceId) -> PathBuf {
    dir.join(format!("{source}.jsonl"))
}

/// Create (or truncate) an empty artifact for a freshly started worker.
pub async fn create_fresh(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, b"").await
}

/// Remove an artifact; a missing file is not an error.
pub async fn remove(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}
