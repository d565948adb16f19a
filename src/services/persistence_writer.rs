//! Publishes the merged feed for the display layer.
//!
//! The feed is written to a uniquely named sibling temp file and renamed
//! over the target so readers never see a half-written file. Renames that
//! fail (a reader holding the file open on some platforms) are retried with
//! linear backoff; after the last attempt the feed is written in place.
//!
//! Publishes are serialized, and each carries the feed revision it was taken
//! at. A snapshot older than the last one published is dropped, so
//! concurrent publishers can never leave stale content on disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::PersistenceError;
use crate::domain::models::{EnrichedItem, PersistenceConfig};

/// How a publish reached the target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    /// Atomic replace succeeded on attempt `attempts`
    Atomic { attempts: u32 },
    /// Atomic replace kept failing; written in place
    Direct,
}

/// Writes the feed artifact. Clones share the publish lock.
#[derive(Debug, Clone)]
pub struct PersistenceWriter {
    path: PathBuf,
    max_attempts: u32,
    backoff_step: Duration,
    last_revision: Arc<Mutex<Option<u64>>>,
    #[cfg(test)]
    blocked_renames: Arc<std::sync::atomic::AtomicU32>,
}

impl PersistenceWriter {
    pub fn new(path: impl Into<PathBuf>, config: &PersistenceConfig) -> Self {
        Self {
            path: path.into(),
            max_attempts: config.max_attempts.max(1),
            backoff_step: Duration::from_millis(config.backoff_step_ms),
            last_revision: Arc::new(Mutex::new(None)),
            #[cfg(test)]
            blocked_renames: Arc::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Publish `items`, a snapshot of the feed at `revision`.
    ///
    /// Returns `Ok(None)` without touching the file when a newer revision
    /// has already been published.
    pub async fn publish(
        &self,
        items: &[EnrichedItem],
        revision: u64,
    ) -> Result<Option<PublishMode>, PersistenceError> {
        let mut last = self.last_revision.lock().await;
        if let Some(published) = *last {
            if revision < published {
                debug!(revision, published, "Skipping stale feed snapshot");
                return Ok(None);
            }
        }

        let mode = self.write_feed(items).await?;
        *last = Some(revision);
        Ok(Some(mode))
    }

    async fn write_feed(&self, items: &[EnrichedItem]) -> Result<PublishMode, PersistenceError> {
        let body = serde_json::to_vec_pretty(items)?;
        let dir = self.directory();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|error| self.io_error(&dir, error))?;

        let temp = dir.join(format!(".{}.{}.tmp", self.file_name(), Uuid::new_v4()));
        tokio::fs::write(&temp, &body)
            .await
            .map_err(|error| self.io_error(&temp, error))?;

        for attempt in 1..=self.max_attempts {
            match self.replace(&temp).await {
                Ok(()) => {
                    debug!(path = %self.path.display(), items = items.len(), attempt, "Feed published");
                    return Ok(PublishMode::Atomic { attempts: attempt });
                }
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.backoff_step * attempt;
                    debug!(
                        path = %self.path.display(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Feed rename failed, retrying"
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        attempts = self.max_attempts,
                        error = %e,
                        "Atomic replace failed, writing feed in place"
                    );
                }
            }
        }

        let direct = tokio::fs::write(&self.path, &body).await;
        if let Err(e) = tokio::fs::remove_file(&temp).await {
            debug!(path = %temp.display(), error = %e, "Failed to remove temp feed file");
        }
        direct.map_err(|error| self.io_error(&self.path, error))?;

        warn!(path = %self.path.display(), "Feed written non-atomically");
        Ok(PublishMode::Direct)
    }

    async fn replace(&self, temp: &Path) -> std::io::Result<()> {
        #[cfg(test)]
        {
            use std::sync::atomic::Ordering;
            let blocked = self
                .blocked_renames
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if blocked.is_ok() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "target held open",
                ));
            }
        }
        tokio::fs::rename(temp, &self.path).await
    }

    fn directory(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| "feed".to_string(), |n| n.to_string_lossy().into_owned())
    }

    fn io_error(&self, path: &Path, error: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: path.to_path_buf(),
            error,
        }
    }
}
