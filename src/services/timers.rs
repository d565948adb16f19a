//! Time-based gates driven by `tokio::time::Instant`.
//!
//! Both timers read tokio's clock, so tests can run them under a paused
//! runtime and advance time explicitly.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::time::Instant;

/// Per-key cooldown: an action may run again only after `interval` has
/// elapsed since it was last recorded.
#[derive(Debug, Clone)]
pub struct Cooldown<K> {
    interval: Duration,
    last: HashMap<K, Instant>,
}

impl<K: Eq + Hash + Clone> Cooldown<K> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: HashMap::new(),
        }
    }

    /// Time left before `key` is ready; zero when ready.
    pub fn remaining(&self, key: &K) -> Duration {
        self.last.get(key).map_or(Duration::ZERO, |at| {
            self.interval.saturating_sub(at.elapsed())
        })
    }

    /// Start a new cooldown period for `key`.
    pub fn record(&mut self, key: K) {
        self.last.insert(key, Instant::now());
    }

    /// Record and return `Ok(())` when ready, otherwise the remaining wait.
    pub fn try_acquire(&mut self, key: &K) -> Result<(), Duration> {
        let remaining = self.remaining(key);
        if remaining.is_zero() {
            self.record(key.clone());
            Ok(())
        } else {
            Err(remaining)
        }
    }
}

/// Tracks silence: expires once `timeout` passes without a `touch`.
#[derive(Debug, Clone, Copy)]
pub struct InactivityTimer {
    timeout: Duration,
    last_touch: Instant,
}

impl InactivityTimer {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_touch: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_touch = Instant::now();
    }

    pub fn idle(&self) -> Duration {
        self.last_touch.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.idle() >= self.timeout
    }
}
