//! Merge scheduler
//!
//! A single loop drains every source queue, deduplicates against the items
//! already in the feed, keeps the feed ordered by timestamp and bounded in
//! size, and hands the result to the persistence writer.
//!
//! The merge itself lives in [`FeedState`], a plain owned structure that can
//! be exercised without any tasks or processes.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::domain::models::{DedupKey, EnrichedItem, SourceId};
use crate::services::persistence_writer::PersistenceWriter;
use crate::services::source_queue::SourceQueues;
use crate::services::stop_flag::StopFlag;

/// Counters from one merge
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub received: usize,
    pub accepted: usize,
    pub duplicates: usize,
    pub trimmed: usize,
    /// Feed length after the merge
    pub len: usize,
}

/// The merged feed and the dedup keys it currently holds
#[derive(Debug, Clone)]
pub struct FeedState {
    items: Vec<EnrichedItem>,
    seen: HashSet<DedupKey>,
    max_messages: usize,
    min_per_source: usize,
    /// Bumped on every change to `items`
    revision: u64,
}

impl FeedState {
    pub fn new(max_messages: usize, min_per_source: usize) -> Self {
        Self {
            items: Vec::new(),
            seen: HashSet::new(),
            max_messages: max_messages.max(1),
            min_per_source,
            revision: 0,
        }
    }

    pub fn items(&self) -> &[EnrichedItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.max_messages
    }

    pub const fn revision(&self) -> u64 {
        self.revision
    }

    /// The current items together with the revision they belong to.
    pub fn snapshot(&self) -> (Vec<EnrichedItem>, u64) {
        (self.items.clone(), self.revision)
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.seen.contains(key)
    }

    /// Change the capacity; takes effect on the next merge.
    pub fn set_capacity(&mut self, max_messages: usize) {
        self.max_messages = max_messages.max(1);
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.seen.clear();
        self.revision += 1;
    }

    /// Merge a batch of newly drained items.
    pub fn merge(&mut self, batch: Vec<EnrichedItem>) -> MergeOutcome {
        let mut outcome = MergeOutcome {
            received: batch.len(),
            ..Default::default()
        };

        for item in batch {
            if self.seen.insert(item.dedup_key()) {
                self.items.push(item);
                outcome.accepted += 1;
            } else {
                outcome.duplicates += 1;
            }
        }

        if outcome.accepted > 0 {
            self.items.sort_by_key(EnrichedItem::timestamp);
        }

        if self.items.len() > self.max_messages {
            let before = self.items.len();
            let items = std::mem::take(&mut self.items);
            self.items = fair_trim(items, self.max_messages, self.min_per_source);
            self.seen = self.items.iter().map(EnrichedItem::dedup_key).collect();
            outcome.trimmed = before - self.items.len();
        }

        if outcome.accepted > 0 || outcome.trimmed > 0 {
            self.revision += 1;
        }
        outcome.len = self.items.len();
        outcome
    }
}

/// Bound a timestamp-ordered feed to `max` items without starving quiet
/// sources.
///
/// Every source present keeps its newest `max(max / sources, min_per_source)`
/// items. Capacity those shares leave unused goes to the newest remaining
/// items, and if the shares alone exceed `max` the oldest retained items are
/// dropped. Relative order is preserved.
pub fn fair_trim(items: Vec<EnrichedItem>, max: usize, min_per_source: usize) -> Vec<EnrichedItem> {
    if items.len() <= max {
        return items;
    }

    let sources = items
        .iter()
        .map(EnrichedItem::source_id)
        .collect::<HashSet<_>>()
        .len()
        .max(1);
    let floor = (max / sources).max(min_per_source);

    let mut keep = vec![false; items.len()];
    let mut kept = 0;
    let mut taken: HashMap<&SourceId, usize> = HashMap::new();
    for (index, item) in items.iter().enumerate().rev() {
        let count = taken.entry(item.source_id()).or_default();
        if *count < floor {
            *count += 1;
            keep[index] = true;
            kept += 1;
        }
    }

    for slot in keep.iter_mut().rev() {
        if kept >= max {
            break;
        }
        if !*slot {
            *slot = true;
            kept += 1;
        }
    }

    let mut retained: Vec<EnrichedItem> = items
        .into_iter()
        .zip(keep)
        .filter_map(|(item, keep)| keep.then_some(item))
        .collect();

    if retained.len() > max {
        retained.drain(..retained.len() - max);
    }
    retained
}

/// Periodically drains queues into the shared feed
pub struct MergeScheduler {
    queues: Arc<SourceQueues>,
    feed: Arc<RwLock<FeedState>>,
    writer: PersistenceWriter,
    interval: Duration,
    burst_warning_threshold: usize,
    cycle_cap: Option<usize>,
    item_delay: Option<Duration>,
}

impl MergeScheduler {
    pub fn new(
        queues: Arc<SourceQueues>,
        feed: Arc<RwLock<FeedState>>,
        writer: PersistenceWriter,
        interval: Duration,
    ) -> Self {
        Self {
            queues,
            feed,
            writer,
            interval,
            burst_warning_threshold: usize::MAX,
            cycle_cap: None,
            item_delay: None,
        }
    }

    pub const fn with_burst_warning(mut self, threshold: usize) -> Self {
        self.burst_warning_threshold = threshold;
        self
    }

    /// Limit items drained per source per cycle, pausing `item_delay`
    /// between items.
    pub const fn with_throttle(mut self, cycle_cap: Option<usize>, item_delay: Option<Duration>) -> Self {
        self.cycle_cap = cycle_cap;
        self.item_delay = item_delay;
        self
    }

    async fn drain_queues(&self) -> Vec<EnrichedItem> {
        let mut batch = Vec::new();
        for queue in self.queues.snapshot() {
            match self.item_delay {
                Some(delay) => {
                    let cap = self.cycle_cap.unwrap_or(usize::MAX);
                    for _ in 0..cap {
                        let Some(item) = queue.pop() else { break };
                        batch.push(item);
                        sleep(delay).await;
                    }
                }
                None => batch.extend(queue.drain(self.cycle_cap)),
            }
        }
        batch
    }

    /// One drain, merge and publish pass.
    pub async fn run_cycle(&self) -> MergeOutcome {
        let batch = self.drain_queues().await;
        if batch.is_empty() {
            return MergeOutcome {
                len: self.feed.read().await.len(),
                ..Default::default()
            };
        }

        if batch.len() > self.burst_warning_threshold {
            warn!(
                items = batch.len(),
                threshold = self.burst_warning_threshold,
                "Unusually large merge batch"
            );
        }

        let (outcome, snapshot) = {
            let mut feed = self.feed.write().await;
            let outcome = feed.merge(batch);
            let snapshot = (outcome.accepted > 0).then(|| feed.snapshot());
            (outcome, snapshot)
        };

        debug!(
            received = outcome.received,
            accepted = outcome.accepted,
            duplicates = outcome.duplicates,
            trimmed = outcome.trimmed,
            len = outcome.len,
            "Merge cycle"
        );

        if let Some((items, revision)) = snapshot {
            if let Err(e) = self.writer.publish(&items, revision).await {
                warn!(error = %e, "Failed to publish feed");
            }
        }

        outcome
    }

    /// Run cycles every interval until `stop` is raised.
    pub async fn run(self: Arc<Self>, stop: StopFlag) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_ms = self.interval.as_millis(), "Merge scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = stop.stopped() => break,
            }
            self.run_cycle().await;
        }

        debug!("Merge scheduler stopped");
    }
}
