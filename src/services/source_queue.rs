//! Bounded per-source queues between intake readers and the merge loop.
//!
//! Each queue has exactly one producer (its source's reader) and one
//! consumer (the merge scheduler). Queues outlive reader restarts so items
//! already ingested still reach the feed.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::warn;

use crate::domain::models::{EnrichedItem, SourceId};

/// FIFO of enriched items with oldest-first load shedding
#[derive(Debug)]
pub struct SourceQueue {
    source: SourceId,
    soft_limit: usize,
    shed_batch: usize,
    items: Mutex<VecDeque<EnrichedItem>>,
    shed_total: AtomicU64,
}

impl SourceQueue {
    pub fn new(source: SourceId, soft_limit: usize, shed_batch: usize) -> Self {
        Self {
            source,
            soft_limit,
            shed_batch,
            items: Mutex::new(VecDeque::new()),
            shed_total: AtomicU64::new(0),
        }
    }

    pub const fn source(&self) -> &SourceId {
        &self.source
    }

    /// Append an item, first shedding the oldest batch when the queue is
    /// above its soft limit. Returns how many items were shed.
    pub fn push(&self, item: EnrichedItem) -> usize {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let mut shed = 0;
        if items.len() > self.soft_limit {
            shed = self.shed_batch.min(items.len());
            items.drain(..shed);
            self.shed_total.fetch_add(shed as u64, Ordering::Relaxed);
            warn!(
                source = %self.source,
                shed,
                depth = items.len(),
                soft_limit = self.soft_limit,
                "Queue over soft limit, dropped oldest items"
            );
        }
        items.push_back(item);
        shed
    }

    /// Push every item in order; returns the total shed.
    pub fn extend(&self, batch: impl IntoIterator<Item = EnrichedItem>) -> usize {
        batch.into_iter().map(|item| self.push(item)).sum()
    }

    pub fn pop(&self) -> Option<EnrichedItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }

    /// Remove up to `limit` items (all when `None`), oldest first.
    pub fn drain(&self, limit: Option<usize>) -> Vec<EnrichedItem> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let take = limit.map_or(items.len(), |cap| cap.min(items.len()));
        items.drain(..take).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items dropped by load shedding since creation
    pub fn shed_total(&self) -> u64 {
        self.shed_total.load(Ordering::Relaxed)
    }
}

/// Registry of queues keyed by source, iterated in id order
#[derive(Debug)]
pub struct SourceQueues {
    soft_limit: usize,
    shed_batch: usize,
    queues: RwLock<BTreeMap<SourceId, Arc<SourceQueue>>>,
}

impl SourceQueues {
    pub fn new(soft_limit: usize, shed_batch: usize) -> Self {
        Self {
            soft_limit,
            shed_batch,
            queues: RwLock::new(BTreeMap::new()),
        }
    }

    /// Existing queue for `source`, or a new empty one.
    pub fn get_or_create(&self, source: &SourceId) -> Arc<SourceQueue> {
        if let Some(queue) = self.get(source) {
            return queue;
        }
        let mut queues = self.queues.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(queues.entry(source.clone()).or_insert_with(|| {
            Arc::new(SourceQueue::new(
                source.clone(),
                self.soft_limit,
                self.shed_batch,
            ))
        }))
    }

    pub fn get(&self, source: &SourceId) -> Option<Arc<SourceQueue>> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    /// Current queues; the lock is released before the caller drains them.
    pub fn snapshot(&self) -> Vec<Arc<SourceQueue>> {
        self.queues
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn depth(&self, source: &SourceId) -> usize {
        self.get(source).map_or(0, |q| q.len())
    }

    pub fn total_depth(&self) -> usize {
        self.snapshot().iter().map(|q| q.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ChatItem, SourceConfig};

    fn item(n: i64) -> EnrichedItem {
        let source = SourceConfig::new("[A]", "Alpha", "a");
        EnrichedItem::enrich(
            ChatItem::new(format!("m{n}"), "user", "hello", n),
            &source,
        )
    }

    #[test]
    fn test_fifo_order() {
        let queue = SourceQueue::new(SourceId::new("a"), 10, 2);
        queue.push(item(1));
        queue.push(item(2));
        assert_eq!(queue.pop().map(|i| i.timestamp()), Some(1));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_sheds_oldest_batch_above_soft_limit() {
        let queue = SourceQueue::new(SourceId::new("a"), 5, 3);
        for n in 0..6 {
            assert_eq!(queue.push(item(n)), 0);
        }
        // Six queued, above the limit of five: the next push drops three.
        assert_eq!(queue.push(item(6)), 3);
        assert_eq!(queue.len(), 4);
        assert_eq!(queue.shed_total(), 3);

        let remaining: Vec<_> = queue.drain(None).iter().map(EnrichedItem::timestamp).collect();
        assert_eq!(remaining, vec![3, 4, 5, 6]);
    }

    #[test]
    fn test_drain_respects_cap() {
        let queue = SourceQueue::new(SourceId::new("a"), 100, 10);
        queue.extend((0..5).map(item));
        assert_eq!(queue.drain(Some(2)).len(), 2);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain(Some(10)).len(), 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_registry_reuses_queues() {
        let queues = SourceQueues::new(100, 10);
        let id = SourceId::new("a");
        let first = queues.get_or_create(&id);
        first.push(item(1));

        let again = queues.get_or_create(&id);
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(queues.depth(&id), 1);
        assert_eq!(queues.depth(&SourceId::new("missing")), 0);

        queues.get_or_create(&SourceId::new("b")).push(item(2));
        assert_eq!(queues.snapshot().len(), 2);
        assert_eq!(queues.total_depth(), 2);
    }
}
