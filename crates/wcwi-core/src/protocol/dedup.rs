//! Message deduplication by id
//!
//! Every inbound frame can arrive more than once: the host's loopback
//! observer, host fan-out and reconnects all redeliver. The filter records
//! ids the engine has originated or applied and rejects repeats. It is scoped
//! to an engine instance, not to a session, so replays across reconnects are
//! still filtered.

use hashbrown::HashSet;
use std::collections::VecDeque;

use crate::config::DedupConfig;
use crate::types::MessageId;

/// Bounded set of seen ids with FIFO eviction
#[derive(Debug)]
pub struct DedupFilter {
    seen: HashSet<MessageId>,
    order: VecDeque<MessageId>,
    capacity: usize,
}

impl Default for DedupFilter {
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

impl DedupFilter {
    pub fn new(config: DedupConfig) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            seen: HashSet::with_capacity(capacity.min(1024)),
            order: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Record `id` and report whether this is the first sighting
    pub fn should_apply(&mut self, id: &MessageId) -> bool {
        if self.seen.contains(id) {
            return false;
        }
        self.insert(id.clone());
        true
    }

    /// Record an id the engine itself originated
    pub fn mark_sent(&mut self, id: &MessageId) {
        if !self.seen.contains(id) {
            self.insert(id.clone());
        }
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Pre-populate from ids already persisted
    pub fn seed<'a>(&mut self, ids: impl IntoIterator<Item = &'a MessageId>) {
        for id in ids {
            self.mark_sent(id);
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn insert(&mut self, id: MessageId) {
        while self.order.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.seen.remove(&oldest);
                }
                None => break,
            }
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
    }
}
