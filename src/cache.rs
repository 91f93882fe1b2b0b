//! Bounded cache of sampling decisions.

use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_queue::SegQueue;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::metadata::{CorrelationId, SpanMetadata};

/// Concurrent, capacity-bounded map from correlation ids to span metadata.
///
/// The cache holds the working set of recent sampling decisions: membership
/// doubles as the dedup check, and the stored metadata is what child
/// derivation and context export read. When full, insertion evicts the
/// oldest entries in approximate insertion order; memory stays bounded even
/// when callers never flush.
pub(crate) struct MetadataCache {
    entries: DashMap<CorrelationId, SpanMetadata>,
    insertion_order: SegQueue<CorrelationId>,
    len: AtomicUsize,
    capacity: usize,
}

impl MetadataCache {
    pub(crate) fn new(capacity: usize) -> Self {
        MetadataCache {
            entries: DashMap::new(),
            insertion_order: SegQueue::new(),
            len: AtomicUsize::new(0),
            capacity: capacity.max(1),
        }
    }

    /// Insert metadata for `id` unless a decision already exists. The first
    /// writer wins; returns whether this call inserted.
    pub(crate) fn put_if_absent(&self, id: CorrelationId, metadata: SpanMetadata) -> bool {
        let inserted = match self.entries.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(metadata);
                true
            }
        };
        // The shard guard is released above; eviction may touch other keys.
        if inserted {
            self.insertion_order.push(id);
            if self.len.fetch_add(1, Ordering::Relaxed) + 1 > self.capacity {
                self.evict_oldest();
            }
        }
        inserted
    }

    fn evict_oldest(&self) {
        while self.len.load(Ordering::Relaxed) > self.capacity {
            match self.insertion_order.pop() {
                Some(oldest) => {
                    if self.entries.remove(&oldest).is_some() {
                        self.len.fetch_sub(1, Ordering::Relaxed);
                    }
                }
                None => break,
            }
        }
    }

    pub(crate) fn get(&self, id: &CorrelationId) -> Option<SpanMetadata> {
        self.entries.get(id).map(|entry| *entry.value())
    }

    pub(crate) fn contains(&self, id: &CorrelationId) -> bool {
        self.entries.contains_key(id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
