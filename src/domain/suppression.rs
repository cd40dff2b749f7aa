//! Suppression store: adaptive skip counters per (instrument, slot).
//!
//! Counts consecutive verified no-op attempts per id. Once a counter
//! reaches the clean-skip limit the id is filtered out of dispatch for
//! that slot. A move to a new slot starts with a fresh budget; a
//! verified state change clears the counter.
//!
//! Memory is bounded per instrument: beyond `max_slots_per_instrument`
//! buckets, the least recently touched bucket is evicted.

use std::collections::HashMap;
use std::sync::Mutex;

use super::instrument::{InstrumentId, ItemId, PriceSlot};

#[derive(Debug, Default)]
struct Bucket {
    counts: HashMap<ItemId, u32>,
    /// Logical clock value of the last write.
    touched: u64,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: HashMap<(InstrumentId, PriceSlot), Bucket>,
    clock: u64,
}

/// Process-wide suppression counters.
///
/// Interior mutability so a single `Arc<SuppressionStore>` can be
/// shared; the batch dispatcher is the only writer.
#[derive(Debug)]
pub struct SuppressionStore {
    limit: u32,
    max_slots_per_instrument: usize,
    inner: Mutex<Inner>,
}

impl SuppressionStore {
    /// Create a store with the given clean-skip limit.
    pub fn new(limit: u32, max_slots_per_instrument: usize) -> Self {
        Self {
            limit: limit.max(1),
            max_slots_per_instrument: max_slots_per_instrument.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Keep ids whose counter is below the limit, preserving order.
    pub fn filter(&self, instrument: InstrumentId, slot: PriceSlot, ids: &[ItemId]) -> Vec<ItemId> {
        let inner = self.lock();
        let Some(bucket) = inner.buckets.get(&(instrument, slot)) else {
            return ids.to_vec();
        };
        ids.iter()
            .copied()
            .filter(|id| bucket.counts.get(id).copied().unwrap_or(0) < self.limit)
            .collect()
    }

    /// Add one no-op attempt to each id.
    pub fn increment(&self, instrument: InstrumentId, slot: PriceSlot, ids: &[ItemId]) {
        if ids.is_empty() {
            return;
        }
        let mut inner = self.lock();
        inner.clock += 1;
        let now = inner.clock;

        let bucket = inner.buckets.entry((instrument, slot)).or_default();
        bucket.touched = now;
        for id in ids {
            let count = bucket.counts.entry(*id).or_insert(0);
            *count = count.saturating_add(1);
        }

        Self::evict(&mut inner, instrument, self.max_slots_per_instrument);
    }

    /// Forget the named ids, restoring a fresh budget.
    pub fn clear(&self, instrument: InstrumentId, slot: PriceSlot, ids: &[ItemId]) {
        let mut inner = self.lock();
        let key = (instrument, slot);
        let Some(bucket) = inner.buckets.get_mut(&key) else {
            return;
        };
        for id in ids {
            bucket.counts.remove(id);
        }
        if bucket.counts.is_empty() {
            inner.buckets.remove(&key);
        }
    }

    /// Current counter for one id (0 when absent).
    pub fn count(&self, instrument: InstrumentId, slot: PriceSlot, id: ItemId) -> u32 {
        self.lock()
            .buckets
            .get(&(instrument, slot))
            .and_then(|b| b.counts.get(&id).copied())
            .unwrap_or(0)
    }

    /// Number of ids at or above the limit, across all buckets.
    pub fn suppressed_total(&self) -> usize {
        self.lock()
            .buckets
            .values()
            .map(|b| b.counts.values().filter(|c| **c >= self.limit).count())
            .sum()
    }

    /// Number of live (instrument, slot) buckets.
    pub fn bucket_count(&self) -> usize {
        self.lock().buckets.len()
    }

    fn evict(inner: &mut Inner, instrument: InstrumentId, cap: usize) {
        loop {
            let mine = inner.buckets.iter().filter(|((i, _), _)| *i == instrument);
            if mine.clone().count() <= cap {
                return;
            }
            let Some(oldest) = mine.min_by_key(|(_, b)| b.touched).map(|(k, _)| *k) else {
                return;
            };
            inner.buckets.remove(&oldest);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned lock only means a panic elsewhere; the counters are still usable.
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
