//! Tracks which time ranges of which tier have to be down-sampled again
//!
//! The collector is registered as an observer on a storage. Every stored
//! bucket marks the corresponding range of the next coarser tier as dirty:
//!
//! ```text
//! store OneMinute bucket (EveryHundredMillis) → dirty[EverySecond] += range
//! store TenMinutes bucket (EverySecond)       → dirty[EveryTenSeconds] += range
//! ```
//!
//! Deletions are ignored. Coarser tiers only lose data through an explicit
//! recalculation.

use crate::storage::error::{HistoryError, HistoryResult};
use crate::storage::{
    HistoryBucketDescriptor, HistoryObserver, HistoryUpdateInfo, SamplingPeriod, TimeRange, TimeRanges,
    WritableHistoryStorage,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Dirty ranges per target sampling period
#[derive(Debug, Clone, Default)]
pub struct DownSamplingDirtyRangesCollector {
    dirty: HashMap<SamplingPeriod, TimeRanges>,
}

impl DownSamplingDirtyRangesCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a shared collector and registers it as observer on `storage`
    pub fn observing<S: WritableHistoryStorage>(storage: &mut S) -> Arc<Mutex<Self>> {
        let collector = Arc::new(Mutex::new(Self::new()));
        storage.observe(Self::observer(Arc::clone(&collector)));
        collector
    }

    pub fn mark_as_dirty(&mut self, sampling_period: SamplingPeriod, range: TimeRange) {
        self.dirty.entry(sampling_period).or_default().add(range);
    }

    pub fn mark_ranges_as_dirty(&mut self, sampling_period: SamplingPeriod, ranges: &TimeRanges) {
        for range in ranges {
            self.mark_as_dirty(sampling_period, *range);
        }
    }

    /// The dirty ranges of `sampling_period` (empty if nothing is dirty)
    pub fn get(&self, sampling_period: SamplingPeriod) -> TimeRanges {
        self.dirty.get(&sampling_period).cloned().unwrap_or_default()
    }

    /// Returns and forgets the dirty ranges of `sampling_period`
    pub fn remove(&mut self, sampling_period: SamplingPeriod) -> TimeRanges {
        self.dirty.remove(&sampling_period).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.dirty.values().all(TimeRanges::is_empty)
    }

    pub fn clear(&mut self) {
        self.dirty.clear();
    }

    /// Marks the next coarser tier of a stored bucket as dirty
    pub fn on_update(&mut self, descriptor: &HistoryBucketDescriptor, update_info: &HistoryUpdateInfo) {
        if update_info.is_deletion() {
            return;
        }
        if let Some(target) = update_info.sampling_period.above() {
            tracing::trace!("{} marks {} dirty", descriptor, target);
            self.mark_ranges_as_dirty(target, &update_info.time_ranges);
        }
    }

    /// An observer that forwards every update to the shared collector.
    ///
    /// The observer locks the collector. Do not hold the lock while storing.
    pub fn observer(collector: Arc<Mutex<Self>>) -> HistoryObserver {
        Box::new(
            move |descriptor: &HistoryBucketDescriptor, update_info: &HistoryUpdateInfo| {
                let mut guard = collector.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                guard.on_update(descriptor, update_info);
            },
        )
    }
}

/// Locks a shared collector, mapping poisoning to `HistoryError::Lock`
pub(crate) fn lock_collector(
    collector: &Mutex<DownSamplingDirtyRangesCollector>,
) -> HistoryResult<MutexGuard<'_, DownSamplingDirtyRangesCollector>> {
    collector
        .lock()
        .map_err(|e| HistoryError::Lock(format!("dirty ranges collector poisoned: {}", e)))
}
