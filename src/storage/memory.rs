//! In-memory storage engine
//!
//! Buckets live in a `HashMap` keyed by descriptor. The book-keeping is
//! updated in lock-step with every store and delete, so `query` never has
//! to scan the map.

use crate::chunk::HistoryBucket;
use crate::cleanup::MaxHistorySizeConfiguration;
use crate::index::InMemoryBookKeeping;
use crate::storage::descriptor::HistoryBucketDescriptor;
use crate::storage::error::HistoryResult;
use crate::storage::sampling::SamplingPeriod;
use crate::storage::types::HistoryUpdateInfo;
use crate::storage::{HistoryObserver, HistoryStorage, WritableHistoryStorage};
use std::collections::HashMap;
use std::fmt;

/// Default number of kept buckets per tier
const DEFAULT_KEPT_BUCKETS: usize = 100;

/// The descriptors removed by a delete or cleanup call, oldest first per tier
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionReport {
    pub deleted: Vec<HistoryBucketDescriptor>,
}

impl DeletionReport {
    pub fn count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
    }

    /// Appends the descriptors of `other`
    pub fn merge(&mut self, other: DeletionReport) {
        self.deleted.extend(other.deleted);
    }
}

impl fmt::Display for DeletionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deleted {} buckets", self.deleted.len())
    }
}

/// Keeps every bucket in memory
pub struct InMemoryHistoryStorage {
    buckets: HashMap<HistoryBucketDescriptor, HistoryBucket>,
    book_keeping: InMemoryBookKeeping,
    observers: Vec<HistoryObserver>,
    natural_sampling_period: SamplingPeriod,
    max_size_configuration: MaxHistorySizeConfiguration,
}

impl Default for InMemoryHistoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHistoryStorage {
    pub fn new() -> Self {
        Self {
            buckets: HashMap::new(),
            book_keeping: InMemoryBookKeeping::new(),
            observers: Vec::new(),
            natural_sampling_period: SamplingPeriod::EveryHundredMillis,
            max_size_configuration: MaxHistorySizeConfiguration::new(DEFAULT_KEPT_BUCKETS),
        }
    }

    /// Sets the sampling period raw samples arrive with (builder pattern)
    pub fn with_natural_sampling_period(mut self, sampling_period: SamplingPeriod) -> Self {
        self.natural_sampling_period = sampling_period;
        self
    }

    /// Sets the retention policy (builder pattern)
    pub fn with_max_size_configuration(mut self, configuration: MaxHistorySizeConfiguration) -> Self {
        self.max_size_configuration = configuration;
        self
    }

    /// Number of buckets over all tiers
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    fn notify(&mut self, descriptor: &HistoryBucketDescriptor, update_info: &HistoryUpdateInfo) {
        for observer in &mut self.observers {
            observer(descriptor, update_info);
        }
    }
}

impl HistoryStorage for InMemoryHistoryStorage {
    fn natural_sampling_period(&self) -> SamplingPeriod {
        self.natural_sampling_period
    }

    fn max_size_configuration(&self) -> MaxHistorySizeConfiguration {
        self.max_size_configuration
    }

    fn book_keeping(&self) -> &InMemoryBookKeeping {
        &self.book_keeping
    }

    fn get(&self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<Option<HistoryBucket>> {
        Ok(self.buckets.get(descriptor).cloned())
    }
}

impl WritableHistoryStorage for InMemoryHistoryStorage {
    fn store_without_cache(&mut self, bucket: HistoryBucket, update_info: HistoryUpdateInfo) -> HistoryResult<()> {
        let descriptor = bucket.descriptor;
        tracing::debug!("store {} ({} rows)", descriptor, bucket.chunk.timestamps_count());

        self.buckets.insert(descriptor, bucket);
        self.book_keeping.store(descriptor);
        self.notify(&descriptor, &update_info);
        Ok(())
    }

    fn delete(&mut self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<bool> {
        if self.buckets.remove(descriptor).is_none() {
            return Ok(false);
        }
        tracing::debug!("delete {}", descriptor);
        self.book_keeping.remove(descriptor);
        self.notify(descriptor, &HistoryUpdateInfo::for_deletion(descriptor));
        Ok(true)
    }

    fn observe(&mut self, observer: HistoryObserver) {
        self.observers.push(observer);
    }
}
