//! Removes the oldest buckets of a tier
//!
//! ```text
//! stored:  |d0|d1|d2|d3|d4|      kept = 2
//!                   ↑
//!          delete_and_before(d2)  → |d3|d4|
//! ```
//!
//! Cleaning one tier never touches another tier. The coarser tiers are made
//! consistent by recalculating the down-sampling afterwards.

use crate::cleanup::size::MaxHistorySizeConfiguration;
use crate::storage::error::HistoryResult;
use crate::storage::{DeletionReport, HistoryBucketRange, WritableHistoryStorage};

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryCleanupService;

impl HistoryCleanupService {
    pub fn new() -> Self {
        Self
    }

    /// Deletes the oldest buckets of `range` until at most
    /// `kept_buckets_count` buckets remain
    pub fn cleanup<S: WritableHistoryStorage>(
        &self,
        storage: &mut S,
        range: HistoryBucketRange,
        kept_buckets_count: usize,
    ) -> HistoryResult<DeletionReport> {
        let descriptors: Vec<_> = storage.book_keeping().descriptors(range).collect();
        if descriptors.len() <= kept_buckets_count {
            return Ok(DeletionReport::default());
        }

        let newest_deleted = descriptors[descriptors.len() - kept_buckets_count - 1];
        let report = storage.delete_and_before(&newest_deleted)?;
        tracing::info!(
            "cleanup {}: {}, keeping {}",
            range,
            report,
            kept_buckets_count
        );
        Ok(report)
    }

    /// Applies `configuration` to every tier
    pub fn cleanup_all<S: WritableHistoryStorage>(
        &self,
        storage: &mut S,
        configuration: MaxHistorySizeConfiguration,
    ) -> HistoryResult<DeletionReport> {
        let mut report = DeletionReport::default();
        for range in HistoryBucketRange::ALL {
            report.merge(self.cleanup(storage, range, configuration.kept_buckets_count)?);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{HistoryBucket, HistoryChunkBuilder, HistoryConfiguration};
    use crate::storage::{
        HistoryBucketDescriptor, HistoryStorage, HistoryUpdateInfo, InMemoryHistoryStorage, SamplingPeriod,
    };

    fn store(storage: &mut InMemoryHistoryStorage, range: HistoryBucketRange, indices: std::ops::Range<i64>) {
        for index in indices {
            let descriptor = HistoryBucketDescriptor::for_index(index, range);
            let mut builder = HistoryChunkBuilder::new(HistoryConfiguration::only_decimals(&[1], &["v"]));
            builder.add_decimal_values(descriptor.start(), &[index as f64]);
            storage
                .store_without_cache(
                    HistoryBucket::new(descriptor, builder.build()),
                    HistoryUpdateInfo::from_descriptor(&descriptor),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let mut storage = InMemoryHistoryStorage::new();
        store(&mut storage, HistoryBucketRange::OneMinute, 0..10);
        store(&mut storage, HistoryBucketRange::TenMinutes, 0..3);

        let report = HistoryCleanupService::new()
            .cleanup(&mut storage, HistoryBucketRange::OneMinute, 3)
            .unwrap();
        assert_eq!(report.count(), 7);
        assert_eq!(report.deleted.first().map(|d| d.index), Some(0));
        assert_eq!(report.deleted.last().map(|d| d.index), Some(6));

        let remaining = storage.query(0.0, 1e9, SamplingPeriod::EveryHundredMillis).unwrap();
        let indices: Vec<i64> = remaining.iter().map(|b| b.descriptor.index).collect();
        assert_eq!(indices, vec![7, 8, 9]);

        // other tiers are untouched
        assert_eq!(storage.bucket_count(HistoryBucketRange::TenMinutes), 3);
    }

    #[test]
    fn test_cleanup_nothing_to_do() {
        let mut storage = InMemoryHistoryStorage::new();
        store(&mut storage, HistoryBucketRange::OneMinute, 0..2);
        let service = HistoryCleanupService::new();

        assert!(service.cleanup(&mut storage, HistoryBucketRange::OneMinute, 2).unwrap().is_empty());
        assert!(service.cleanup(&mut storage, HistoryBucketRange::OneHour, 0).unwrap().is_empty());

        let report = service.cleanup(&mut storage, HistoryBucketRange::OneMinute, 0).unwrap();
        assert_eq!(report.count(), 2);
        assert!(storage.is_empty());
    }

    #[test]
    fn test_cleanup_all() {
        let mut storage = InMemoryHistoryStorage::new();
        store(&mut storage, HistoryBucketRange::OneMinute, 0..5);
        store(&mut storage, HistoryBucketRange::TenMinutes, 0..4);
        store(&mut storage, HistoryBucketRange::OneHour, 0..1);

        let report = HistoryCleanupService::new()
            .cleanup_all(&mut storage, MaxHistorySizeConfiguration::new(2))
            .unwrap();
        assert_eq!(report.count(), 3 + 2);
        assert_eq!(storage.bucket_count(HistoryBucketRange::OneMinute), 2);
        assert_eq!(storage.bucket_count(HistoryBucketRange::TenMinutes), 2);
        assert_eq!(storage.bucket_count(HistoryBucketRange::OneHour), 1);
    }
}
