//! Chronicle History Storage
//!
//! This module provides bucket identity and the storage engines:
//!
//! - **types**: Timestamps, time ranges and update notifications
//! - **sampling**: Sampling periods and bucket ranges (resolution tiers)
//! - **descriptor**: Bucket identity (range + index)
//! - **memory**: In-memory storage engine
//! - **file**: One file per bucket in a date based directory tree
//! - **serializer**: Bucket encodings used by the file storage
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Write Path:
//!   HistoryChunk → store_chunk (split per bucket) → store (merge measured)
//!                → store_without_cache → book-keeping + observers
//!
//! Read Path:
//!   query(start, end, period) → book-keeping lookup → buckets, oldest first
//! ```
//!
//! `store_without_cache` never triggers down-sampling. Observers are called
//! synchronously from within the mutating call; the down-sampling collector
//! uses that to learn which coarser ranges became dirty.
//!
//! # Example
//!
//! ```rust,no_run
//! use chronicle_history::chunk::{HistoryChunkBuilder, HistoryConfiguration};
//! use chronicle_history::storage::{
//!     HistoryStorage, InMemoryHistoryStorage, SamplingPeriod, WritableHistoryStorage,
//! };
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut storage = InMemoryHistoryStorage::new();
//!
//!     let mut builder = HistoryChunkBuilder::new(HistoryConfiguration::only_decimals(&[1], &["temperature"]));
//!     builder.add_decimal_values(1_000.0, &[21.5]);
//!     builder.add_decimal_values(1_100.0, &[21.7]);
//!     storage.store_chunk(builder.build(), SamplingPeriod::EveryHundredMillis)?;
//!
//!     let buckets = storage.query(0.0, 2_000.0, SamplingPeriod::EveryHundredMillis)?;
//!     assert_eq!(buckets.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod descriptor;
pub mod error;
pub mod file;
pub mod memory;
pub mod sampling;
pub mod serializer;
pub mod types;

// Re-export commonly used types
pub use descriptor::HistoryBucketDescriptor;
pub use error::{HistoryError, HistoryResult};
pub use file::FileHistoryStorage;
pub use memory::{DeletionReport, InMemoryHistoryStorage};
pub use sampling::{HistoryBucketRange, SamplingPeriod};
pub use serializer::{BucketSerializer, CompressedBucketSerializer, JsonBucketSerializer, SerializerKind};
pub use types::{format_utc, parse_utc, HistoryUpdateInfo, TimeRange, TimeRanges, Timestamp, UpdateKind};

use crate::chunk::{HistoryBucket, HistoryChunk, RecordingType};
use crate::cleanup::MaxHistorySizeConfiguration;
use crate::index::InMemoryBookKeeping;

/// Callback invoked synchronously for every stored or deleted bucket
pub type HistoryObserver = Box<dyn FnMut(&HistoryBucketDescriptor, &HistoryUpdateInfo) + Send>;

/// Read access to a history
pub trait HistoryStorage {
    /// The sampling period raw samples are recorded with
    fn natural_sampling_period(&self) -> SamplingPeriod;

    /// The retention policy applied by the cleanup service
    fn max_size_configuration(&self) -> MaxHistorySizeConfiguration;

    /// Which descriptors are currently stored
    fn book_keeping(&self) -> &InMemoryBookKeeping;

    /// The bucket for `descriptor`, `None` if nothing is stored
    fn get(&self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<Option<HistoryBucket>>;

    /// The stored buckets for `descriptors`, missing ones are skipped
    fn get_all(&self, descriptors: &[HistoryBucketDescriptor]) -> HistoryResult<Vec<HistoryBucket>> {
        let mut buckets = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            if let Some(bucket) = self.get(descriptor)? {
                buckets.push(bucket);
            }
        }
        Ok(buckets)
    }

    /// All buckets of the tier of `sampling_period` that touch [start, end],
    /// oldest first. Empty if there are none.
    fn query(
        &self,
        start: Timestamp,
        end: Timestamp,
        sampling_period: SamplingPeriod,
    ) -> HistoryResult<Vec<HistoryBucket>> {
        let descriptors = self
            .book_keeping()
            .descriptors_in(sampling_period.to_history_bucket_range(), start, end);
        self.get_all(&descriptors)
    }

    /// Start of the oldest bucket of the natural tier, NaN if empty
    fn get_start(&self) -> Timestamp {
        self.book_keeping()
            .earliest_bound(self.natural_sampling_period().to_history_bucket_range())
            .map(|descriptor| descriptor.start())
            .unwrap_or(f64::NAN)
    }

    /// End of the newest bucket of the natural tier, NaN if empty
    fn get_end(&self) -> Timestamp {
        self.book_keeping()
            .latest_bound(self.natural_sampling_period().to_history_bucket_range())
            .map(|descriptor| descriptor.end())
            .unwrap_or(f64::NAN)
    }

    fn bucket_count(&self, range: HistoryBucketRange) -> usize {
        self.book_keeping().count(range)
    }
}

/// Write access to a history
pub trait WritableHistoryStorage: HistoryStorage {
    /// Stores (or replaces) the bucket and notifies the observers.
    /// Does not merge and does not trigger down-sampling.
    fn store_without_cache(&mut self, bucket: HistoryBucket, update_info: HistoryUpdateInfo) -> HistoryResult<()>;

    /// Removes the bucket. Returns false if nothing was stored.
    fn delete(&mut self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<bool>;

    /// Registers an observer for all following updates
    fn observe(&mut self, observer: HistoryObserver);

    /// Removes all buckets, notifying a deletion for each
    fn clear(&mut self) -> HistoryResult<()> {
        let descriptors: Vec<HistoryBucketDescriptor> = self.book_keeping().all().collect();
        for descriptor in &descriptors {
            self.delete(descriptor)?;
        }
        Ok(())
    }

    /// Stores the bucket. A measured chunk is merged with the measured chunk
    /// already stored for the same descriptor; rows of the new chunk win.
    fn store(&mut self, bucket: HistoryBucket, update_info: HistoryUpdateInfo) -> HistoryResult<()> {
        let descriptor = bucket.descriptor;
        let merged = match self.get(&descriptor)? {
            Some(existing) if can_merge(&existing.chunk, &bucket.chunk) => bucket
                .chunk
                .merge(&existing.chunk, descriptor.start(), descriptor.end())
                .map(|chunk| HistoryBucket::new(descriptor, chunk))
                .unwrap_or(bucket),
            _ => bucket,
        };
        self.store_without_cache(merged, update_info)
    }

    /// Splits `chunk` at bucket boundaries of the tier of `sampling_period`
    /// and stores every part.
    ///
    /// Only buckets that contain rows are visited, so sparse chunks may span
    /// any number of buckets.
    fn store_chunk(&mut self, chunk: HistoryChunk, sampling_period: SamplingPeriod) -> HistoryResult<()> {
        let range = sampling_period.to_history_bucket_range();
        let mut descriptors: Vec<HistoryBucketDescriptor> = chunk
            .timestamps()
            .iter()
            .map(|timestamp| HistoryBucketDescriptor::for_timestamp(*timestamp, range))
            .collect();
        // timestamps are sorted
        descriptors.dedup();

        for descriptor in descriptors {
            let part = match chunk.range(descriptor.start(), descriptor.end()) {
                Some(part) => part,
                None => continue,
            };
            let update_info = match part.time_range() {
                Some(time_range) => HistoryUpdateInfo::for_range(sampling_period, time_range),
                None => continue,
            };
            tracing::debug!("store part with {} rows into {}", part.timestamps_count(), descriptor);
            self.store(HistoryBucket::new(descriptor, part), update_info)?;
        }
        Ok(())
    }

    /// Removes `descriptor` and every older bucket of the same tier
    fn delete_and_before(&mut self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<DeletionReport> {
        let mut report = DeletionReport::default();
        for stored in self.book_keeping().descriptors_until(descriptor) {
            if self.delete(&stored)? {
                report.deleted.push(stored);
            }
        }
        Ok(report)
    }
}

fn can_merge(existing: &HistoryChunk, new: &HistoryChunk) -> bool {
    existing.recording_type() == RecordingType::Measured
        && new.recording_type() == RecordingType::Measured
        && existing.configuration() == new.configuration()
}
