//! A chunk placed on the bucket grid
//!
//! `HistoryBucket` pairs a descriptor with the chunk holding its data. The
//! lookup helpers operate on bucket lists sorted by start, as returned by
//! `HistoryStorage::query`.

use crate::chunk::enum_set::HistoryEnumSet;
use crate::chunk::history_chunk::HistoryChunk;
use crate::chunk::values::ReferenceEntryId;
use crate::storage::descriptor::HistoryBucketDescriptor;
use crate::storage::sampling::{HistoryBucketRange, SamplingPeriod};
use crate::storage::types::{format_utc, TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryBucket {
    pub descriptor: HistoryBucketDescriptor,
    pub chunk: HistoryChunk,
}

impl HistoryBucket {
    /// # Panics
    /// Panics if a timestamp of the chunk lies outside [start, end) of the descriptor
    pub fn new(descriptor: HistoryBucketDescriptor, chunk: HistoryChunk) -> Self {
        if let (Some(first), Some(last)) = (chunk.first_timestamp(), chunk.last_timestamp()) {
            assert!(
                first >= descriptor.start(),
                "invalid chunk start <{}>, expected at least <{}>",
                format_utc(first),
                format_utc(descriptor.start())
            );
            assert!(
                last < descriptor.end(),
                "invalid chunk end <{}>, expected less than <{}>",
                format_utc(last),
                format_utc(descriptor.end())
            );
        }
        Self { descriptor, chunk }
    }

    pub fn range(&self) -> HistoryBucketRange {
        self.descriptor.range
    }

    pub fn sampling_period(&self) -> SamplingPeriod {
        self.descriptor.range.sampling_period()
    }

    pub fn start(&self) -> Timestamp {
        self.descriptor.start()
    }

    pub fn end(&self) -> Timestamp {
        self.descriptor.end()
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        self.descriptor.contains(timestamp)
    }

    pub fn overlaps(&self, range: &TimeRange) -> bool {
        self.start() < range.end && self.end() > range.start
    }
}

impl fmt::Display for HistoryBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HistoryBucket({})", self.descriptor)
    }
}

/// Finds the row for `timestamp` in sorted buckets.
///
/// An exact hit wins. Otherwise the row before `timestamp` is used if it is
/// closer than the sampling distance of its bucket.
pub fn find_at(buckets: &[HistoryBucket], timestamp: Timestamp) -> Option<(&HistoryBucket, usize)> {
    for bucket in buckets {
        let chunk = &bucket.chunk;
        let near = match chunk.best_timestamp_index_for(timestamp) {
            Ok(index) => return Some((bucket, index)),
            Err(near) => near,
        };
        if near == 0 {
            continue;
        }

        let index = near - 1;
        let distance = timestamp - chunk.timestamp(index);
        if distance < bucket.range().distance() {
            return Some((bucket, index));
        }
    }
    None
}

/// The decimal value at (or shortly before) `timestamp`, NaN if there is none
pub fn find_decimal_value_at(buckets: &[HistoryBucket], series: usize, timestamp: Timestamp) -> f64 {
    find_at(buckets, timestamp)
        .map(|(bucket, index)| bucket.chunk.get_decimal_value(series, index))
        .unwrap_or(f64::NAN)
}

pub fn find_enum_value_at(buckets: &[HistoryBucket], series: usize, timestamp: Timestamp) -> HistoryEnumSet {
    find_at(buckets, timestamp)
        .map(|(bucket, index)| bucket.chunk.get_enum_value(series, index))
        .unwrap_or(HistoryEnumSet::NO_VALUE)
}

pub fn find_reference_entry_id_at(
    buckets: &[HistoryBucket],
    series: usize,
    timestamp: Timestamp,
) -> ReferenceEntryId {
    find_at(buckets, timestamp)
        .map(|(bucket, index)| bucket.chunk.get_reference_entry_id(series, index))
        .unwrap_or(ReferenceEntryId::NO_VALUE)
}
