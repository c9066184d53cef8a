//! Bucket identity
//!
//! A `HistoryBucketDescriptor` is the pair (range, index). The bucket covers
//! `[index * duration, (index + 1) * duration)`. Indices are plain `i64`s, so
//! buckets before the epoch and far in the future need no special handling.

use crate::chunk::HistoryChunk;
use crate::storage::error::{HistoryError, HistoryResult};
use crate::storage::sampling::{HistoryBucketRange, SamplingPeriod};
use crate::storage::types::{format_utc, TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

impl From<SamplingPeriod> for HistoryBucketRange {
    fn from(period: SamplingPeriod) -> Self {
        period.to_history_bucket_range()
    }
}

/// Identifies one bucket of one resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HistoryBucketDescriptor {
    /// The resolution tier
    pub range: HistoryBucketRange,
    /// Position along the time axis
    pub index: i64,
}

impl HistoryBucketDescriptor {
    pub fn for_index(index: i64, range: HistoryBucketRange) -> Self {
        Self { range, index }
    }

    /// The descriptor of the bucket containing `timestamp`.
    ///
    /// Accepts either a `HistoryBucketRange` or the `SamplingPeriod` of the tier.
    pub fn for_timestamp(timestamp: Timestamp, range: impl Into<HistoryBucketRange>) -> Self {
        let range = range.into();
        Self::for_index(range.calculate_index(timestamp), range)
    }

    /// The descriptor whose bucket starts exactly at `start`
    pub fn for_start(start: Timestamp, range: HistoryBucketRange) -> HistoryResult<Self> {
        let descriptor = Self::for_timestamp(start, range);
        if descriptor.start() != start {
            return Err(HistoryError::InvalidDescriptor(format!(
                "start {} is not aligned to {} (nearest bucket starts at {})",
                format_utc(start),
                range,
                format_utc(descriptor.start())
            )));
        }
        Ok(descriptor)
    }

    /// The descriptor of the bucket containing the first timestamp of `chunk`.
    /// `None` for an empty chunk.
    pub fn from_chunk(chunk: &HistoryChunk, sampling_period: SamplingPeriod) -> Option<Self> {
        chunk
            .first_timestamp()
            .map(|first| Self::for_timestamp(first, sampling_period))
    }

    /// Returns the descriptors whose buckets touch [start, end].
    ///
    /// A bucket starting exactly at `end` is only included if `include_end` is set.
    /// At most `max` descriptors are returned.
    pub fn for_range(
        start: Timestamp,
        end: Timestamp,
        range: HistoryBucketRange,
        include_end: bool,
        max: usize,
    ) -> Vec<Self> {
        let mut result = Vec::new();
        let mut current = Self::for_timestamp(start, range);

        while current.start() < end || (include_end && current.start() == end) {
            if result.len() >= max {
                tracing::warn!(
                    "for_range({}, {}, {}) stopped after {} descriptors",
                    format_utc(start),
                    format_utc(end),
                    range,
                    max
                );
                break;
            }
            result.push(current);
            current = current.next();
        }

        result
    }

    /// Start of the bucket (inclusive)
    pub fn start(&self) -> Timestamp {
        (self.index as f64) * self.range.duration()
    }

    /// End of the bucket (exclusive)
    pub fn end(&self) -> Timestamp {
        ((self.index + 1) as f64) * self.range.duration()
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.start(), self.end())
    }

    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start() && timestamp < self.end()
    }

    pub fn next(&self) -> Self {
        Self::for_index(self.index + 1, self.range)
    }

    pub fn previous(&self) -> Self {
        Self::for_index(self.index - 1, self.range)
    }

    pub fn next_n(&self, n: i64) -> Self {
        assert!(n > 0, "n must be greater than 0 but was {}", n);
        Self::for_index(self.index + n, self.range)
    }

    pub fn previous_n(&self, n: i64) -> Self {
        assert!(n > 0, "n must be greater than 0 but was {}", n);
        Self::for_index(self.index - n, self.range)
    }

    /// The descriptors of the next finer tier that cover this bucket.
    /// Empty for the finest tier.
    pub fn children(&self) -> Vec<Self> {
        match self.range.below() {
            Some(below) => {
                let count = (self.range.duration_millis() / below.duration_millis()) as usize;
                Self::for_range(self.start(), self.end(), below, false, count)
            }
            None => Vec::new(),
        }
    }

    /// The descriptor of the next coarser tier that contains this bucket
    pub fn parent(&self) -> Option<Self> {
        self.range
            .above()
            .map(|above| Self::for_timestamp(self.start(), above))
    }

    /// Number of buckets from this to `other` (positive if `other` is later)
    pub fn distance_to(&self, other: &HistoryBucketDescriptor) -> i64 {
        assert_eq!(
            self.range, other.range,
            "distance_to requires descriptors of the same range"
        );
        other.index - self.index
    }
}

impl fmt::Display for HistoryBucketDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]: {} - {}",
            self.range,
            self.index,
            format_utc(self.start()),
            format_utc(self.end())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::parse_utc;

    #[test]
    fn test_start_end() {
        let descriptor = HistoryBucketDescriptor::for_index(7, HistoryBucketRange::OneMinute);
        assert_eq!(descriptor.start(), 7.0 * 60_000.0);
        assert_eq!(descriptor.end(), 8.0 * 60_000.0);
        assert!(descriptor.contains(descriptor.start()));
        assert!(!descriptor.contains(descriptor.end()));
    }

    #[test]
    fn test_next_previous_round_trip() {
        for range in HistoryBucketRange::ALL {
            for index in [-12_345, -1, 0, 1, 987_654] {
                let d = HistoryBucketDescriptor::for_index(index, range);
                assert_eq!(d.next().previous(), d);
                assert_eq!(d.previous().next(), d);
                assert_eq!(d.start(), index as f64 * range.duration());
                assert_eq!(d.next().start(), d.end());
                assert_eq!(d.next_n(3), d.next().next().next());
                assert_eq!(d.previous_n(2), d.previous().previous());
            }
        }
    }

    #[test]
    fn test_before_epoch() {
        let d = HistoryBucketDescriptor::for_timestamp(-1.0, HistoryBucketRange::OneMinute);
        assert_eq!(d.index, -1);
        assert_eq!(d.start(), -60_000.0);
        assert_eq!(d.end(), 0.0);
    }

    #[test]
    fn test_for_timestamp_with_sampling_period() {
        let now = parse_utc("2021-03-27T21:45:23.002Z").unwrap();
        let d = HistoryBucketDescriptor::for_timestamp(now, SamplingPeriod::EveryHundredMillis);
        assert_eq!(d.range, HistoryBucketRange::OneMinute);
        assert_eq!(format_utc(d.start()), "2021-03-27T21:45:00.000Z");
        assert_eq!(format_utc(d.end()), "2021-03-27T21:46:00.000Z");
    }

    #[test]
    fn test_for_start() {
        let ok = HistoryBucketDescriptor::for_start(600_000.0, HistoryBucketRange::TenMinutes);
        assert_eq!(ok.unwrap().index, 1);

        let err = HistoryBucketDescriptor::for_start(600_001.0, HistoryBucketRange::TenMinutes);
        assert!(matches!(err, Err(HistoryError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_for_range() {
        let range = HistoryBucketRange::HundredMillis;
        let descriptors = HistoryBucketDescriptor::for_range(102.0, 480.0, range, true, 100);
        let starts: Vec<f64> = descriptors.iter().map(|d| d.start()).collect();
        assert_eq!(starts, vec![100.0, 200.0, 300.0, 400.0]);

        // end exactly on a boundary
        let inclusive = HistoryBucketDescriptor::for_range(100.0, 300.0, range, true, 100);
        assert_eq!(inclusive.len(), 3);
        let exclusive = HistoryBucketDescriptor::for_range(100.0, 300.0, range, false, 100);
        assert_eq!(exclusive.len(), 2);

        let limited = HistoryBucketDescriptor::for_range(0.0, 10_000.0, range, true, 5);
        assert_eq!(limited.len(), 5);
    }

    #[test]
    fn test_children_and_parent() {
        let d = HistoryBucketDescriptor::for_index(2, HistoryBucketRange::TenMinutes);
        let children = d.children();
        assert_eq!(children.len(), 10);
        assert_eq!(children[0].range, HistoryBucketRange::OneMinute);
        assert_eq!(children[0].start(), d.start());
        assert_eq!(children[9].end(), d.end());
        for child in &children {
            assert_eq!(child.parent(), Some(d));
        }

        assert!(HistoryBucketDescriptor::for_index(0, HistoryBucketRange::HundredMillis)
            .children()
            .is_empty());
        assert_eq!(
            HistoryBucketDescriptor::for_index(0, HistoryBucketRange::SevenHundredTwentyYears)
                .parent(),
            None
        );
    }

    #[test]
    fn test_from_chunk() {
        use crate::chunk::{HistoryChunkBuilder, HistoryConfiguration};

        let configuration = HistoryConfiguration::only_decimals(&[1], &["v"]);
        let empty = HistoryChunkBuilder::new(configuration.clone()).build();
        assert!(HistoryBucketDescriptor::from_chunk(&empty, SamplingPeriod::EveryHundredMillis).is_none());

        let mut builder = HistoryChunkBuilder::new(configuration);
        builder.add_decimal_values(61_000.0, &[1.0]);
        let descriptor =
            HistoryBucketDescriptor::from_chunk(&builder.build(), SamplingPeriod::EveryHundredMillis).unwrap();
        assert_eq!(descriptor, HistoryBucketDescriptor::for_index(1, HistoryBucketRange::OneMinute));
    }

    #[test]
    fn test_ordering_and_distance() {
        let a = HistoryBucketDescriptor::for_index(3, HistoryBucketRange::OneMinute);
        let b = HistoryBucketDescriptor::for_index(8, HistoryBucketRange::OneMinute);
        assert!(a < b);
        assert_eq!(a.distance_to(&b), 5);
        assert_eq!(b.distance_to(&a), -5);
    }
}
