//! Retention policy: how many buckets of each tier are kept

use crate::storage::{HistoryBucketRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of buckets kept per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxHistorySizeConfiguration {
    pub kept_buckets_count: usize,
}

impl MaxHistorySizeConfiguration {
    /// # Panics
    /// Panics if `kept_buckets_count` is 0
    pub fn new(kept_buckets_count: usize) -> Self {
        assert!(kept_buckets_count > 0, "at least one bucket must be kept");
        Self { kept_buckets_count }
    }

    /// Keeps enough buckets of `range` to cover `duration` (ms).
    ///
    /// `for_duration(60 * 60 * 1000 - 7, OneMinute)` keeps 60 buckets.
    pub fn for_duration(duration: f64, range: HistoryBucketRange) -> Self {
        let buckets = (duration / range.duration()).ceil();
        Self::new((buckets as usize).max(1))
    }

    /// Keeps enough buckets of `range` to hold `max_entries` samples, plus one
    /// bucket for the partially filled newest bucket
    pub fn for_max_entries(max_entries: usize, range: HistoryBucketRange) -> Self {
        Self::new(max_entries.div_ceil(range.entries_count()) + 1)
    }

    /// The maximum number of samples kept in `range`
    pub fn max_entries(&self, range: HistoryBucketRange) -> usize {
        self.kept_buckets_count * range.entries_count()
    }

    /// The duration that is always available in `range`
    pub fn guaranteed_duration(&self, range: HistoryBucketRange) -> f64 {
        self.kept_buckets_count as f64 * range.duration()
    }

    /// Number of samples with the given distance that fit into the guaranteed duration
    pub fn guaranteed_timestamps_count(&self, range: HistoryBucketRange, sample_distance: f64) -> usize {
        (self.guaranteed_duration(range) / sample_distance).floor() as usize
    }

    /// The oldest timestamp still guaranteed when `now` is the newest timestamp
    pub fn guaranteed_start(&self, range: HistoryBucketRange, now: Timestamp) -> Timestamp {
        now - self.guaranteed_duration(range)
    }
}

impl fmt::Display for MaxHistorySizeConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} buckets", self.kept_buckets_count)
    }
}
