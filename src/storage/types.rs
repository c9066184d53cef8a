//! Core value types shared by the history storage layer
//!
//! - `Timestamp`: milliseconds since epoch as `f64` (down-sampled slots sit on
//!   half milliseconds, so an integer type is not enough)
//! - `TimeRange` / `TimeRanges`: closed time intervals used for dirty tracking
//!   and down-sampling jobs
//! - `HistoryUpdateInfo`: what changed, delivered to storage observers

use crate::storage::descriptor::HistoryBucketDescriptor;
use crate::storage::sampling::SamplingPeriod;
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliseconds since 1970-01-01T00:00:00Z
pub type Timestamp = f64;

/// Formats a timestamp as ISO 8601 in UTC with millisecond precision
pub fn format_utc(timestamp: Timestamp) -> String {
    if !timestamp.is_finite() {
        return format!("{}", timestamp);
    }
    match Utc.timestamp_millis_opt(timestamp.floor() as i64).single() {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => format!("{}", timestamp),
    }
}

/// Parses an RFC 3339 date time into a timestamp
pub fn parse_utc(text: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis() as f64)
}

/// Time range (closed interval: [start, end])
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start timestamp (inclusive), in milliseconds
    pub start: Timestamp,
    /// End timestamp, in milliseconds
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    ///
    /// # Panics
    /// Panics if start > end or either bound is NaN
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        assert!(
            start <= end,
            "TimeRange: start <{}> must not be after end <{}>",
            start,
            end
        );
        Self { start, end }
    }

    /// Create a time range, returning None if invalid
    pub fn try_new(start: Timestamp, end: Timestamp) -> Option<Self> {
        if start <= end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn from_start_and_duration(start: Timestamp, duration: f64) -> Self {
        Self::new(start, start + duration)
    }

    /// Check if a timestamp falls within this range (both bounds inclusive)
    pub fn contains(&self, timestamp: Timestamp) -> bool {
        timestamp >= self.start && timestamp <= self.end
    }

    /// Check if [start, end] lies completely within this range
    pub fn contains_range(&self, start: Timestamp, end: Timestamp) -> bool {
        self.start <= start && end <= self.end
    }

    /// Check if this range overlaps with another
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && self.end >= other.start
    }

    /// Get the duration in milliseconds
    pub fn span(&self) -> f64 {
        self.end - self.start
    }

    /// Clamps this range into [start, end]
    pub fn fit_within(&self, start: Timestamp, end: Timestamp) -> Self {
        let fitted_start = self.start.max(start);
        let fitted_end = self.end.min(end);
        Self::new(fitted_start, fitted_end.max(fitted_start))
    }

    /// Get intersection with another range, if any
    pub fn intersection(&self, other: &TimeRange) -> Option<Self> {
        Self::try_new(self.start.max(other.start), self.end.min(other.end))
    }

    /// Smallest range covering both ranges
    pub fn union(&self, other: &TimeRange) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", format_utc(self.start), format_utc(self.end))
    }
}

/// Sorted, non-overlapping list of time ranges
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeRanges {
    ranges: Vec<TimeRange>,
}

impl TimeRanges {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn of(range: TimeRange) -> Self {
        Self {
            ranges: vec![range],
        }
    }

    /// Creates the ranges, merging overlapping and touching entries
    pub fn from_ranges(ranges: impl IntoIterator<Item = TimeRange>) -> Self {
        let mut result = Self::empty();
        for range in ranges {
            result.add(range);
        }
        result
    }

    /// Adds a range, keeping the list sorted and merged
    pub fn add(&mut self, range: TimeRange) {
        let insert_at = self
            .ranges
            .partition_point(|existing| existing.start < range.start);
        self.ranges.insert(insert_at, range);

        let mut merged: Vec<TimeRange> = Vec::with_capacity(self.ranges.len());
        for current in self.ranges.drain(..) {
            match merged.last_mut() {
                Some(last) if last.overlaps(&current) => *last = last.union(&current),
                _ => merged.push(current),
            }
        }
        self.ranges = merged;
    }

    /// Returns a copy with `other` merged into this
    pub fn merge(&self, other: &TimeRanges) -> Self {
        let mut result = self.clone();
        for range in other.iter() {
            result.add(*range);
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeRange> {
        self.ranges.iter()
    }

    pub fn first_start(&self) -> Option<Timestamp> {
        self.ranges.first().map(|r| r.start)
    }

    pub fn last_end(&self) -> Option<Timestamp> {
        self.ranges.last().map(|r| r.end)
    }

    /// Distance between the first start and the last end (0 if empty)
    pub fn span(&self) -> f64 {
        match (self.first_start(), self.last_end()) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }
}

impl<'a> IntoIterator for &'a TimeRanges {
    type Item = &'a TimeRange;
    type IntoIter = std::slice::Iter<'a, TimeRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// What happened to a bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateKind {
    /// The bucket has been created or replaced
    Stored,
    /// The bucket has been removed
    Deleted,
}

/// Describes an update of the history, delivered to observers
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryUpdateInfo {
    /// The sampling period of the updated tier
    pub sampling_period: SamplingPeriod,
    /// The time ranges that have changed
    pub time_ranges: TimeRanges,
    pub kind: UpdateKind,
}

impl HistoryUpdateInfo {
    pub fn new(sampling_period: SamplingPeriod, time_ranges: TimeRanges) -> Self {
        Self {
            sampling_period,
            time_ranges,
            kind: UpdateKind::Stored,
        }
    }

    pub fn for_range(sampling_period: SamplingPeriod, range: TimeRange) -> Self {
        Self::new(sampling_period, TimeRanges::of(range))
    }

    /// Update covering the complete window of the descriptor
    pub fn from_descriptor(descriptor: &HistoryBucketDescriptor) -> Self {
        Self::for_range(
            descriptor.range.sampling_period(),
            TimeRange::new(descriptor.start(), descriptor.end()),
        )
    }

    /// Update describing the removal of the descriptor
    pub fn for_deletion(descriptor: &HistoryBucketDescriptor) -> Self {
        Self {
            kind: UpdateKind::Deleted,
            ..Self::from_descriptor(descriptor)
        }
    }

    pub fn is_deletion(&self) -> bool {
        self.kind == UpdateKind::Deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse_utc() {
        let ts = parse_utc("2021-03-27T21:45:23.002Z").unwrap();
        assert_eq!(ts, 1_616_881_523_002.0);
        assert_eq!(format_utc(ts), "2021-03-27T21:45:23.002Z");
        assert_eq!(format_utc(f64::NAN), "NaN");
    }

    #[test]
    fn test_time_range_contains() {
        let range = TimeRange::new(100.0, 200.0);
        assert!(range.contains(100.0));
        assert!(range.contains(200.0));
        assert!(!range.contains(200.5));
        assert!(range.contains_range(100.0, 200.0));
        assert!(!range.contains_range(99.0, 150.0));
    }

    #[test]
    fn test_fit_within() {
        let range = TimeRange::new(102.0, 480.0);
        assert_eq!(range.fit_within(100.0, 200.0), TimeRange::new(102.0, 200.0));
        assert_eq!(range.fit_within(400.0, 500.0), TimeRange::new(400.0, 480.0));
        assert_eq!(range.fit_within(200.0, 300.0), TimeRange::new(200.0, 300.0));
    }

    #[test]
    #[should_panic]
    fn test_invalid_range_panics() {
        TimeRange::new(10.0, 5.0);
    }

    #[test]
    fn test_time_ranges_merge() {
        let mut ranges = TimeRanges::empty();
        assert!(ranges.is_empty());
        assert_eq!(ranges.span(), 0.0);

        ranges.add(TimeRange::new(300.0, 400.0));
        ranges.add(TimeRange::new(100.0, 200.0));
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges.first_start(), Some(100.0));
        assert_eq!(ranges.last_end(), Some(400.0));

        // bridges both
        ranges.add(TimeRange::new(150.0, 350.0));
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges.span(), 300.0);
    }

    #[test]
    fn test_update_info_for_deletion() {
        let descriptor = HistoryBucketDescriptor::for_index(
            3,
            crate::storage::sampling::HistoryBucketRange::HundredMillis,
        );
        let info = HistoryUpdateInfo::for_deletion(&descriptor);
        assert!(info.is_deletion());
        assert_eq!(info.sampling_period, SamplingPeriod::EveryMillisecond);
        assert_eq!(info.time_ranges.first_start(), Some(300.0));
        assert_eq!(info.time_ranges.last_end(), Some(400.0));
    }
}
