//! Sampling periods and bucket ranges (resolution tiers)
//!
//! Every `HistoryBucketRange` has exactly one `SamplingPeriod`: the spacing of
//! the sample slots within a bucket of that range. Both enums are ordered from
//! finest to coarsest.
//!
//! ```text
//! range                     sampling   entries   duration
//! HundredMillis             1ms        100       100ms
//! FiveSeconds               10ms       500       5s
//! OneMinute                 100ms      600       1min
//! TenMinutes                1s         600       10min
//! OneHour                   10s        360       1h
//! SixHours                  1min       360       6h
//! OneDay                    10min      144       24h
//! ThirtyDays                1h         720       30d
//! OneQuarter                6h         360       90d
//! OneYear                   24h        360       360d
//! FiveYears                 5d         360       1800d
//! ThirtyYears               30d        360       10800d
//! NinetyYears               90d        360       32400d
//! SevenHundredTwentyYears   360d       720       259200d
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

const SECOND: i64 = 1000;
const MINUTE: i64 = 60 * SECOND;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// The distance between two samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SamplingPeriod {
    EveryMillisecond,
    EveryTenMillis,
    EveryHundredMillis,
    EverySecond,
    EveryTenSeconds,
    EveryMinute,
    EveryTenMinutes,
    EveryHour,
    Every6Hours,
    Every24Hours,
    Every5Days,
    Every30Days,
    Every90Days,
    Every360Days,
}

impl SamplingPeriod {
    /// All sampling periods, finest first
    pub const ALL: [SamplingPeriod; 14] = [
        SamplingPeriod::EveryMillisecond,
        SamplingPeriod::EveryTenMillis,
        SamplingPeriod::EveryHundredMillis,
        SamplingPeriod::EverySecond,
        SamplingPeriod::EveryTenSeconds,
        SamplingPeriod::EveryMinute,
        SamplingPeriod::EveryTenMinutes,
        SamplingPeriod::EveryHour,
        SamplingPeriod::Every6Hours,
        SamplingPeriod::Every24Hours,
        SamplingPeriod::Every5Days,
        SamplingPeriod::Every30Days,
        SamplingPeriod::Every90Days,
        SamplingPeriod::Every360Days,
    ];

    /// Distance between two samples in milliseconds
    pub fn distance_millis(&self) -> i64 {
        match self {
            SamplingPeriod::EveryMillisecond => 1,
            SamplingPeriod::EveryTenMillis => 10,
            SamplingPeriod::EveryHundredMillis => 100,
            SamplingPeriod::EverySecond => SECOND,
            SamplingPeriod::EveryTenSeconds => 10 * SECOND,
            SamplingPeriod::EveryMinute => MINUTE,
            SamplingPeriod::EveryTenMinutes => 10 * MINUTE,
            SamplingPeriod::EveryHour => HOUR,
            SamplingPeriod::Every6Hours => 6 * HOUR,
            SamplingPeriod::Every24Hours => DAY,
            SamplingPeriod::Every5Days => 5 * DAY,
            SamplingPeriod::Every30Days => 30 * DAY,
            SamplingPeriod::Every90Days => 90 * DAY,
            SamplingPeriod::Every360Days => 360 * DAY,
        }
    }

    pub fn distance(&self) -> f64 {
        self.distance_millis() as f64
    }

    fn position(&self) -> usize {
        *self as usize
    }

    /// The next coarser sampling period
    pub fn above(&self) -> Option<SamplingPeriod> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// The next finer sampling period
    pub fn below(&self) -> Option<SamplingPeriod> {
        self.position().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// The bucket range that stores samples with this period
    pub fn to_history_bucket_range(&self) -> HistoryBucketRange {
        HistoryBucketRange::ALL[self.position()]
    }

    /// Returns the coarsest sampling period whose distance does not exceed `max_distance`.
    /// Falls back to the finest period.
    pub fn with_max_distance(max_distance: f64) -> SamplingPeriod {
        Self::ALL
            .iter()
            .rev()
            .find(|p| p.distance() <= max_distance)
            .copied()
            .unwrap_or(SamplingPeriod::EveryMillisecond)
    }
}

impl fmt::Display for SamplingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The resolution tiers of the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HistoryBucketRange {
    HundredMillis,
    FiveSeconds,
    OneMinute,
    TenMinutes,
    OneHour,
    SixHours,
    OneDay,
    ThirtyDays,
    OneQuarter,
    OneYear,
    FiveYears,
    ThirtyYears,
    NinetyYears,
    SevenHundredTwentyYears,
}

impl HistoryBucketRange {
    /// All ranges, finest first
    pub const ALL: [HistoryBucketRange; 14] = [
        HistoryBucketRange::HundredMillis,
        HistoryBucketRange::FiveSeconds,
        HistoryBucketRange::OneMinute,
        HistoryBucketRange::TenMinutes,
        HistoryBucketRange::OneHour,
        HistoryBucketRange::SixHours,
        HistoryBucketRange::OneDay,
        HistoryBucketRange::ThirtyDays,
        HistoryBucketRange::OneQuarter,
        HistoryBucketRange::OneYear,
        HistoryBucketRange::FiveYears,
        HistoryBucketRange::ThirtyYears,
        HistoryBucketRange::NinetyYears,
        HistoryBucketRange::SevenHundredTwentyYears,
    ];

    fn position(&self) -> usize {
        *self as usize
    }

    /// The spacing of the sample slots within a bucket
    pub fn sampling_period(&self) -> SamplingPeriod {
        SamplingPeriod::ALL[self.position()]
    }

    /// The number of sample slots in one bucket
    pub fn entries_count(&self) -> usize {
        match self {
            HistoryBucketRange::HundredMillis => 100,
            HistoryBucketRange::FiveSeconds => 500,
            HistoryBucketRange::OneMinute => 600,
            HistoryBucketRange::TenMinutes => 600,
            HistoryBucketRange::OneHour => 360,
            HistoryBucketRange::SixHours => 360,
            HistoryBucketRange::OneDay => 144,
            HistoryBucketRange::ThirtyDays => 720,
            HistoryBucketRange::OneQuarter => 360,
            HistoryBucketRange::OneYear => 360,
            HistoryBucketRange::FiveYears => 360,
            HistoryBucketRange::ThirtyYears => 360,
            HistoryBucketRange::NinetyYears => 360,
            HistoryBucketRange::SevenHundredTwentyYears => 720,
        }
    }

    /// Distance between two slots in milliseconds
    pub fn distance(&self) -> f64 {
        self.sampling_period().distance()
    }

    pub fn duration_millis(&self) -> i64 {
        self.sampling_period().distance_millis() * self.entries_count() as i64
    }

    /// Duration of one bucket in milliseconds
    pub fn duration(&self) -> f64 {
        self.duration_millis() as f64
    }

    /// The next coarser range (roll-up target)
    pub fn above(&self) -> Option<HistoryBucketRange> {
        Self::ALL.get(self.position() + 1).copied()
    }

    /// The next finer range (roll-up source)
    pub fn below(&self) -> Option<HistoryBucketRange> {
        self.position().checked_sub(1).map(|i| Self::ALL[i])
    }

    /// How many slots of the finer range are combined into one slot of this range
    pub fn down_sampling_factor(&self) -> Option<i64> {
        self.below().map(|below| {
            self.sampling_period().distance_millis() / below.sampling_period().distance_millis()
        })
    }

    /// Index of the bucket containing `timestamp`
    pub fn calculate_index(&self, timestamp: f64) -> i64 {
        (timestamp / self.duration()).floor() as i64
    }

    pub fn is_finest(&self) -> bool {
        self.below().is_none()
    }

    pub fn is_coarsest(&self) -> bool {
        self.above().is_none()
    }
}

impl fmt::Display for HistoryBucketRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        assert_eq!(HistoryBucketRange::HundredMillis.duration(), 100.0);
        assert_eq!(HistoryBucketRange::FiveSeconds.duration(), 5_000.0);
        assert_eq!(HistoryBucketRange::OneMinute.duration(), 60_000.0);
        assert_eq!(HistoryBucketRange::TenMinutes.duration(), 600_000.0);
        assert_eq!(HistoryBucketRange::OneHour.duration(), 3_600_000.0);
        assert_eq!(HistoryBucketRange::OneDay.duration_millis(), DAY);
        assert_eq!(HistoryBucketRange::ThirtyDays.duration_millis(), 30 * DAY);
        assert_eq!(HistoryBucketRange::OneQuarter.duration_millis(), 90 * DAY);
        assert_eq!(HistoryBucketRange::OneYear.duration_millis(), 360 * DAY);
        assert_eq!(
            HistoryBucketRange::SevenHundredTwentyYears.duration_millis(),
            720 * 360 * DAY
        );
    }

    #[test]
    fn test_strict_order_and_neighbors() {
        for window in HistoryBucketRange::ALL.windows(2) {
            assert!(window[0] < window[1]);
            assert!(window[0].duration() < window[1].duration());
            assert!(window[0].distance() < window[1].distance());
            assert_eq!(window[0].above(), Some(window[1]));
            assert_eq!(window[1].below(), Some(window[0]));
        }
        assert_eq!(HistoryBucketRange::HundredMillis.below(), None);
        assert_eq!(HistoryBucketRange::SevenHundredTwentyYears.above(), None);
        assert!(HistoryBucketRange::HundredMillis.is_finest());
        assert!(HistoryBucketRange::SevenHundredTwentyYears.is_coarsest());
    }

    #[test]
    fn test_down_sampling_factor_is_integral() {
        assert_eq!(HistoryBucketRange::HundredMillis.down_sampling_factor(), None);
        assert_eq!(HistoryBucketRange::TenMinutes.down_sampling_factor(), Some(10));
        assert_eq!(HistoryBucketRange::SixHours.down_sampling_factor(), Some(6));
        for range in HistoryBucketRange::ALL.iter().skip(1) {
            let below = range.below().unwrap();
            assert_eq!(
                range.sampling_period().distance_millis() % below.sampling_period().distance_millis(),
                0,
                "{} is not a multiple of {}",
                range,
                below
            );
            // a coarser bucket always covers whole finer buckets
            assert_eq!(range.duration_millis() % below.duration_millis(), 0);
        }
    }

    #[test]
    fn test_sampling_period_mapping() {
        for period in SamplingPeriod::ALL {
            assert_eq!(period.to_history_bucket_range().sampling_period(), period);
        }
        assert_eq!(
            SamplingPeriod::EveryHundredMillis.to_history_bucket_range(),
            HistoryBucketRange::OneMinute
        );
        assert_eq!(SamplingPeriod::EveryMillisecond.below(), None);
        assert_eq!(
            SamplingPeriod::EverySecond.above(),
            Some(SamplingPeriod::EveryTenSeconds)
        );
    }

    #[test]
    fn test_calculate_index() {
        let range = HistoryBucketRange::OneMinute;
        assert_eq!(range.calculate_index(0.0), 0);
        assert_eq!(range.calculate_index(59_999.0), 0);
        assert_eq!(range.calculate_index(60_000.0), 1);
        assert_eq!(range.calculate_index(-1.0), -1);
    }

    #[test]
    fn test_with_max_distance() {
        assert_eq!(
            SamplingPeriod::with_max_distance(150.0),
            SamplingPeriod::EveryHundredMillis
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(0.5),
            SamplingPeriod::EveryMillisecond
        );
        assert_eq!(
            SamplingPeriod::with_max_distance(f64::MAX),
            SamplingPeriod::Every360Days
        );
    }
}
