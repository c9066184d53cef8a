//! Down-sampling service
//!
//! Keeps the coarser tiers consistent with the finer ones. A recalculation is
//! planned as one job per target bucket:
//!
//! ```text
//! dirty:   [102 ─────────────────────── 480]
//! buckets: |100    |200    |300    |400    |
//! jobs:     partial complete complete partial
//!           [102,200]              [400,480]
//! ```
//!
//! Every job recomputes the whole target bucket from its children. The
//! refresh range only ends up in the update info, so observers know which
//! part of the bucket actually changed.

use crate::chunk::HistoryChunk;
use crate::downsampling::calculations::calculate_down_sampled;
use crate::downsampling::dirty::{lock_collector, DownSamplingDirtyRangesCollector};
use crate::storage::error::HistoryResult;
use crate::storage::{
    HistoryBucketDescriptor, HistoryBucketRange, HistoryUpdateInfo, SamplingPeriod, TimeRange, TimeRanges,
    Timestamp, WritableHistoryStorage,
};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

/// Upper bound for the number of target buckets of one dirty range
const MAX_JOBS_PER_RANGE: usize = 10_000;

/// Which part of a target bucket has changed
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshRange {
    /// The complete bucket
    Complete,
    /// Only these ranges (all within the bucket)
    Partial(TimeRanges),
}

/// Recalculation of one target bucket
#[derive(Debug, Clone, PartialEq)]
pub struct DownSamplingJob {
    pub descriptor: HistoryBucketDescriptor,
    pub refresh_range: RefreshRange,
}

impl DownSamplingJob {
    /// # Panics
    /// Panics if a partial range is empty or not within the descriptor
    pub fn new(descriptor: HistoryBucketDescriptor, refresh_range: RefreshRange) -> Self {
        if let RefreshRange::Partial(ranges) = &refresh_range {
            assert!(!ranges.is_empty(), "partial refresh of {} without ranges", descriptor);
            for range in ranges {
                assert!(
                    descriptor.contains(range.start),
                    "refresh range {} does not start within {}",
                    range,
                    descriptor
                );
                assert!(
                    range.end <= descriptor.end(),
                    "refresh range {} ends after {}",
                    range,
                    descriptor
                );
            }
        }
        Self {
            descriptor,
            refresh_range,
        }
    }

    pub fn complete(descriptor: HistoryBucketDescriptor) -> Self {
        Self::new(descriptor, RefreshRange::Complete)
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.refresh_range, RefreshRange::Complete)
    }

    /// The changed ranges of the bucket
    pub fn time_ranges(&self) -> TimeRanges {
        match &self.refresh_range {
            RefreshRange::Complete => TimeRanges::of(self.descriptor.time_range()),
            RefreshRange::Partial(ranges) => ranges.clone(),
        }
    }

    pub fn start(&self) -> Timestamp {
        self.descriptor.start()
    }

    /// What observers are told after `chunk` was stored for this job.
    ///
    /// A complete job reports the rows of the calculated chunk, a partial job
    /// only its refresh ranges.
    fn update_info(&self, chunk: &HistoryChunk) -> HistoryUpdateInfo {
        let sampling_period = self.descriptor.range.sampling_period();
        match &self.refresh_range {
            RefreshRange::Complete => match chunk.time_range() {
                Some(time_range) => HistoryUpdateInfo::for_range(sampling_period, time_range),
                None => HistoryUpdateInfo::from_descriptor(&self.descriptor),
            },
            RefreshRange::Partial(ranges) => HistoryUpdateInfo::new(sampling_period, ranges.clone()),
        }
    }

    /// Adds the ranges of `other` (same descriptor)
    fn absorb(&mut self, other: DownSamplingJob) {
        debug_assert_eq!(self.descriptor, other.descriptor);
        self.refresh_range = match (&self.refresh_range, other.refresh_range) {
            (RefreshRange::Partial(own), RefreshRange::Partial(theirs)) => RefreshRange::Partial(own.merge(&theirs)),
            _ => RefreshRange::Complete,
        };
    }
}

impl fmt::Display for DownSamplingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.refresh_range {
            RefreshRange::Complete => write!(f, "{} (complete)", self.descriptor),
            RefreshRange::Partial(ranges) => {
                write!(f, "{} (partial:", self.descriptor)?;
                for range in ranges {
                    write!(f, " [{}]", range)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// Plans the jobs for `time_ranges` in the tier `range`.
///
/// One job per touched bucket, sorted by start. A bucket that is covered
/// completely by one of the ranges is refreshed completely.
pub fn create_jobs(time_ranges: &TimeRanges, range: HistoryBucketRange) -> Vec<DownSamplingJob> {
    // Descriptors of one tier order by index, which is the order by start
    let mut jobs: BTreeMap<HistoryBucketDescriptor, DownSamplingJob> = BTreeMap::new();

    for time_range in time_ranges {
        let descriptors =
            HistoryBucketDescriptor::for_range(time_range.start, time_range.end, range, true, MAX_JOBS_PER_RANGE);
        for descriptor in descriptors {
            let job = job_for(time_range, descriptor);
            match jobs.entry(descriptor) {
                Entry::Occupied(mut existing) => existing.get_mut().absorb(job),
                Entry::Vacant(slot) => {
                    slot.insert(job);
                }
            }
        }
    }

    jobs.into_values().collect()
}

fn job_for(time_range: &TimeRange, descriptor: HistoryBucketDescriptor) -> DownSamplingJob {
    if time_range.contains_range(descriptor.start(), descriptor.end()) {
        DownSamplingJob::complete(descriptor)
    } else {
        let fitted = time_range.fit_within(descriptor.start(), descriptor.end());
        DownSamplingJob::new(descriptor, RefreshRange::Partial(TimeRanges::of(fitted)))
    }
}

/// Recalculates down-sampled buckets of a storage
pub struct DownSamplingService<'a, S: WritableHistoryStorage> {
    storage: &'a mut S,
}

impl<'a, S: WritableHistoryStorage> DownSamplingService<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        self.storage
    }

    /// Recalculates every bucket of `range` touched by `time_ranges` from the
    /// buckets of the next finer tier.
    ///
    /// A target bucket without any children left is deleted. Returns the
    /// number of executed jobs.
    pub fn recalculate_down_sampling(
        &mut self,
        time_ranges: &TimeRanges,
        range: HistoryBucketRange,
    ) -> HistoryResult<usize> {
        if time_ranges.is_empty() {
            return Ok(0);
        }
        if range.is_finest() {
            tracing::warn!("{} has no finer tier to down-sample from", range);
            return Ok(0);
        }

        let jobs = create_jobs(time_ranges, range);
        tracing::debug!("{} down-sampling jobs for {}", jobs.len(), range);

        for job in &jobs {
            self.execute(job)?;
        }
        Ok(jobs.len())
    }

    fn execute(&mut self, job: &DownSamplingJob) -> HistoryResult<()> {
        let children = self.storage.get_all(&job.descriptor.children())?;
        if children.is_empty() {
            tracing::debug!("{}: no children left, deleting", job);
            self.storage.delete(&job.descriptor)?;
            return Ok(());
        }

        tracing::debug!("{}: down-sampling {} children", job, children.len());
        let bucket = calculate_down_sampled(job.descriptor, &children);
        let update_info = job.update_info(&bucket.chunk);
        self.storage.store_without_cache(bucket, update_info)
    }

    /// Recalculates all dirty ranges of all tiers, finest first.
    ///
    /// Stores of a finer tier mark the next coarser tier dirty, so the
    /// changes cascade up within one call.
    pub fn recalculate_down_sampling_collected(
        &mut self,
        collector: &Mutex<DownSamplingDirtyRangesCollector>,
    ) -> HistoryResult<usize> {
        self.recalculate_where(collector, |_, _| true)
    }

    /// Like `recalculate_down_sampling_collected`, but skips tiers whose dirty
    /// span is shorter than half of their sampling distance
    pub fn calculate_down_sampling_if_required(
        &mut self,
        collector: &Mutex<DownSamplingDirtyRangesCollector>,
    ) -> HistoryResult<usize> {
        self.recalculate_where(collector, |period, dirty| dirty.span() >= period.distance() / 2.0)
    }

    fn recalculate_where<F>(
        &mut self,
        collector: &Mutex<DownSamplingDirtyRangesCollector>,
        required: F,
    ) -> HistoryResult<usize>
    where
        F: Fn(SamplingPeriod, &TimeRanges) -> bool,
    {
        let mut executed = 0;
        for period in SamplingPeriod::ALL {
            // The lock must be released before storing: the storage observer takes it too
            let dirty = {
                let mut guard = lock_collector(collector)?;
                let dirty = guard.get(period);
                if dirty.is_empty() || !required(period, &dirty) {
                    continue;
                }
                guard.remove(period)
            };
            executed += self.recalculate_down_sampling(&dirty, period.to_history_bucket_range())?;
        }
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{HistoryBucket, HistoryChunkBuilder, HistoryConfiguration, RecordingType};
    use crate::storage::{HistoryStorage, InMemoryHistoryStorage};
    use std::sync::Arc;

    fn minute_bucket(index: i64, value: f64) -> HistoryBucket {
        let descriptor = HistoryBucketDescriptor::for_index(index, HistoryBucketRange::OneMinute);
        let mut builder = HistoryChunkBuilder::new(HistoryConfiguration::only_decimals(&[1], &["v"]));
        for i in 0..600 {
            builder.add_decimal_values(descriptor.start() + i as f64 * 100.0, &[value]);
        }
        HistoryBucket::new(descriptor, builder.build())
    }

    fn store_minute(storage: &mut InMemoryHistoryStorage, index: i64, value: f64) {
        let bucket = minute_bucket(index, value);
        let info = HistoryUpdateInfo::from_descriptor(&bucket.descriptor);
        storage.store_without_cache(bucket, info).unwrap();
    }

    #[test]
    fn test_create_jobs_partial_and_complete() {
        let ranges = TimeRanges::of(TimeRange::new(102.0, 480.0));
        let jobs = create_jobs(&ranges, HistoryBucketRange::HundredMillis);

        assert_eq!(jobs.len(), 4);
        assert_eq!(
            jobs[0].refresh_range,
            RefreshRange::Partial(TimeRanges::of(TimeRange::new(102.0, 200.0)))
        );
        assert!(jobs[1].is_complete());
        assert!(jobs[2].is_complete());
        assert_eq!(
            jobs[3].refresh_range,
            RefreshRange::Partial(TimeRanges::of(TimeRange::new(400.0, 480.0)))
        );
        assert_eq!(jobs[3].descriptor.start(), 400.0);
    }

    #[test]
    fn test_create_jobs_empty() {
        assert!(create_jobs(&TimeRanges::empty(), HistoryBucketRange::OneMinute).is_empty());
    }

    #[test]
    fn test_create_jobs_merges_same_bucket() {
        let ranges = TimeRanges::from_ranges([TimeRange::new(110.0, 120.0), TimeRange::new(150.0, 160.0)]);
        let jobs = create_jobs(&ranges, HistoryBucketRange::HundredMillis);
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].time_ranges().len(), 2);

        let ranges = TimeRanges::from_ranges([TimeRange::new(0.0, 100.0), TimeRange::new(150.0, 160.0)]);
        let jobs = create_jobs(&ranges, HistoryBucketRange::HundredMillis);
        // [0, 100] covers bucket 0 completely and touches bucket 1 at its start
        assert_eq!(jobs.len(), 2);
        assert!(jobs[0].is_complete());
        assert_eq!(
            jobs[1].time_ranges(),
            TimeRanges::from_ranges([TimeRange::new(100.0, 100.0), TimeRange::new(150.0, 160.0)])
        );
    }

    #[test]
    fn test_create_jobs_many_disjoint_ranges() {
        // one short range in every other bucket, given newest first
        let ranges = TimeRanges::from_ranges(
            (0..5_000).rev().map(|i| TimeRange::new(i as f64 * 200.0 + 10.0, i as f64 * 200.0 + 20.0)),
        );
        let jobs = create_jobs(&ranges, HistoryBucketRange::HundredMillis);

        assert_eq!(jobs.len(), 5_000);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.descriptor.index, i as i64 * 2);
            assert!(!job.is_complete());
        }
        assert!(jobs.windows(2).all(|pair| pair[0].start() < pair[1].start()));
    }

    #[test]
    #[should_panic(expected = "does not start within")]
    fn test_job_rejects_range_outside_bucket() {
        let descriptor = HistoryBucketDescriptor::for_index(1, HistoryBucketRange::HundredMillis);
        DownSamplingJob::new(
            descriptor,
            RefreshRange::Partial(TimeRanges::of(TimeRange::new(50.0, 150.0))),
        );
    }

    #[test]
    fn test_recalculate_stores_and_deletes() {
        let mut storage = InMemoryHistoryStorage::new();
        store_minute(&mut storage, 0, 1.0);
        store_minute(&mut storage, 1, 3.0);

        let ranges = TimeRanges::of(TimeRange::new(0.0, 120_000.0));
        let executed = DownSamplingService::new(&mut storage)
            .recalculate_down_sampling(&ranges, HistoryBucketRange::TenMinutes)
            .unwrap();
        assert_eq!(executed, 1);

        let buckets = storage.query(0.0, 600_000.0, SamplingPeriod::EverySecond).unwrap();
        assert_eq!(buckets.len(), 1);
        let chunk = &buckets[0].chunk;
        assert_eq!(chunk.recording_type(), RecordingType::Calculated);
        assert_eq!(chunk.get_decimal_value(0, 0), 1.0);
        assert_eq!(chunk.get_decimal_value(0, 60), 3.0);
        assert!(chunk.get_decimal_value(0, 120).is_nan());

        storage.clear().unwrap();
        DownSamplingService::new(&mut storage)
            .recalculate_down_sampling(&ranges, HistoryBucketRange::TenMinutes)
            .unwrap();
        assert_eq!(storage.bucket_count(HistoryBucketRange::TenMinutes), 0);
    }

    #[test]
    fn test_update_info_follows_calculated_rows() {
        let mut storage = InMemoryHistoryStorage::new();
        store_minute(&mut storage, 0, 1.0);

        let seen: Arc<Mutex<Vec<HistoryUpdateInfo>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        storage.observe(Box::new(move |_: &HistoryBucketDescriptor, info: &HistoryUpdateInfo| {
            captured.lock().unwrap().push(info.clone());
        }));

        let descriptor = HistoryBucketDescriptor::for_index(0, HistoryBucketRange::TenMinutes);
        let mut service = DownSamplingService::new(&mut storage);
        service.execute(&DownSamplingJob::complete(descriptor)).unwrap();
        let partial = TimeRanges::of(TimeRange::new(1_000.0, 2_000.0));
        service
            .execute(&DownSamplingJob::new(descriptor, RefreshRange::Partial(partial.clone())))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        // first to last slot center of the ten minute bucket
        assert_eq!(seen[0].time_ranges, TimeRanges::of(TimeRange::new(500.0, 599_500.0)));
        assert_eq!(seen[0].sampling_period, SamplingPeriod::EverySecond);
        assert_eq!(seen[1].time_ranges, partial);
    }

    #[test]
    fn test_collected_ranges_cascade() {
        let mut storage = InMemoryHistoryStorage::new();
        let collector = DownSamplingDirtyRangesCollector::observing(&mut storage);
        store_minute(&mut storage, 0, 2.0);

        let executed = DownSamplingService::new(&mut storage)
            .recalculate_down_sampling_collected(&collector)
            .unwrap();

        // TenMinutes up to the coarsest tier
        assert_eq!(executed, 11);
        for range in HistoryBucketRange::ALL.iter().skip(3) {
            assert_eq!(storage.bucket_count(*range), 1, "{}", range);
        }
        assert!(collector.lock().unwrap().is_empty());

        let hour = storage.query(0.0, 1.0, SamplingPeriod::EveryTenSeconds).unwrap();
        assert_eq!(hour[0].chunk.get_decimal_value(0, 0), 2.0);
        assert_eq!(hour[0].chunk.get_decimal_value(0, 5), 2.0);
        assert!(hour[0].chunk.get_decimal_value(0, 6).is_nan());
    }

    #[test]
    fn test_if_required_waits_for_enough_dirty_span() {
        let mut storage = InMemoryHistoryStorage::new();
        let collector = Arc::new(Mutex::new(DownSamplingDirtyRangesCollector::new()));
        storage.observe(DownSamplingDirtyRangesCollector::observer(Arc::clone(&collector)));

        // 300ms are less than half of the 10s distance of the OneHour tier
        collector
            .lock()
            .unwrap()
            .mark_as_dirty(SamplingPeriod::EveryTenSeconds, TimeRange::new(0.0, 300.0));
        let executed = DownSamplingService::new(&mut storage)
            .calculate_down_sampling_if_required(&collector)
            .unwrap();
        assert_eq!(executed, 0);
        assert!(!collector.lock().unwrap().get(SamplingPeriod::EveryTenSeconds).is_empty());

        // one minute of data is enough up to the SixHours tier (1min distance)
        store_minute(&mut storage, 0, 2.0);
        let executed = DownSamplingService::new(&mut storage)
            .calculate_down_sampling_if_required(&collector)
            .unwrap();
        assert_eq!(executed, 3);
        assert_eq!(storage.bucket_count(HistoryBucketRange::OneHour), 1);
        assert_eq!(storage.bucket_count(HistoryBucketRange::SixHours), 1);
        assert_eq!(storage.bucket_count(HistoryBucketRange::OneDay), 0);
        assert_eq!(
            collector.lock().unwrap().get(SamplingPeriod::EveryTenMinutes).span(),
            60_000.0
        );
    }
}
