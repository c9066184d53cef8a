//! Periodic down-sampling and cleanup
//!
//! ```text
//! writer ──store──→ Arc<tokio::Mutex<S>> ──observer──→ dirty ranges
//!                          ↑
//!  HistoryMaintenance::spawn(interval)
//!    every tick:  lock storage
//!                 → calculate_down_sampling_if_required
//!                 → cleanup_all (if the cleanup interval has elapsed)
//! ```
//!
//! Both passes run under the same storage lock, so a cleanup never
//! interleaves with a recalculation reading the same tier.

use crate::cleanup::HistoryCleanupService;
use crate::downsampling::{DownSamplingDirtyRangesCollector, DownSamplingService};
use crate::storage::error::HistoryResult;
use crate::storage::{format_utc, DeletionReport, Timestamp, WritableHistoryStorage};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::interval;

/// Default time between two cleanup passes
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;

/// Source of the current time in ms since epoch
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Wall clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp_millis() as f64
    }
}

/// A clock that only moves when told to
#[derive(Debug, Default)]
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: Timestamp) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, millis: f64) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += millis;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Outcome of one maintenance pass
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    /// Number of executed down-sampling jobs
    pub down_sampling_jobs: usize,
    /// `None` if the cleanup was not due
    pub cleanup: Option<DeletionReport>,
}

/// Owns a storage and keeps its tiers down-sampled and within the retention limits
pub struct HistoryMaintenance<S: WritableHistoryStorage> {
    storage: Arc<tokio::sync::Mutex<S>>,
    collector: Arc<Mutex<DownSamplingDirtyRangesCollector>>,
    clock: Arc<dyn Clock>,
    cleanup_interval_ms: u64,
    last_cleanup: Mutex<Option<Timestamp>>,
    shutdown: RwLock<bool>,
}

impl<S> HistoryMaintenance<S>
where
    S: WritableHistoryStorage + Send + 'static,
{
    /// Registers the dirty ranges collector on `storage` and takes ownership of it
    pub fn new(mut storage: S, clock: Arc<dyn Clock>) -> Self {
        let collector = DownSamplingDirtyRangesCollector::observing(&mut storage);
        Self {
            storage: Arc::new(tokio::sync::Mutex::new(storage)),
            collector,
            clock,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
            last_cleanup: Mutex::new(None),
            shutdown: RwLock::new(false),
        }
    }

    /// Sets the minimum time between two cleanup passes (builder pattern)
    pub fn with_cleanup_interval(mut self, cleanup_interval: Duration) -> Self {
        self.cleanup_interval_ms = cleanup_interval.as_millis() as u64;
        self
    }

    pub fn storage(&self) -> Arc<tokio::sync::Mutex<S>> {
        Arc::clone(&self.storage)
    }

    pub fn collector(&self) -> Arc<Mutex<DownSamplingDirtyRangesCollector>> {
        Arc::clone(&self.collector)
    }

    fn cleanup_due(&self, now: Timestamp) -> bool {
        let mut last = self
            .last_cleanup
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *last {
            Some(previous) if now - previous < self.cleanup_interval_ms as f64 => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    /// Runs one down-sampling pass and, if due, one cleanup pass
    pub async fn run_once(&self) -> HistoryResult<MaintenanceReport> {
        let mut storage = self.storage.lock().await;

        let down_sampling_jobs =
            DownSamplingService::new(&mut *storage).calculate_down_sampling_if_required(&self.collector)?;

        let now = self.clock.now();
        let cleanup = if self.cleanup_due(now) {
            let configuration = storage.max_size_configuration();
            Some(HistoryCleanupService::new().cleanup_all(&mut *storage, configuration)?)
        } else {
            None
        };

        if down_sampling_jobs > 0 || cleanup.as_ref().is_some_and(|report| !report.is_empty()) {
            tracing::info!(
                "maintenance at {}: {} down-sampling jobs, cleanup: {}",
                format_utc(now),
                down_sampling_jobs,
                cleanup
                    .as_ref()
                    .map(|report| report.to_string())
                    .unwrap_or_else(|| "skipped".to_string())
            );
        }

        Ok(MaintenanceReport {
            down_sampling_jobs,
            cleanup,
        })
    }

    /// Runs `run_once` every `period` until `shutdown` is called
    pub fn spawn(self: &Arc<Self>, period: Duration) -> tokio::task::JoinHandle<()> {
        let maintenance = Arc::clone(self);

        tokio::spawn(async move {
            let mut ticker = interval(period);

            loop {
                ticker.tick().await;

                if *maintenance.shutdown.read().await {
                    break;
                }

                if let Err(e) = maintenance.run_once().await {
                    tracing::warn!("Maintenance pass failed: {}", e);
                }
            }

            tracing::debug!("maintenance stopped");
        })
    }

    /// Stops the spawned task after its current pass
    pub async fn shutdown(&self) {
        *self.shutdown.write().await = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::HistoryConfiguration;
    use crate::cleanup::MaxHistorySizeConfiguration;
    use crate::generator::sinus_chunk;
    use crate::storage::{
        HistoryBucketDescriptor, HistoryBucketRange, HistoryStorage, InMemoryHistoryStorage, SamplingPeriod,
    };

    fn storage() -> InMemoryHistoryStorage {
        InMemoryHistoryStorage::new().with_max_size_configuration(MaxHistorySizeConfiguration::new(2))
    }

    async fn store_minutes(maintenance: &HistoryMaintenance<InMemoryHistoryStorage>, indices: std::ops::Range<i64>) {
        let configuration = HistoryConfiguration::only_decimals(&[1], &["v"]);
        let storage = maintenance.storage();
        let mut storage = storage.lock().await;
        for index in indices {
            let descriptor = HistoryBucketDescriptor::for_index(index, HistoryBucketRange::OneMinute);
            storage
                .store_chunk(sinus_chunk(&configuration, &descriptor), SamplingPeriod::EveryHundredMillis)
                .unwrap();
        }
    }

    #[test]
    fn test_fixed_clock() {
        let clock = FixedClock::new(1_000.0);
        clock.advance(500.0);
        assert_eq!(clock.now(), 1_500.0);
        clock.set(10.0);
        assert_eq!(clock.now(), 10.0);
        assert!(SystemClock.now() > 1_600_000_000_000.0);
    }

    #[tokio::test]
    async fn test_run_once_down_samples_and_cleans_up() {
        let clock = Arc::new(FixedClock::new(0.0));
        let maintenance = HistoryMaintenance::new(storage(), clock.clone());
        store_minutes(&maintenance, 0..5).await;

        let report = maintenance.run_once().await.unwrap();
        assert!(report.down_sampling_jobs >= 3);
        assert_eq!(report.cleanup.map(|r| r.count()), Some(3));

        let storage = maintenance.storage();
        let storage = storage.lock().await;
        assert_eq!(storage.bucket_count(HistoryBucketRange::OneMinute), 2);
        assert_eq!(storage.bucket_count(HistoryBucketRange::TenMinutes), 1);
        assert_eq!(storage.bucket_count(HistoryBucketRange::SixHours), 1);
    }

    #[tokio::test]
    async fn test_cleanup_waits_for_interval() {
        let clock = Arc::new(FixedClock::new(0.0));
        let maintenance =
            HistoryMaintenance::new(storage(), clock.clone()).with_cleanup_interval(Duration::from_secs(60));

        assert!(maintenance.run_once().await.unwrap().cleanup.is_some());

        store_minutes(&maintenance, 0..3).await;
        clock.advance(30_000.0);
        let report = maintenance.run_once().await.unwrap();
        assert!(report.cleanup.is_none());

        clock.advance(30_000.0);
        let report = maintenance.run_once().await.unwrap();
        assert_eq!(report.cleanup.map(|r| r.count()), Some(1));
    }

    #[tokio::test]
    async fn test_spawn_and_shutdown() {
        let maintenance = Arc::new(HistoryMaintenance::new(storage(), Arc::new(SystemClock)));
        store_minutes(&maintenance, 0..1).await;

        let handle = maintenance.spawn(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(50)).await;
        maintenance.shutdown().await;
        handle.await.unwrap();

        assert!(maintenance.collector().lock().unwrap().get(SamplingPeriod::EverySecond).is_empty());
        let storage = maintenance.storage();
        assert_eq!(storage.lock().await.bucket_count(HistoryBucketRange::TenMinutes), 1);
    }
}
