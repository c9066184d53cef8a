//! # Chronicle History
//!
//! Multi-resolution history storage for sampled time series. Raw samples are
//! kept in fixed-size buckets of the finest tier; coarser tiers are computed
//! from their children by down-sampling and old buckets are removed by a
//! retention policy.
//!
//! ## Features
//!
//! - **Bucketed storage**: 14 resolution tiers from 100ms to 720 years
//! - **Down-sampling**: average, min and max for decimals, union and most-time
//!   winner for enums, most-of-the-time winner for reference entries
//! - **Dirty tracking**: stores mark coarser tiers for recalculation
//! - **Retention**: keep the newest N buckets of every tier
//! - **Persistence**: one file per bucket, JSON or LZ4 compressed bincode
//!
//! ## Modules
//!
//! - [`chunk`]: value grids, configurations, chunks and buckets
//! - [`storage`]: bucket identity and the storage engines
//! - [`index`]: book-keeping of stored descriptors
//! - [`downsampling`]: calculation and scheduling of coarser tiers
//! - [`cleanup`]: retention policy and cleanup service
//! - [`maintenance`]: periodic down-sampling and cleanup on a tokio task
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chronicle_history::chunk::HistoryConfiguration;
//! use chronicle_history::downsampling::{DownSamplingDirtyRangesCollector, DownSamplingService};
//! use chronicle_history::generator::sinus_chunk;
//! use chronicle_history::storage::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut storage = InMemoryHistoryStorage::new();
//!     let collector = DownSamplingDirtyRangesCollector::observing(&mut storage);
//!
//!     // Ten minutes of raw samples
//!     let configuration = HistoryConfiguration::only_decimals(&[1], &["temperature"]);
//!     for index in 0..10 {
//!         let descriptor = HistoryBucketDescriptor::for_index(index, HistoryBucketRange::OneMinute);
//!         storage.store_chunk(sinus_chunk(&configuration, &descriptor), SamplingPeriod::EveryHundredMillis)?;
//!     }
//!
//!     // Roll them up into every coarser tier
//!     let jobs = DownSamplingService::new(&mut storage).calculate_down_sampling_if_required(&collector)?;
//!     println!("Executed {} down-sampling jobs", jobs);
//!
//!     let buckets = storage.query(0.0, 600_000.0, SamplingPeriod::EverySecond)?;
//!     println!("Found {} ten minute buckets", buckets.len());
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod cleanup;
pub mod config;
pub mod downsampling;
pub mod generator;
pub mod index;
pub mod maintenance;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    DeletionReport, FileHistoryStorage, HistoryBucketDescriptor, HistoryBucketRange, HistoryError, HistoryObserver,
    HistoryResult, HistoryStorage, HistoryUpdateInfo, InMemoryHistoryStorage, SamplingPeriod, TimeRange, TimeRanges,
    Timestamp, WritableHistoryStorage,
};

pub use chunk::{
    HistoryBucket, HistoryChunk, HistoryChunkBuilder, HistoryConfiguration, HistoryEnumSet, RecordingType,
    ReferenceEntryId,
};

pub use downsampling::{
    calculate_down_sampled, DownSamplingDirtyRangesCollector, DownSamplingJob, DownSamplingService, RefreshRange,
};

pub use cleanup::{HistoryCleanupService, MaxHistorySizeConfiguration};

pub use maintenance::{Clock, FixedClock, HistoryMaintenance, MaintenanceReport, SystemClock};

pub use config::{Config, ConfigError, LoggingConfig};
