//! File storage engine
//!
//! Stores one file per bucket in a date based directory tree:
//!
//! ```text
//! <base>/
//!   bookkeeping.json
//!   OneMinute/2021/03/27/21/2021-03-27T21-45-00.000Z.bin
//!   TenMinutes/2021/03/27/2021-03-27T21-40-00.000Z.bin
//!   OneYear/<start>.bin
//! ```
//!
//! The finer the tier, the deeper the tree, so no directory holds more
//! than a few hundred files. Files are written to a temporary file first and
//! then renamed, so readers never see a partial bucket.
//!
//! The book-keeping is saved after every store or delete. If it is missing
//! on open, it is rebuilt by reading every bucket file.

use crate::chunk::HistoryBucket;
use crate::cleanup::MaxHistorySizeConfiguration;
use crate::index::InMemoryBookKeeping;
use crate::storage::descriptor::HistoryBucketDescriptor;
use crate::storage::error::{HistoryError, HistoryResult};
use crate::storage::sampling::{HistoryBucketRange, SamplingPeriod};
use crate::storage::serializer::BucketSerializer;
use crate::storage::types::HistoryUpdateInfo;
use crate::storage::{HistoryObserver, HistoryStorage, WritableHistoryStorage};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use std::fs;
use std::path::{Path, PathBuf};

const BOOK_KEEPING_FILE: &str = "bookkeeping.json";
const TEMP_EXTENSION: &str = "tmp";
const DEFAULT_KEPT_BUCKETS: usize = 100;

/// Stores buckets as files below a base directory
pub struct FileHistoryStorage {
    base_dir: PathBuf,
    serializer: Box<dyn BucketSerializer>,
    book_keeping: InMemoryBookKeeping,
    observers: Vec<HistoryObserver>,
    natural_sampling_period: SamplingPeriod,
    max_size_configuration: MaxHistorySizeConfiguration,
}

impl FileHistoryStorage {
    /// Opens (or creates) the storage at `base_dir`
    pub fn open(base_dir: impl AsRef<Path>, serializer: Box<dyn BucketSerializer>) -> HistoryResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let book_keeping_path = base_dir.join(BOOK_KEEPING_FILE);
        let rebuild = !book_keeping_path.exists();
        let book_keeping = InMemoryBookKeeping::load(&book_keeping_path)?;

        let mut storage = Self {
            base_dir,
            serializer,
            book_keeping,
            observers: Vec::new(),
            natural_sampling_period: SamplingPeriod::EveryHundredMillis,
            max_size_configuration: MaxHistorySizeConfiguration::new(DEFAULT_KEPT_BUCKETS),
        };
        if rebuild {
            storage.rebuild_book_keeping()?;
        }

        tracing::info!(
            "Opened file history at {:?} with {} buckets",
            storage.base_dir,
            storage.book_keeping.total_count()
        );
        Ok(storage)
    }

    /// Sets the sampling period raw samples arrive with (builder pattern)
    pub fn with_natural_sampling_period(mut self, sampling_period: SamplingPeriod) -> Self {
        self.natural_sampling_period = sampling_period;
        self
    }

    /// Sets the retention policy (builder pattern)
    pub fn with_max_size_configuration(mut self, configuration: MaxHistorySizeConfiguration) -> Self {
        self.max_size_configuration = configuration;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// The file the bucket of `descriptor` is stored in
    pub fn path_for(&self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<PathBuf> {
        let start = bucket_start(descriptor)?;
        let mut path = self.base_dir.join(format!("{:?}", descriptor.range));

        let components = [
            format!("{:04}", start.year()),
            format!("{:02}", start.month()),
            format!("{:02}", start.day()),
            format!("{:02}", start.hour()),
            format!("{:02}", start.minute()),
            format!("{:02}", start.second()),
        ];
        for component in components.iter().take(directory_depth(descriptor.range)) {
            path.push(component);
        }

        path.push(format!(
            "{}.{}",
            start.format("%Y-%m-%dT%H-%M-%S%.3fZ"),
            self.serializer.extension()
        ));
        Ok(path)
    }

    /// Saves the book-keeping if it has changed
    pub fn flush(&mut self) -> HistoryResult<()> {
        let path = self.base_dir.join(BOOK_KEEPING_FILE);
        self.book_keeping.save(&path)
    }

    /// Reads every bucket file and records its descriptor
    pub fn rebuild_book_keeping(&mut self) -> HistoryResult<()> {
        self.book_keeping.clear();
        let mut files = Vec::new();
        collect_files(&self.base_dir, self.serializer.extension(), &mut files)?;

        for file in files {
            let bytes = fs::read(&file)?;
            match self.serializer.deserialize(&bytes) {
                Ok(bucket) => self.book_keeping.store(bucket.descriptor),
                Err(e) => tracing::warn!("Skipping unreadable bucket file {:?}: {}", file, e),
            }
        }
        tracing::debug!("Rebuilt book-keeping: {} buckets", self.book_keeping.total_count());
        self.flush()
    }

    fn notify(&mut self, descriptor: &HistoryBucketDescriptor, update_info: &HistoryUpdateInfo) {
        for observer in &mut self.observers {
            observer(descriptor, update_info);
        }
    }
}

impl HistoryStorage for FileHistoryStorage {
    fn natural_sampling_period(&self) -> SamplingPeriod {
        self.natural_sampling_period
    }

    fn max_size_configuration(&self) -> MaxHistorySizeConfiguration {
        self.max_size_configuration
    }

    fn book_keeping(&self) -> &InMemoryBookKeeping {
        &self.book_keeping
    }

    fn get(&self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<Option<HistoryBucket>> {
        let path = self.path_for(descriptor)?;
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let bucket = self.serializer.deserialize(&bytes)?;
        if bucket.descriptor != *descriptor {
            return Err(HistoryError::Corruption(format!(
                "{:?} contains {} instead of {}",
                path, bucket.descriptor, descriptor
            )));
        }
        Ok(Some(bucket))
    }
}

impl WritableHistoryStorage for FileHistoryStorage {
    fn store_without_cache(&mut self, bucket: HistoryBucket, update_info: HistoryUpdateInfo) -> HistoryResult<()> {
        let descriptor = bucket.descriptor;
        let path = self.path_for(&descriptor)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let bytes = self.serializer.serialize(&bucket)?;
        let temp_path = path.with_extension(TEMP_EXTENSION);
        fs::write(&temp_path, &bytes)?;
        fs::rename(&temp_path, &path)?;
        tracing::debug!("store {} ({} bytes) to {:?}", descriptor, bytes.len(), path);

        self.book_keeping.store(descriptor);
        self.flush()?;
        self.notify(&descriptor, &update_info);
        Ok(())
    }

    fn delete(&mut self, descriptor: &HistoryBucketDescriptor) -> HistoryResult<bool> {
        let path = self.path_for(descriptor)?;
        let existed = path.exists();
        if existed {
            fs::remove_file(&path)?;
            tracing::debug!("delete {} ({:?})", descriptor, path);
        }

        let removed = self.book_keeping.remove(descriptor);
        self.flush()?;
        if existed || removed {
            self.notify(descriptor, &HistoryUpdateInfo::for_deletion(descriptor));
        }
        Ok(existed || removed)
    }

    fn observe(&mut self, observer: HistoryObserver) {
        self.observers.push(observer);
    }
}

fn bucket_start(descriptor: &HistoryBucketDescriptor) -> HistoryResult<DateTime<Utc>> {
    let millis = descriptor.start() as i64;
    Utc.timestamp_millis_opt(millis).single().ok_or_else(|| {
        HistoryError::InvalidDescriptor(format!("{:?} starts outside the supported date range", descriptor))
    })
}

/// Number of date components (year, month, ...) used as directories
fn directory_depth(range: HistoryBucketRange) -> usize {
    match range {
        HistoryBucketRange::HundredMillis => 6,
        HistoryBucketRange::FiveSeconds => 5,
        HistoryBucketRange::OneMinute | HistoryBucketRange::TenMinutes => 4,
        HistoryBucketRange::OneHour | HistoryBucketRange::SixHours => 3,
        HistoryBucketRange::OneDay => 2,
        HistoryBucketRange::ThirtyDays | HistoryBucketRange::OneQuarter => 1,
        HistoryBucketRange::OneYear
        | HistoryBucketRange::FiveYears
        | HistoryBucketRange::ThirtyYears
        | HistoryBucketRange::NinetyYears
        | HistoryBucketRange::SevenHundredTwentyYears => 0,
    }
}

fn collect_files(dir: &Path, extension: &str, files: &mut Vec<PathBuf>) -> HistoryResult<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, extension, files)?;
        } else if path.file_name().map(|n| n == BOOK_KEEPING_FILE).unwrap_or(false) {
            continue;
        } else if path.extension().map(|e| e == extension).unwrap_or(false) {
            files.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{HistoryChunkBuilder, HistoryConfiguration};
    use crate::storage::serializer::{CompressedBucketSerializer, JsonBucketSerializer};
    use crate::storage::types::parse_utc;
    use tempfile::tempdir;

    fn one_minute_bucket(start: f64) -> HistoryBucket {
        let mut builder = HistoryChunkBuilder::new(HistoryConfiguration::only_decimals(&[1], &["v"]));
        for i in 0..10 {
            builder.add_decimal_values(start + i as f64 * 100.0, &[i as f64]);
        }
        HistoryBucket::new(
            HistoryBucketDescriptor::for_timestamp(start, HistoryBucketRange::OneMinute),
            builder.build(),
        )
    }

    #[test]
    fn test_path_layout() {
        let dir = tempdir().unwrap();
        let storage = FileHistoryStorage::open(dir.path(), Box::new(CompressedBucketSerializer)).unwrap();
        let start = parse_utc("2021-03-27T21:45:00Z").unwrap();

        let minute = HistoryBucketDescriptor::for_timestamp(start, HistoryBucketRange::OneMinute);
        let expected = dir
            .path()
            .join("OneMinute/2021/03/27/21/2021-03-27T21-45-00.000Z.bin");
        assert_eq!(storage.path_for(&minute).unwrap(), expected);

        let year = HistoryBucketDescriptor::for_timestamp(start, HistoryBucketRange::OneYear);
        let path = storage.path_for(&year).unwrap();
        assert_eq!(path.parent().unwrap(), dir.path().join("OneYear"));
    }

    #[test]
    fn test_store_get_delete() {
        let dir = tempdir().unwrap();
        let mut storage = FileHistoryStorage::open(dir.path(), Box::new(JsonBucketSerializer)).unwrap();
        let bucket = one_minute_bucket(120_000.0);
        let descriptor = bucket.descriptor;

        assert!(storage.get(&descriptor).unwrap().is_none());
        storage
            .store_without_cache(bucket.clone(), HistoryUpdateInfo::from_descriptor(&descriptor))
            .unwrap();
        assert_eq!(storage.get(&descriptor).unwrap(), Some(bucket));
        assert_eq!(storage.bucket_count(HistoryBucketRange::OneMinute), 1);

        assert!(storage.delete(&descriptor).unwrap());
        assert!(storage.get(&descriptor).unwrap().is_none());
        assert!(!storage.delete(&descriptor).unwrap());
    }

    #[test]
    fn test_reopen_restores_book_keeping() {
        let dir = tempdir().unwrap();
        {
            let mut storage = FileHistoryStorage::open(dir.path(), Box::new(CompressedBucketSerializer)).unwrap();
            for minute in 0..3 {
                let bucket = one_minute_bucket(minute as f64 * 60_000.0);
                let info = HistoryUpdateInfo::from_descriptor(&bucket.descriptor);
                storage.store_without_cache(bucket, info).unwrap();
            }
        }

        let reopened = FileHistoryStorage::open(dir.path(), Box::new(CompressedBucketSerializer)).unwrap();
        assert_eq!(reopened.bucket_count(HistoryBucketRange::OneMinute), 3);

        // without the book-keeping file the tree is scanned
        fs::remove_file(dir.path().join(BOOK_KEEPING_FILE)).unwrap();
        let rebuilt = FileHistoryStorage::open(dir.path(), Box::new(CompressedBucketSerializer)).unwrap();
        assert_eq!(rebuilt.bucket_count(HistoryBucketRange::OneMinute), 3);
        assert_eq!(rebuilt.get_start(), 0.0);
        assert_eq!(rebuilt.get_end(), 180_000.0);
    }
}
