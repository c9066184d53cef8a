//! File storage round trips

use chronicle_history::chunk::{DataSeriesId, HistoryChunkBuilder, HistoryConfiguration, HistoryEnum, HistoryUnit};
use chronicle_history::cleanup::{HistoryCleanupService, MaxHistorySizeConfiguration};
use chronicle_history::downsampling::{DownSamplingDirtyRangesCollector, DownSamplingService};
use chronicle_history::generator::{sinus_buckets, sinus_chunk};
use chronicle_history::storage::*;
use tempfile::tempdir;

fn configuration() -> HistoryConfiguration {
    HistoryConfiguration::builder()
        .decimal_data_series(DataSeriesId(1), "temperature", HistoryUnit::new("°C"))
        .enum_data_series(DataSeriesId(2), "heating", HistoryEnum::boolean("heating"))
        .reference_entry_data_series(DataSeriesId(3), "operator", None)
        .build()
}

fn minute(index: i64) -> HistoryBucketDescriptor {
    HistoryBucketDescriptor::for_index(index, HistoryBucketRange::OneMinute)
}

#[test]
fn test_round_trip_with_both_serializers() {
    for kind in [SerializerKind::Json, SerializerKind::Compressed] {
        let dir = tempdir().unwrap();
        let mut storage = FileHistoryStorage::open(dir.path(), kind.create()).unwrap();

        let buckets = sinus_buckets(&configuration(), minute(27_000_000), 3);
        for bucket in &buckets {
            storage
                .store_without_cache(bucket.clone(), HistoryUpdateInfo::from_descriptor(&bucket.descriptor))
                .unwrap();
        }

        let loaded = storage
            .query(buckets[0].start(), buckets[2].end(), SamplingPeriod::EveryHundredMillis)
            .unwrap();
        assert_eq!(loaded, buckets, "{} round trip", kind);
    }
}

#[test]
fn test_reopen_keeps_buckets() {
    let dir = tempdir().unwrap();
    let bucket = sinus_buckets(&configuration(), minute(5), 1).remove(0);
    {
        let mut storage = FileHistoryStorage::open(dir.path(), SerializerKind::Compressed.create()).unwrap();
        storage
            .store_without_cache(bucket.clone(), HistoryUpdateInfo::from_descriptor(&bucket.descriptor))
            .unwrap();
    }

    let storage = FileHistoryStorage::open(dir.path(), SerializerKind::Compressed.create()).unwrap();
    assert_eq!(storage.bucket_count(HistoryBucketRange::OneMinute), 1);
    assert_eq!(storage.get_start(), 300_000.0);
    assert_eq!(storage.get_end(), 360_000.0);
    assert_eq!(storage.get(&minute(5)).unwrap(), Some(bucket));
}

#[test]
fn test_store_merges_measured_chunks() {
    let dir = tempdir().unwrap();
    let mut storage = FileHistoryStorage::open(dir.path(), SerializerKind::Json.create()).unwrap();
    let configuration = HistoryConfiguration::only_decimals(&[1], &["v"]);

    let mut first = HistoryChunkBuilder::new(configuration.clone());
    first.add_decimal_values(60_000.0, &[1.0]);
    first.add_decimal_values(60_200.0, &[3.0]);
    storage.store_chunk(first.build(), SamplingPeriod::EveryHundredMillis).unwrap();

    let mut second = HistoryChunkBuilder::new(configuration);
    second.add_decimal_values(60_100.0, &[2.0]);
    storage.store_chunk(second.build(), SamplingPeriod::EveryHundredMillis).unwrap();

    let bucket = storage.get(&minute(1)).unwrap().unwrap();
    assert_eq!(bucket.chunk.timestamps(), &[60_000.0, 60_100.0, 60_200.0]);
    assert_eq!(bucket.chunk.get_decimal_value(0, 1), 2.0);
}

#[test]
fn test_down_sampling_and_cleanup_on_files() {
    let dir = tempdir().unwrap();
    let mut storage = FileHistoryStorage::open(dir.path(), SerializerKind::Compressed.create())
        .unwrap()
        .with_max_size_configuration(MaxHistorySizeConfiguration::new(3));
    let collector = DownSamplingDirtyRangesCollector::observing(&mut storage);

    let configuration = configuration();
    for index in 0..5 {
        storage
            .store_chunk(sinus_chunk(&configuration, &minute(index)), SamplingPeriod::EveryHundredMillis)
            .unwrap();
    }

    let executed = DownSamplingService::new(&mut storage)
        .calculate_down_sampling_if_required(&collector)
        .unwrap();
    assert!(executed >= 1);
    assert_eq!(storage.bucket_count(HistoryBucketRange::TenMinutes), 1);

    let ten_minutes = storage
        .get(&HistoryBucketDescriptor::for_index(0, HistoryBucketRange::TenMinutes))
        .unwrap()
        .unwrap();
    let expected: f64 = (0..10).map(|i| (i as f64 / 10.0).sin() * 100.0).sum::<f64>() / 10.0;
    assert!((ten_minutes.chunk.get_decimal_value(0, 0) - expected).abs() < 1e-9);
    assert!(ten_minutes.chunk.get_decimal_value(0, 300).is_nan());

    let retention = storage.max_size_configuration();
    let report = HistoryCleanupService::new().cleanup_all(&mut storage, retention).unwrap();
    assert_eq!(report.count(), 2);
    assert_eq!(storage.bucket_count(HistoryBucketRange::OneMinute), 3);
    assert_eq!(storage.get_start(), 120_000.0);
    assert!(storage.get(&minute(0)).unwrap().is_none());
}
