//! Chronicle History demo
//!
//! Ingests ten buckets of generated samples into an in-memory history, lets
//! the maintenance task down-sample and clean up, then prints what every tier
//! holds.

use chronicle_history::chunk::{DataSeriesId, HistoryConfiguration, HistoryEnum, HistoryUnit};
use chronicle_history::config::Config;
use chronicle_history::generator::sinus_buckets;
use chronicle_history::maintenance::{HistoryMaintenance, SystemClock};
use chronicle_history::storage::*;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_BUCKETS: i64 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load_default();
    init_logging(&config);

    tracing::info!("Chronicle History v{}", env!("CARGO_PKG_VERSION"));

    let natural_period = config.storage.natural_sampling_period;
    let storage = InMemoryHistoryStorage::new()
        .with_natural_sampling_period(natural_period)
        .with_max_size_configuration(config.max_size_configuration());
    tracing::info!(
        "Natural sampling period {}, keeping {}",
        natural_period,
        config.max_size_configuration()
    );

    let maintenance = Arc::new(
        HistoryMaintenance::new(storage, Arc::new(SystemClock))
            .with_cleanup_interval(config.downsampling.cleanup_interval()),
    );

    demo_ingest(&maintenance, natural_period).await?;

    let handle = maintenance.spawn(config.downsampling.interval());

    // Give the maintenance task a few ticks
    tokio::time::sleep(config.downsampling.interval() * 3).await;

    demo_query(&maintenance).await?;

    tracing::info!("Shutting down...");
    maintenance.shutdown().await;
    handle.await?;

    tracing::info!("Chronicle History shutdown complete");
    Ok(())
}

fn init_logging(config: &Config) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter());
    let registry = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new(filter));

    if config.logging.is_json() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

fn demo_configuration() -> HistoryConfiguration {
    HistoryConfiguration::builder()
        .decimal_data_series(DataSeriesId(1), "temperature", HistoryUnit::new("°C"))
        .decimal_data_series(DataSeriesId(2), "pressure", HistoryUnit::new("hPa"))
        .enum_data_series(DataSeriesId(3), "heating", HistoryEnum::boolean("heating"))
        .reference_entry_data_series(DataSeriesId(4), "operator", None)
        .build()
}

async fn demo_ingest(
    maintenance: &HistoryMaintenance<InMemoryHistoryStorage>,
    natural_period: SamplingPeriod,
) -> HistoryResult<()> {
    let now = chrono::Utc::now().timestamp_millis() as f64;
    let first = HistoryBucketDescriptor::for_timestamp(now, natural_period).previous_n(DEMO_BUCKETS - 1);

    let storage = maintenance.storage();
    let mut storage = storage.lock().await;
    for bucket in sinus_buckets(&demo_configuration(), first, DEMO_BUCKETS as usize) {
        storage.store_chunk(bucket.chunk, natural_period)?;
    }

    tracing::info!(
        "Ingested {} buckets from {} to {}",
        DEMO_BUCKETS,
        format_utc(storage.get_start()),
        format_utc(storage.get_end())
    );
    Ok(())
}

async fn demo_query(maintenance: &HistoryMaintenance<InMemoryHistoryStorage>) -> HistoryResult<()> {
    let storage = maintenance.storage();
    let storage = storage.lock().await;

    for range in HistoryBucketRange::ALL {
        let count = storage.bucket_count(range);
        if count == 0 {
            continue;
        }

        let descriptors: Vec<_> = storage.book_keeping().descriptors(range).collect();
        let buckets = storage.get_all(&descriptors)?;
        let extremes = buckets
            .iter()
            .filter_map(|bucket| bucket.chunk.find_min_max_value(0))
            .fold(None, |acc: Option<(f64, f64)>, (min, max)| match acc {
                Some((lo, hi)) => Some((lo.min(min), hi.max(max))),
                None => Some((min, max)),
            });

        match extremes {
            Some((min, max)) => {
                tracing::info!("{:<12} {:>4} buckets, temperature {:.2} .. {:.2}", range, count, min, max)
            }
            None => tracing::info!("{:<12} {:>4} buckets, no values", range, count),
        }
    }
    Ok(())
}
