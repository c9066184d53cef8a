//! Chronicle History CLI
//!
//! Command-line interface for Chronicle History operations:
//! - Inspect resolution tiers and bucket descriptors
//! - Plan down-sampling jobs and retention
//! - Simulate ingest, down-sampling and cleanup
//! - Export a stored tier as CSV

use anyhow::{anyhow, bail, Context};
use chrono::{DateTime, Utc};
use chronicle_history::chunk::{HistoryBucket, HistoryConfiguration};
use chronicle_history::cleanup::MaxHistorySizeConfiguration;
use chronicle_history::downsampling::create_jobs;
use chronicle_history::generator::sinus_chunk;
use chronicle_history::maintenance::{FixedClock, HistoryMaintenance};
use chronicle_history::storage::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "chronicle-history")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-resolution history storage with down-sampling and retention")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Print the resolution tiers
    Ranges,

    /// Print the bucket containing a timestamp
    Descriptor {
        /// Timestamp. Supports: "now", "now-<n>[mhdw]", RFC 3339, epoch milliseconds
        timestamp: String,
        /// Bucket range (e.g. OneMinute, TenMinutes)
        #[arg(short, long, default_value = "OneMinute", value_parser = parse_range)]
        range: HistoryBucketRange,
    },

    /// Print the down-sampling jobs for a time range
    Plan {
        /// Start of the dirty range
        start: String,
        /// End of the dirty range
        end: String,
        /// Tier to recalculate
        #[arg(short, long, default_value = "TenMinutes", value_parser = parse_range)]
        range: HistoryBucketRange,
    },

    /// Print how many buckets a retention policy keeps
    Retention {
        /// Duration to keep in milliseconds
        #[arg(short, long, conflicts_with = "entries")]
        duration: Option<f64>,
        /// Number of samples to keep
        #[arg(short, long)]
        entries: Option<usize>,
        /// Tier the policy applies to
        #[arg(short, long, default_value = "OneMinute", value_parser = parse_range)]
        range: HistoryBucketRange,
    },

    /// Ingest generated minutes, down-sample and clean up in memory
    Simulate {
        /// Number of one minute buckets to ingest
        #[arg(short, long, default_value = "30")]
        minutes: usize,
        /// Buckets kept per tier
        #[arg(short, long, default_value = "10")]
        keep: usize,
    },

    /// Export a tier of a file storage as CSV
    Export {
        /// Storage directory
        dir: PathBuf,
        /// Tier to export
        #[arg(short, long, default_value = "OneMinute", value_parser = parse_range)]
        range: HistoryBucketRange,
        /// Start (default: oldest bucket)
        #[arg(long)]
        from: Option<String>,
        /// End (default: now)
        #[arg(long)]
        to: Option<String>,
        /// Bucket encoding (json, compressed)
        #[arg(long, default_value = "compressed")]
        serializer: String,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print or write the default configuration
    InitConfig {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Ranges => {
            println!(
                "{:<24} {:<20} {:>7} {:>14} {:>7}",
                "Range", "Sampling", "Entries", "Duration", "Factor"
            );
            println!("{}", "-".repeat(76));
            for range in HistoryBucketRange::ALL {
                println!(
                    "{:<24} {:<20} {:>7} {:>14} {:>7}",
                    format!("{:?}", range),
                    format!("{:?}", range.sampling_period()),
                    range.entries_count(),
                    format_duration(range.duration_millis()),
                    range
                        .down_sampling_factor()
                        .map(|factor| factor.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }

        Commands::Descriptor { timestamp, range } => {
            let timestamp = parse_timestamp(&timestamp)?;
            let descriptor = HistoryBucketDescriptor::for_timestamp(timestamp, range);
            println!("Descriptor: {}", descriptor);
            println!("  Index: {}", descriptor.index);
            println!("  Start: {}", format_utc(descriptor.start()));
            println!("  End:   {}", format_utc(descriptor.end()));
            if let Some(parent) = descriptor.parent() {
                println!("  Parent: {}", parent);
            }
        }

        Commands::Plan { start, end, range } => {
            let start = parse_timestamp(&start)?;
            let end = parse_timestamp(&end)?;
            let time_range =
                TimeRange::try_new(start, end).ok_or_else(|| anyhow!("start must not be after end"))?;
            if range.is_finest() {
                bail!("{} has no finer tier to down-sample from", range);
            }

            let jobs = create_jobs(&TimeRanges::of(time_range), range);
            println!("{} jobs for {} in {}:", jobs.len(), time_range, range);
            for job in &jobs {
                println!("  {}", job);
            }
        }

        Commands::Retention {
            duration,
            entries,
            range,
        } => {
            let configuration = match (duration, entries) {
                (Some(duration), _) => MaxHistorySizeConfiguration::for_duration(duration, range),
                (None, Some(entries)) => MaxHistorySizeConfiguration::for_max_entries(entries, range),
                (None, None) => bail!("either --duration or --entries is required"),
            };

            println!("Retention for {}:", range);
            println!("  Kept buckets:        {}", configuration.kept_buckets_count);
            println!("  Max entries:         {}", configuration.max_entries(range));
            println!(
                "  Guaranteed duration: {}",
                format_duration(configuration.guaranteed_duration(range) as i64)
            );
            println!(
                "  Guaranteed samples:  {}",
                configuration.guaranteed_timestamps_count(range, range.distance())
            );
        }

        Commands::Simulate { minutes, keep } => {
            if keep == 0 {
                bail!("--keep must be at least 1");
            }
            simulate(minutes, keep).await?;
        }

        Commands::Export {
            dir,
            range,
            from,
            to,
            serializer,
            output,
        } => {
            let serializer = match serializer.to_lowercase().as_str() {
                "json" => SerializerKind::Json,
                "compressed" => SerializerKind::Compressed,
                other => bail!("Unknown serializer: {}. Use: json, compressed", other),
            };
            let storage = FileHistoryStorage::open(&dir, serializer.create())
                .with_context(|| format!("opening {:?}", dir))?;

            let start = match from {
                Some(from) => parse_timestamp(&from)?,
                None => storage
                    .book_keeping()
                    .earliest_bound(range)
                    .map(|descriptor| descriptor.start())
                    .unwrap_or(0.0),
            };
            let end = match to {
                Some(to) => parse_timestamp(&to)?,
                None => Utc::now().timestamp_millis() as f64,
            };

            let buckets = storage.query(start, end, range.sampling_period())?;
            let rows = match output {
                Some(path) => {
                    let file = std::fs::File::create(&path)?;
                    let rows = write_csv(file, &buckets, start, end)?;
                    println!("Exported {} rows to {:?}", rows, path);
                    rows
                }
                None => write_csv(std::io::stdout(), &buckets, start, end)?,
            };
            if rows == 0 {
                eprintln!("No data for the selected time range");
            }
        }

        Commands::InitConfig { output } => {
            let config = chronicle_history::config::generate_default_config();

            match output {
                Some(path) => {
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

async fn simulate(minutes: usize, keep: usize) -> anyhow::Result<()> {
    let now = Utc::now().timestamp_millis() as f64;
    let first = HistoryBucketDescriptor::for_timestamp(now, HistoryBucketRange::OneMinute)
        .previous_n(minutes as i64);
    let clock = Arc::new(FixedClock::new(first.start()));

    let storage = InMemoryHistoryStorage::new().with_max_size_configuration(MaxHistorySizeConfiguration::new(keep));
    let maintenance = HistoryMaintenance::new(storage, clock.clone());
    let configuration = HistoryConfiguration::only_decimals(&[1, 2], &["sin", "sin+1"]);

    let mut jobs = 0;
    let mut deleted = 0;
    let mut descriptor = first;
    for _ in 0..minutes {
        {
            let storage = maintenance.storage();
            let mut storage = storage.lock().await;
            storage.store_chunk(sinus_chunk(&configuration, &descriptor), SamplingPeriod::EveryHundredMillis)?;
        }
        clock.advance(HistoryBucketRange::OneMinute.duration());

        let report = maintenance.run_once().await?;
        jobs += report.down_sampling_jobs;
        deleted += report.cleanup.map(|report| report.count()).unwrap_or(0);
        descriptor = descriptor.next();
    }

    println!("Simulated {} minutes keeping {} buckets per tier", minutes, keep);
    println!("  Down-sampling jobs: {}", jobs);
    println!("  Deleted buckets:    {}", deleted);
    println!();
    println!("{:<24} {:>8} {:<26} {:<26}", "Range", "Buckets", "Earliest", "Latest");

    let storage = maintenance.storage();
    let storage = storage.lock().await;
    for range in HistoryBucketRange::ALL {
        let count = storage.bucket_count(range);
        if count == 0 {
            continue;
        }
        let bounds = storage.book_keeping().time_range(range);
        println!(
            "{:<24} {:>8} {:<26} {:<26}",
            format!("{:?}", range),
            count,
            bounds.map(|r| format_utc(r.start)).unwrap_or_default(),
            bounds.map(|r| format_utc(r.end)).unwrap_or_default()
        );
    }
    Ok(())
}

/// Writes one row per timestamp within [start, end]. Returns the number of rows.
fn write_csv<W: std::io::Write>(
    writer: W,
    buckets: &[HistoryBucket],
    start: Timestamp,
    end: Timestamp,
) -> anyhow::Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    let Some(first) = buckets.first() else {
        return Ok(0);
    };

    let configuration = first.chunk.configuration();
    let mut header = vec!["timestamp".to_string()];
    header.extend(configuration.decimal_data_series().iter().map(|s| s.display_name.clone()));
    header.extend(configuration.enum_data_series().iter().map(|s| s.display_name.clone()));
    header.extend(configuration.reference_entry_data_series().iter().map(|s| s.display_name.clone()));
    writer.write_record(&header)?;

    let mut rows = 0;
    for bucket in buckets {
        let chunk = &bucket.chunk;
        if chunk.configuration() != configuration {
            eprintln!("Skipping {}: different data series", bucket.descriptor);
            continue;
        }

        for index in 0..chunk.timestamps_count() {
            let timestamp = chunk.timestamp(index);
            if timestamp < start || timestamp > end || chunk.is_pending(index) {
                continue;
            }

            let mut record = vec![format_utc(timestamp)];
            for series in 0..configuration.decimal_data_series_count() {
                let value = chunk.get_decimal_value(series, index);
                record.push(if value.is_nan() { String::new() } else { format!("{:.4}", value) });
            }
            for series in 0..configuration.enum_data_series_count() {
                let ordinal = chunk.get_enum_ordinal_most_time(series, index);
                record.push(if ordinal.value() < 0 { String::new() } else { ordinal.value().to_string() });
            }
            for series in 0..configuration.reference_entry_data_series_count() {
                let id = chunk.get_reference_entry_id(series, index);
                record.push(if id.0 < 0 { String::new() } else { id.0.to_string() });
            }
            writer.write_record(&record)?;
            rows += 1;
        }
    }

    writer.flush()?;
    Ok(rows)
}

/// Parses a range by its name, ignoring case
fn parse_range(s: &str) -> Result<HistoryBucketRange, String> {
    HistoryBucketRange::ALL
        .into_iter()
        .find(|range| format!("{:?}", range).eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("Unknown range: {}. Run `ranges` for the list", s))
}

/// Parses "now", "now-<n>[mhdw]", RFC 3339 or epoch milliseconds
fn parse_timestamp(s: &str) -> anyhow::Result<Timestamp> {
    let now = Utc::now().timestamp_millis();
    if s == "now" {
        return Ok(now as f64);
    }

    let re = regex::Regex::new(r"^now-(\d+)([mhdw])$")?;
    if let Some(caps) = re.captures(s) {
        let amount: i64 = caps[1].parse().context("Invalid number in time expression")?;
        let ms = match &caps[2] {
            "m" => amount * 60 * 1000,
            "h" => amount * 3600 * 1000,
            "d" => amount * 24 * 3600 * 1000,
            "w" => amount * 7 * 24 * 3600 * 1000,
            unit => bail!("Invalid time unit: {}", unit),
        };
        return Ok((now - ms) as f64);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis() as f64);
    }

    s.parse::<f64>()
        .map_err(|_| anyhow!("Cannot parse timestamp: {}. Use: now, now-2h, RFC 3339 or epoch ms", s))
}

fn format_duration(millis: i64) -> String {
    let seconds = millis / 1000;
    if millis < 1000 {
        format!("{}ms", millis)
    } else if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}
