//! Builds a down-sampled bucket from the buckets of the next finer tier
//!
//! ```text
//! OneMinute children:   |  0  |  1  |  2  | ... |  9  |
//!                           ↓ rows sorted by timestamp
//! TenMinutes slots:     [ 0 | 1 | 2 | ... | 599 ]   one slot per second,
//!                        timestamp in the middle of the slot
//! ```
//!
//! Every slot aggregates the rows whose timestamp lies in
//! `[start + i * distance, start + (i + 1) * distance)`. Slots without rows
//! stay pending.

use crate::chunk::{HistoryBucket, HistoryChunk, HistoryValuesBuilder, RecordingType};
use crate::downsampling::calculator::DownSamplingCalculator;
use crate::storage::{format_utc, HistoryBucketDescriptor, Timestamp};

/// The slot timestamps of a calculated bucket: the center of every slot
pub fn calculate_time_stamps(descriptor: &HistoryBucketDescriptor) -> Vec<Timestamp> {
    let start = descriptor.start();
    let distance = descriptor.range.distance();
    (0..descriptor.range.entries_count())
        .map(|i| start + (i as f64 + 0.5) * distance)
        .collect()
}

/// Aggregates `children` into a calculated bucket for `descriptor`.
///
/// The configuration is taken from the first child; children with another
/// configuration are skipped.
///
/// # Panics
/// Panics if `children` is empty, unsorted or not within `descriptor`
pub fn calculate_down_sampled(descriptor: HistoryBucketDescriptor, children: &[HistoryBucket]) -> HistoryBucket {
    assert!(!children.is_empty(), "no children for {}", descriptor);
    for pair in children.windows(2) {
        assert!(
            pair[0].start() < pair[1].start(),
            "children must be sorted: {} before {}",
            pair[0].descriptor,
            pair[1].descriptor
        );
    }
    for child in children {
        assert!(
            descriptor.start() <= child.start() && child.end() <= descriptor.end(),
            "child {} not within {}",
            child.descriptor,
            descriptor
        );
    }

    let configuration = children[0].chunk.configuration().clone();
    let decimal_count = configuration.decimal_data_series_count();
    let enum_count = configuration.enum_data_series_count();
    let reference_entry_count = configuration.reference_entry_data_series_count();

    let timestamps = calculate_time_stamps(&descriptor);
    let entries_count = timestamps.len();
    let start = descriptor.start();
    let distance = descriptor.range.distance();

    let mut builder = HistoryValuesBuilder::new(
        decimal_count,
        enum_count,
        reference_entry_count,
        entries_count,
        RecordingType::Calculated,
    );
    let mut calculator = DownSamplingCalculator::new(decimal_count, enum_count, reference_entry_count);

    let mut slot = 0usize;
    let mut slot_end = start + distance;

    for child in children {
        if child.chunk.configuration() != &configuration {
            tracing::warn!(
                "skipping {}: configuration differs from first child of {}",
                child.descriptor,
                descriptor
            );
            continue;
        }

        let chunk = &child.chunk;
        for row in 0..chunk.timestamps_count() {
            let timestamp = chunk.timestamp(row);
            while timestamp >= slot_end && slot < entries_count {
                calculator.write_to(&mut builder, slot);
                calculator.reset();
                slot += 1;
                slot_end = start + (slot + 1) as f64 * distance;
            }
            if slot >= entries_count {
                tracing::warn!("row at {} lies behind {}", format_utc(timestamp), descriptor);
                break;
            }
            add_row(&mut calculator, chunk, row);
        }
    }

    if slot < entries_count {
        calculator.write_to(&mut builder, slot);
    }

    let chunk = HistoryChunk::new(configuration, timestamps, builder.build(), RecordingType::Calculated);
    HistoryBucket::new(descriptor, chunk)
}

fn add_row(calculator: &mut DownSamplingCalculator, chunk: &HistoryChunk, row: usize) {
    let values = chunk.values();

    calculator.add_decimals_sample(
        values.decimal.values().row(row),
        values.decimal.min_values().map(|grid| grid.row(row)),
        values.decimal.max_values().map(|grid| grid.row(row)),
    );

    calculator.add_enum_sample(values.enums.values().row(row));

    // Only calculated rows carry a different ids count
    let different_ids_counts = match chunk.recording_type() {
        RecordingType::Measured => None,
        RecordingType::Calculated => values
            .reference_entries
            .different_ids_count()
            .map(|grid| grid.row(row)),
    };
    calculator.add_reference_entry_sample(
        values.reference_entries.ids().row(row),
        different_ids_counts,
        values.reference_entries.statuses().row(row),
    );
}
