//! Deterministic sample data
//!
//! Decimal series `i` follows `sin(t / 1000 + i) * 100` with `t` in ms.
//! Enum series alternate between two ordinals every ten samples, reference
//! entries change every hundred samples.

use crate::chunk::{
    HistoryBucket, HistoryChunk, HistoryChunkBuilder, HistoryConfiguration, HistoryEnumSet, ReferenceEntryId,
};
use crate::storage::{HistoryBucketDescriptor, Timestamp};

/// The value of decimal series `series` at `timestamp`
pub fn sinus_value(timestamp: Timestamp, series: usize) -> f64 {
    (timestamp / 1000.0 + series as f64).sin() * 100.0
}

/// A measured chunk with one sample per sampling distance of `descriptor`,
/// starting at the start of the descriptor
pub fn sinus_chunk(configuration: &HistoryConfiguration, descriptor: &HistoryBucketDescriptor) -> HistoryChunk {
    let start = descriptor.start();
    let distance = descriptor.range.distance();

    let decimal_count = configuration.decimal_data_series_count();
    let enum_count = configuration.enum_data_series_count();
    let reference_entry_count = configuration.reference_entry_data_series_count();

    let mut builder = HistoryChunkBuilder::new(configuration.clone());
    let mut decimals = vec![0.0; decimal_count];
    let mut enums = vec![HistoryEnumSet::PENDING; enum_count];
    let mut ids = vec![ReferenceEntryId::PENDING; reference_entry_count];
    let statuses = vec![HistoryEnumSet::BOOLEAN_TRUE; reference_entry_count];

    for row in 0..descriptor.range.entries_count() {
        let timestamp = start + row as f64 * distance;
        for (series, value) in decimals.iter_mut().enumerate() {
            *value = sinus_value(timestamp, series);
        }
        for (series, value) in enums.iter_mut().enumerate() {
            *value = HistoryEnumSet::for_enum_value(((row / 10 + series) % 2) as i32);
        }
        for (series, id) in ids.iter_mut().enumerate() {
            *id = ReferenceEntryId((row / 100 + series) as i32);
        }
        builder.add_values(timestamp, &decimals, &enums, &ids, &statuses);
    }
    builder.build()
}

/// `count` consecutive sinus buckets starting with `first`
pub fn sinus_buckets(
    configuration: &HistoryConfiguration,
    first: HistoryBucketDescriptor,
    count: usize,
) -> Vec<HistoryBucket> {
    let mut descriptor = first;
    let mut buckets = Vec::with_capacity(count);
    for _ in 0..count {
        buckets.push(HistoryBucket::new(descriptor, sinus_chunk(configuration, &descriptor)));
        descriptor = descriptor.next();
    }
    buckets
}
