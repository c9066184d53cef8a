//! The value payload of one bucket
//!
//! A `HistoryChunk` is immutable. Changes produce new chunks, either through
//! `HistoryChunkBuilder` (rows appended one at a time) or `HistoryChunk::create`
//! (fixed row count, filled by a closure).
//!
//! ```text
//!              decimal 0   decimal 1   enum 0   ref 0
//! t0 ........  12.5        NaN         0b01     17
//! t1 ........  13.0        4.2         0b10     17
//! ```

use crate::chunk::configuration::HistoryConfiguration;
use crate::chunk::enum_set::{EnumAggregationMode, HistoryEnumOrdinal, HistoryEnumSet};
use crate::chunk::values::{
    is_no_value, is_pending, nan_if_pending_or_no_value, HistoryValues, HistoryValuesBuilder,
    RecordingType, ReferenceEntryId,
};
use crate::storage::sampling::SamplingPeriod;
use crate::storage::types::{format_utc, TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryChunk {
    configuration: HistoryConfiguration,
    timestamps: Vec<Timestamp>,
    values: HistoryValues,
    recording_type: RecordingType,
}

impl HistoryChunk {
    /// # Panics
    /// Panics if the grids do not match the configuration or the timestamps
    pub fn new(
        configuration: HistoryConfiguration,
        timestamps: Vec<Timestamp>,
        values: HistoryValues,
        recording_type: RecordingType,
    ) -> Self {
        assert_eq!(
            values.timestamps_count(),
            timestamps.len(),
            "values height must match the timestamps count"
        );
        assert_eq!(
            values.decimal_data_series_count(),
            configuration.decimal_data_series_count(),
            "decimal grid width mismatch"
        );
        assert_eq!(
            values.enum_data_series_count(),
            configuration.enum_data_series_count(),
            "enum grid width mismatch"
        );
        assert_eq!(
            values.reference_entry_data_series_count(),
            configuration.reference_entry_data_series_count(),
            "reference entry grid width mismatch"
        );
        debug_assert!(
            timestamps.windows(2).all(|w| w[0] < w[1]),
            "timestamps must be sorted ascending"
        );

        Self {
            configuration,
            timestamps,
            values,
            recording_type,
        }
    }

    /// Creates a measured chunk with a known number of rows.
    ///
    /// `fill` is called once per row with the row index and its timestamp.
    pub fn create<F>(configuration: HistoryConfiguration, timestamps: Vec<Timestamp>, mut fill: F) -> Self
    where
        F: FnMut(&mut HistoryValuesBuilder, usize, Timestamp),
    {
        let mut builder = HistoryValuesBuilder::new(
            configuration.decimal_data_series_count(),
            configuration.enum_data_series_count(),
            configuration.reference_entry_data_series_count(),
            timestamps.len(),
            RecordingType::Measured,
        );
        for (index, timestamp) in timestamps.iter().enumerate() {
            fill(&mut builder, index, *timestamp);
        }
        Self::new(configuration, timestamps, builder.build(), RecordingType::Measured)
    }

    pub fn configuration(&self) -> &HistoryConfiguration {
        &self.configuration
    }

    pub fn timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn values(&self) -> &HistoryValues {
        &self.values
    }

    pub fn recording_type(&self) -> RecordingType {
        self.recording_type
    }

    pub fn timestamps_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// The timestamp of the row. For calculated chunks this is the slot center.
    pub fn timestamp(&self, timestamp_index: usize) -> Timestamp {
        self.timestamps[timestamp_index]
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.first().copied()
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.timestamps.last().copied()
    }

    /// Start of the time covered by the row
    pub fn timestamp_start(&self, timestamp_index: usize, sampling_period: SamplingPeriod) -> Timestamp {
        match self.recording_type {
            RecordingType::Measured => self.timestamp(timestamp_index),
            RecordingType::Calculated => self.timestamp(timestamp_index) - sampling_period.distance() / 2.0,
        }
    }

    /// End of the time covered by the row
    pub fn timestamp_end(&self, timestamp_index: usize, sampling_period: SamplingPeriod) -> Timestamp {
        match self.recording_type {
            RecordingType::Measured => self.timestamp(timestamp_index) + sampling_period.distance(),
            RecordingType::Calculated => self.timestamp(timestamp_index) + sampling_period.distance() / 2.0,
        }
    }

    /// First to last timestamp, `None` for an empty chunk
    pub fn time_range(&self) -> Option<TimeRange> {
        match (self.first_timestamp(), self.last_timestamp()) {
            (Some(first), Some(last)) => Some(TimeRange::new(first, last)),
            _ => None,
        }
    }

    pub fn is_pending(&self, timestamp_index: usize) -> bool {
        self.values.is_pending(timestamp_index)
    }

    /// The decimal value. Both `NoValue` and `Pending` are returned as NaN.
    pub fn get_decimal_value(&self, series: usize, timestamp_index: usize) -> f64 {
        nan_if_pending_or_no_value(self.values.decimal.get(series, timestamp_index))
    }

    /// The stored value including the sentinels
    pub fn get_raw_decimal_value(&self, series: usize, timestamp_index: usize) -> f64 {
        self.values.decimal.get(series, timestamp_index)
    }

    pub fn get_min(&self, series: usize, timestamp_index: usize) -> f64 {
        nan_if_pending_or_no_value(self.values.decimal.get_min(series, timestamp_index))
    }

    pub fn get_max(&self, series: usize, timestamp_index: usize) -> f64 {
        nan_if_pending_or_no_value(self.values.decimal.get_max(series, timestamp_index))
    }

    pub fn has_decimal_min_max_values(&self) -> bool {
        self.values.decimal.has_min_max()
    }

    pub fn get_enum_value(&self, series: usize, timestamp_index: usize) -> HistoryEnumSet {
        self.values.enums.get(series, timestamp_index)
    }

    pub fn get_enum_ordinal_most_time(&self, series: usize, timestamp_index: usize) -> HistoryEnumOrdinal {
        self.values.enums.get_ordinal_most_time(series, timestamp_index)
    }

    /// The single ordinal a reader sees for the slot
    pub fn get_enum_ordinal(
        &self,
        series: usize,
        timestamp_index: usize,
        mode: EnumAggregationMode,
    ) -> HistoryEnumOrdinal {
        match mode {
            EnumAggregationMode::ByOrdinal => self
                .get_enum_value(series, timestamp_index)
                .first_set_ordinal(),
            EnumAggregationMode::MostTime => self.get_enum_ordinal_most_time(series, timestamp_index),
        }
    }

    /// The measured id, or the id that was active most of the time
    pub fn get_reference_entry_id(&self, series: usize, timestamp_index: usize) -> ReferenceEntryId {
        self.values.reference_entries.get_id(series, timestamp_index)
    }

    pub fn get_reference_entry_ids_count(&self, series: usize, timestamp_index: usize) -> i32 {
        self.values
            .reference_entries
            .get_different_ids_count(series, timestamp_index)
    }

    pub fn get_reference_entry_status(&self, series: usize, timestamp_index: usize) -> HistoryEnumSet {
        self.values
            .reference_entries
            .get_status(series, timestamp_index)
    }

    /// Binary search for a timestamp.
    ///
    /// `Ok(index)` on an exact hit, `Err(insertion_index)` otherwise.
    pub fn best_timestamp_index_for(&self, timestamp: Timestamp) -> Result<usize, usize> {
        self.timestamps
            .binary_search_by(|candidate| candidate.total_cmp(&timestamp))
    }

    /// Index range of the rows within [start, end)
    fn row_bounds(&self, start: Timestamp, end: Timestamp) -> (usize, usize) {
        let from = self.timestamps.partition_point(|t| *t < start);
        let to = self.timestamps.partition_point(|t| *t < end);
        (from, to.max(from))
    }

    /// True if at least one timestamp is within [start, end)
    pub fn contains_any(&self, start: Timestamp, end: Timestamp) -> bool {
        assert!(start < end, "start {} must be before end {}", start, end);
        let (from, to) = self.row_bounds(start, end);
        from < to
    }

    /// The rows within [start, end), `None` if there are none
    pub fn range(&self, start: Timestamp, end: Timestamp) -> Option<HistoryChunk> {
        assert!(
            start < end,
            "start {} must be before end {}",
            format_utc(start),
            format_utc(end)
        );
        let (from, to) = self.row_bounds(start, end);
        if from >= to {
            return None;
        }
        if from == 0 && to == self.timestamps.len() {
            return Some(self.clone());
        }

        let mut builder = self.values_builder(to - from);
        for (target, source) in (from..to).enumerate() {
            builder.copy_row_from(target, &self.values, source);
        }
        Some(Self::new(
            self.configuration.clone(),
            self.timestamps[from..to].to_vec(),
            builder.build(),
            self.recording_type,
        ))
    }

    /// Merges two measured chunks, keeping only the rows within [start, end).
    ///
    /// Rows of `self` win if both chunks contain the same timestamp.
    /// Returns `None` if no row remains.
    pub fn merge(&self, other: &HistoryChunk, start: Timestamp, end: Timestamp) -> Option<HistoryChunk> {
        assert!(start < end, "start {} must be before end {}", start, end);
        assert_eq!(
            self.configuration, other.configuration,
            "configurations do not match"
        );
        assert!(
            self.recording_type == RecordingType::Measured
                && other.recording_type == RecordingType::Measured,
            "merge is only supported for measured chunks"
        );
        tracing::trace!(
            "merge {} + {} rows within {} - {}",
            self.timestamps_count(),
            other.timestamps_count(),
            format_utc(start),
            format_utc(end)
        );

        if !other.contains_any(start, end) {
            return self.range(start, end);
        }
        if !self.contains_any(start, end) {
            return other.range(start, end);
        }

        let (this_from, this_to) = self.row_bounds(start, end);
        let (other_from, other_to) = other.row_bounds(start, end);

        // (source, row index) in timestamp order
        let mut rows: Vec<(&HistoryChunk, usize)> =
            Vec::with_capacity(this_to - this_from + other_to - other_from);
        let (mut i, mut j) = (this_from, other_from);
        while i < this_to || j < other_to {
            if j >= other_to {
                rows.push((self, i));
                i += 1;
            } else if i >= this_to {
                rows.push((other, j));
                j += 1;
            } else {
                let (this_ts, other_ts) = (self.timestamps[i], other.timestamps[j]);
                if this_ts == other_ts {
                    rows.push((self, i));
                    i += 1;
                    j += 1;
                } else if this_ts < other_ts {
                    rows.push((self, i));
                    i += 1;
                } else {
                    rows.push((other, j));
                    j += 1;
                }
            }
        }

        let mut builder = self.values_builder(rows.len());
        let mut timestamps = Vec::with_capacity(rows.len());
        for (target, (source, index)) in rows.into_iter().enumerate() {
            timestamps.push(source.timestamps[index]);
            builder.copy_row_from(target, &source.values, index);
        }

        Some(Self::new(
            self.configuration.clone(),
            timestamps,
            builder.build(),
            RecordingType::Measured,
        ))
    }

    fn values_builder(&self, timestamps_count: usize) -> HistoryValuesBuilder {
        HistoryValuesBuilder::new(
            self.configuration.decimal_data_series_count(),
            self.configuration.enum_data_series_count(),
            self.configuration.reference_entry_data_series_count(),
            timestamps_count,
            self.recording_type,
        )
    }

    /// Smallest and largest value of a decimal series, ignoring gaps.
    /// Iterates all rows.
    pub fn find_min_max_value(&self, series: usize) -> Option<(f64, f64)> {
        (0..self.timestamps_count())
            .map(|index| self.values.decimal.get(series, index))
            .filter(|value| !is_pending(*value) && !is_no_value(*value))
            .fold(None, |acc, value| match acc {
                None => Some((value, value)),
                Some((min, max)) => Some((min.min(value), max.max(value))),
            })
    }

    /// Human readable table of all rows
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "HistoryChunk ({}, {} timestamps)",
            self.recording_type,
            self.timestamps_count()
        );
        for (index, timestamp) in self.timestamps.iter().enumerate() {
            let _ = write!(out, "{}", format_utc(*timestamp));
            for series in 0..self.configuration.decimal_data_series_count() {
                let _ = write!(out, "\t{}", self.get_decimal_value(series, index));
            }
            for series in 0..self.configuration.enum_data_series_count() {
                let _ = write!(out, "\t{}", self.get_enum_value(series, index));
            }
            for series in 0..self.configuration.reference_entry_data_series_count() {
                let _ = write!(out, "\t{}", self.get_reference_entry_id(series, index));
            }
            let _ = writeln!(out);
        }
        out
    }
}

impl fmt::Display for HistoryChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time_range() {
            Some(range) => write!(
                f,
                "HistoryChunk({}, {} timestamps, {})",
                self.recording_type,
                self.timestamps_count(),
                range
            ),
            None => write!(f, "HistoryChunk({}, empty)", self.recording_type),
        }
    }
}

/// Appends measured rows one at a time
pub struct HistoryChunkBuilder {
    configuration: HistoryConfiguration,
    timestamps: Vec<Timestamp>,
    values: HistoryValuesBuilder,
}

impl HistoryChunkBuilder {
    const INITIAL_CAPACITY: usize = 16;

    pub fn new(configuration: HistoryConfiguration) -> Self {
        let values = HistoryValuesBuilder::new(
            configuration.decimal_data_series_count(),
            configuration.enum_data_series_count(),
            configuration.reference_entry_data_series_count(),
            Self::INITIAL_CAPACITY,
            RecordingType::Measured,
        );
        Self {
            configuration,
            timestamps: Vec::with_capacity(Self::INITIAL_CAPACITY),
            values,
        }
    }

    /// Starts a new row and returns its index
    fn next_row(&mut self, timestamp: Timestamp) -> usize {
        if let Some(last) = self.timestamps.last() {
            assert!(
                timestamp > *last,
                "timestamps must be added in ascending order: {} after {}",
                format_utc(timestamp),
                format_utc(*last)
            );
        }
        let index = self.timestamps.len();
        if index >= self.values.timestamps_count() {
            self.values.resize_timestamps((index * 2).max(Self::INITIAL_CAPACITY));
        }
        self.timestamps.push(timestamp);
        index
    }

    pub fn add_values(
        &mut self,
        timestamp: Timestamp,
        decimals: &[f64],
        enums: &[HistoryEnumSet],
        reference_entry_ids: &[ReferenceEntryId],
        reference_entry_statuses: &[HistoryEnumSet],
    ) -> &mut Self {
        assert_eq!(decimals.len(), self.configuration.decimal_data_series_count(), "decimal count");
        assert_eq!(enums.len(), self.configuration.enum_data_series_count(), "enum count");
        assert_eq!(
            reference_entry_ids.len(),
            self.configuration.reference_entry_data_series_count(),
            "reference entry count"
        );
        assert_eq!(
            reference_entry_statuses.len(),
            reference_entry_ids.len(),
            "reference entry status count"
        );

        let row = self.next_row(timestamp);
        self.values.set_decimal_row(row, decimals);
        for (series, value) in enums.iter().enumerate() {
            self.values.set_enum_value(series, row, *value);
        }
        for (series, (id, status)) in reference_entry_ids
            .iter()
            .zip(reference_entry_statuses)
            .enumerate()
        {
            self.values
                .set_reference_entry_value(series, row, *id, *status);
        }
        self
    }

    /// For configurations without enum and reference entry series
    pub fn add_decimal_values(&mut self, timestamp: Timestamp, decimals: &[f64]) -> &mut Self {
        self.add_values(timestamp, decimals, &[], &[], &[])
    }

    /// For configurations with enum series only
    pub fn add_enum_values(&mut self, timestamp: Timestamp, enums: &[HistoryEnumSet]) -> &mut Self {
        self.add_values(timestamp, &[], enums, &[], &[])
    }

    /// For configurations with reference entry series only
    pub fn add_reference_entry_values(
        &mut self,
        timestamp: Timestamp,
        ids: &[ReferenceEntryId],
        statuses: &[HistoryEnumSet],
    ) -> &mut Self {
        self.add_values(timestamp, &[], &[], ids, statuses)
    }

    pub fn timestamps_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn build(mut self) -> HistoryChunk {
        self.values.resize_timestamps(self.timestamps.len());
        HistoryChunk::new(
            self.configuration,
            self.timestamps,
            self.values.build(),
            RecordingType::Measured,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::configuration::{DataSeriesId, HistoryEnum, HistoryUnit};

    fn decimals_chunk(rows: &[(f64, f64)]) -> HistoryChunk {
        let mut builder = HistoryChunkBuilder::new(HistoryConfiguration::only_decimals(&[1], &["value"]));
        for (timestamp, value) in rows {
            builder.add_decimal_values(*timestamp, &[*value]);
        }
        builder.build()
    }

    #[test]
    fn test_builder_grows() {
        let rows: Vec<(f64, f64)> = (0..40).map(|i| (i as f64 * 10.0, i as f64)).collect();
        let chunk = decimals_chunk(&rows);
        assert_eq!(chunk.timestamps_count(), 40);
        assert_eq!(chunk.get_decimal_value(0, 39), 39.0);
        assert_eq!(chunk.first_timestamp(), Some(0.0));
        assert_eq!(chunk.last_timestamp(), Some(390.0));
        assert_eq!(chunk.time_range(), Some(TimeRange::new(0.0, 390.0)));
    }

    #[test]
    fn test_sentinels_read_as_nan() {
        let chunk = decimals_chunk(&[(1.0, f64::NAN), (2.0, crate::chunk::values::PENDING), (3.0, 4.0)]);
        assert!(chunk.get_decimal_value(0, 0).is_nan());
        assert!(chunk.get_decimal_value(0, 1).is_nan());
        assert!(is_pending(chunk.get_raw_decimal_value(0, 1)));
        assert!(chunk.is_pending(1));
        assert_eq!(chunk.get_min(0, 2), 4.0);
        assert_eq!(chunk.find_min_max_value(0), Some((4.0, 4.0)));
    }

    #[test]
    #[should_panic(expected = "ascending order")]
    fn test_builder_rejects_unsorted() {
        decimals_chunk(&[(5.0, 1.0), (4.0, 2.0)]);
    }

    #[test]
    fn test_best_timestamp_index_for() {
        let chunk = decimals_chunk(&[(100.0, 1.0), (200.0, 2.0), (300.0, 3.0)]);
        assert_eq!(chunk.best_timestamp_index_for(200.0), Ok(1));
        assert_eq!(chunk.best_timestamp_index_for(50.0), Err(0));
        assert_eq!(chunk.best_timestamp_index_for(250.0), Err(2));
        assert_eq!(chunk.best_timestamp_index_for(301.0), Err(3));
    }

    #[test]
    fn test_range() {
        let chunk = decimals_chunk(&[(100.0, 1.0), (200.0, 2.0), (300.0, 3.0), (400.0, 4.0)]);

        let middle = chunk.range(150.0, 400.0).unwrap();
        assert_eq!(middle.timestamps(), &[200.0, 300.0]);
        assert_eq!(middle.get_decimal_value(0, 1), 3.0);

        let all = chunk.range(0.0, 1000.0).unwrap();
        assert_eq!(all.timestamps_count(), 4);

        assert!(chunk.range(401.0, 500.0).is_none());
        assert!(chunk.range(0.0, 100.0).is_none());
        assert!(chunk.range(210.0, 290.0).is_none());
    }

    #[test]
    fn test_merge_interleaved_this_wins() {
        let this = decimals_chunk(&[(100.0, 1.0), (300.0, 3.0), (500.0, 5.0)]);
        let other = decimals_chunk(&[(200.0, 20.0), (300.0, 30.0), (600.0, 60.0)]);

        let merged = this.merge(&other, 0.0, 550.0).unwrap();
        assert_eq!(merged.timestamps(), &[100.0, 200.0, 300.0, 500.0]);
        assert_eq!(merged.get_decimal_value(0, 1), 20.0);
        assert_eq!(merged.get_decimal_value(0, 2), 3.0);
    }

    #[test]
    fn test_merge_disjoint_and_empty() {
        let first = decimals_chunk(&[(100.0, 1.0), (200.0, 2.0)]);
        let second = decimals_chunk(&[(300.0, 3.0), (400.0, 4.0)]);

        let appended = second.merge(&first, 0.0, 1000.0).unwrap();
        assert_eq!(appended.timestamps(), &[100.0, 200.0, 300.0, 400.0]);

        let clipped = first.merge(&second, 150.0, 350.0).unwrap();
        assert_eq!(clipped.timestamps(), &[200.0, 300.0]);

        assert!(first.merge(&second, 500.0, 600.0).is_none());
    }

    #[test]
    fn test_mixed_configuration_rows() {
        let configuration = HistoryConfiguration::builder()
            .decimal_data_series(DataSeriesId(1), "Temperature", HistoryUnit::new("°C"))
            .enum_data_series(DataSeriesId(2), "Valve", HistoryEnum::boolean("Valve"))
            .reference_entry_data_series(DataSeriesId(3), "Operator", None)
            .build();
        let mut builder = HistoryChunkBuilder::new(configuration);
        builder.add_values(
            1_000.0,
            &[21.5],
            &[HistoryEnumSet::BOOLEAN_TRUE],
            &[ReferenceEntryId(42)],
            &[HistoryEnumSet::BOOLEAN_FALSE],
        );
        let chunk = builder.build();

        assert_eq!(chunk.get_enum_value(0, 0), HistoryEnumSet::BOOLEAN_TRUE);
        assert_eq!(
            chunk.get_enum_ordinal(0, 0, EnumAggregationMode::ByOrdinal),
            HistoryEnumOrdinal::BOOLEAN_TRUE
        );
        assert_eq!(
            chunk.get_enum_ordinal(0, 0, EnumAggregationMode::MostTime),
            HistoryEnumOrdinal::BOOLEAN_TRUE
        );
        assert_eq!(chunk.get_reference_entry_id(0, 0), ReferenceEntryId(42));
        assert_eq!(chunk.get_reference_entry_ids_count(0, 0), 1);
        assert_eq!(chunk.get_reference_entry_status(0, 0), HistoryEnumSet::BOOLEAN_FALSE);
        assert!(chunk.dump().contains("1970-01-01T00:00:01.000Z\t21.5"));
    }

    #[test]
    fn test_create_with_closure() {
        let configuration = HistoryConfiguration::only_decimals(&[1, 2], &["a", "b"]);
        let chunk = HistoryChunk::create(configuration, vec![0.0, 100.0, 200.0], |builder, index, timestamp| {
            builder.set_decimal_row(index, &[timestamp, index as f64]);
        });
        assert_eq!(chunk.get_decimal_value(0, 2), 200.0);
        assert_eq!(chunk.get_decimal_value(1, 1), 1.0);
        assert_eq!(chunk.timestamp_end(1, SamplingPeriod::EveryHundredMillis), 200.0);
    }

    #[test]
    fn test_json_round_trip_keeps_nan() {
        let chunk = decimals_chunk(&[(1.0, f64::NAN), (2.0, 2.0)]);
        let json = serde_json::to_string(&chunk).unwrap();
        let restored: HistoryChunk = serde_json::from_str(&json).unwrap();
        assert!(restored.get_decimal_value(0, 0).is_nan());
        assert_eq!(restored.get_decimal_value(0, 1), 2.0);
        assert_eq!(restored.timestamps(), chunk.timestamps());
    }
}
