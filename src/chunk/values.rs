//! Columnar value storage of a chunk
//!
//! Every grid has one column per data series and one row per timestamp.
//!
//! ```text
//! HistoryValues
//!   decimal          values [+ min, max]              (calculated only)
//!   enum             bit sets [+ most-time ordinals]  (calculated only)
//!   reference entry  ids, statuses [+ different ids count]
//! ```
//!
//! Measured chunks carry only the plain grids. Calculated (down-sampled)
//! chunks additionally carry the aggregation side grids.

use crate::chunk::enum_set::{HistoryEnumOrdinal, HistoryEnumSet};
use crate::chunk::grid::{Array2, DoubleArray2, GridElement, IntArray2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel for "a sample was taken but holds no valid value"
pub const NO_VALUE: f64 = f64::NAN;

/// Sentinel for "no sample recorded (yet)"
pub const PENDING: f64 = f64::MAX;

pub fn is_no_value(value: f64) -> bool {
    value.is_nan()
}

pub fn is_pending(value: f64) -> bool {
    value == PENDING
}

/// Maps both sentinels to NaN
pub fn nan_if_pending_or_no_value(value: f64) -> f64 {
    if is_pending(value) || is_no_value(value) {
        f64::NAN
    } else {
        value
    }
}

/// Max that ignores the sentinels
pub fn max_history_aware(first: f64, second: f64) -> f64 {
    if is_pending(first) || is_no_value(first) {
        return second;
    }
    if is_pending(second) || is_no_value(second) {
        return first;
    }
    first.max(second)
}

/// Min that ignores the sentinels
pub fn min_history_aware(first: f64, second: f64) -> f64 {
    if is_pending(first) || is_no_value(first) {
        return second;
    }
    if is_pending(second) || is_no_value(second) {
        return first;
    }
    first.min(second)
}

/// How the values of a chunk have been created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordingType {
    /// Raw samples
    Measured,
    /// Aggregated by down-sampling
    Calculated,
}

impl fmt::Display for RecordingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingType::Measured => write!(f, "measured"),
            RecordingType::Calculated => write!(f, "calculated"),
        }
    }
}

/// The id of a reference entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceEntryId(pub i32);

impl ReferenceEntryId {
    pub const NO_VALUE: ReferenceEntryId = ReferenceEntryId(-1);
    pub const PENDING: ReferenceEntryId = ReferenceEntryId(-2);

    pub fn is_no_value(&self) -> bool {
        *self == Self::NO_VALUE
    }

    pub fn is_pending(&self) -> bool {
        *self == Self::PENDING
    }

    pub fn is_value(&self) -> bool {
        self.0 >= 0
    }
}

impl fmt::Display for ReferenceEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NO_VALUE => write!(f, "NoValue"),
            Self::PENDING => write!(f, "Pending"),
            ReferenceEntryId(id) => write!(f, "{}", id),
        }
    }
}

/// Count sentinels share the values of `ReferenceEntryId`
pub const DIFFERENT_IDS_NO_VALUE: i32 = -1;
pub const DIFFERENT_IDS_PENDING: i32 = -2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimalHistoryValues {
    values: DoubleArray2,
    min_values: Option<DoubleArray2>,
    max_values: Option<DoubleArray2>,
}

impl DecimalHistoryValues {
    pub fn new(
        values: DoubleArray2,
        min_values: Option<DoubleArray2>,
        max_values: Option<DoubleArray2>,
    ) -> Self {
        for side in [&min_values, &max_values].into_iter().flatten() {
            assert_eq!(side.width(), values.width(), "min/max width mismatch");
            assert_eq!(side.height(), values.height(), "min/max height mismatch");
        }
        Self {
            values,
            min_values,
            max_values,
        }
    }

    pub fn values(&self) -> &DoubleArray2 {
        &self.values
    }

    pub fn min_values(&self) -> Option<&DoubleArray2> {
        self.min_values.as_ref()
    }

    pub fn max_values(&self) -> Option<&DoubleArray2> {
        self.max_values.as_ref()
    }

    pub fn has_min_max(&self) -> bool {
        self.min_values.is_some() && self.max_values.is_some()
    }

    /// Raw value, sentinels included
    pub fn get(&self, series: usize, timestamp_index: usize) -> f64 {
        self.values.get(series, timestamp_index)
    }

    /// Falls back to the value if no min values are stored
    pub fn get_min(&self, series: usize, timestamp_index: usize) -> f64 {
        match &self.min_values {
            Some(min) => min.get(series, timestamp_index),
            None => self.get(series, timestamp_index),
        }
    }

    /// Falls back to the value if no max values are stored
    pub fn get_max(&self, series: usize, timestamp_index: usize) -> f64 {
        match &self.max_values {
            Some(max) => max.get(series, timestamp_index),
            None => self.get(series, timestamp_index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumHistoryValues {
    values: IntArray2,
    most_of_the_time: Option<IntArray2>,
}

impl EnumHistoryValues {
    pub fn new(values: IntArray2, most_of_the_time: Option<IntArray2>) -> Self {
        if let Some(most_time) = &most_of_the_time {
            assert_eq!(most_time.width(), values.width(), "most-time width mismatch");
            assert_eq!(most_time.height(), values.height(), "most-time height mismatch");
        }
        Self {
            values,
            most_of_the_time,
        }
    }

    pub fn values(&self) -> &IntArray2 {
        &self.values
    }

    pub fn most_of_the_time(&self) -> Option<&IntArray2> {
        self.most_of_the_time.as_ref()
    }

    pub fn get(&self, series: usize, timestamp_index: usize) -> HistoryEnumSet {
        HistoryEnumSet(self.values.get(series, timestamp_index))
    }

    /// Falls back to the first set ordinal for measured values
    pub fn get_ordinal_most_time(&self, series: usize, timestamp_index: usize) -> HistoryEnumOrdinal {
        match &self.most_of_the_time {
            Some(most_time) => HistoryEnumOrdinal(most_time.get(series, timestamp_index)),
            None => self.get(series, timestamp_index).first_set_ordinal(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntryHistoryValues {
    ids: IntArray2,
    different_ids_count: Option<IntArray2>,
    statuses: IntArray2,
}

impl ReferenceEntryHistoryValues {
    pub fn new(ids: IntArray2, different_ids_count: Option<IntArray2>, statuses: IntArray2) -> Self {
        assert_eq!(statuses.width(), ids.width(), "status width mismatch");
        assert_eq!(statuses.height(), ids.height(), "status height mismatch");
        if let Some(counts) = &different_ids_count {
            assert_eq!(counts.width(), ids.width(), "count width mismatch");
            assert_eq!(counts.height(), ids.height(), "count height mismatch");
        }
        Self {
            ids,
            different_ids_count,
            statuses,
        }
    }

    pub fn ids(&self) -> &IntArray2 {
        &self.ids
    }

    pub fn different_ids_count(&self) -> Option<&IntArray2> {
        self.different_ids_count.as_ref()
    }

    pub fn statuses(&self) -> &IntArray2 {
        &self.statuses
    }

    pub fn get_id(&self, series: usize, timestamp_index: usize) -> ReferenceEntryId {
        ReferenceEntryId(self.ids.get(series, timestamp_index))
    }

    pub fn get_status(&self, series: usize, timestamp_index: usize) -> HistoryEnumSet {
        HistoryEnumSet(self.statuses.get(series, timestamp_index))
    }

    /// Number of different ids in the slot. A measured value counts as one.
    pub fn get_different_ids_count(&self, series: usize, timestamp_index: usize) -> i32 {
        if let Some(counts) = &self.different_ids_count {
            return counts.get(series, timestamp_index);
        }
        let id = self.get_id(series, timestamp_index);
        if id.is_no_value() {
            DIFFERENT_IDS_NO_VALUE
        } else if id.is_pending() {
            DIFFERENT_IDS_PENDING
        } else {
            1
        }
    }
}

/// All values of a chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryValues {
    pub decimal: DecimalHistoryValues,
    pub enums: EnumHistoryValues,
    pub reference_entries: ReferenceEntryHistoryValues,
}

impl HistoryValues {
    pub fn decimal_data_series_count(&self) -> usize {
        self.decimal.values.width()
    }

    pub fn enum_data_series_count(&self) -> usize {
        self.enums.values.width()
    }

    pub fn reference_entry_data_series_count(&self) -> usize {
        self.reference_entries.ids.width()
    }

    /// The number of rows. Grids without series report their own height too.
    pub fn timestamps_count(&self) -> usize {
        self.decimal.values.height()
    }

    /// True if the first series of the timestamp holds `Pending`
    pub fn is_pending(&self, timestamp_index: usize) -> bool {
        if self.decimal_data_series_count() > 0 {
            return is_pending(self.decimal.get(0, timestamp_index));
        }
        if self.enum_data_series_count() > 0 {
            return self.enums.get(0, timestamp_index).is_pending();
        }
        if self.reference_entry_data_series_count() > 0 {
            return self.reference_entries.get_id(0, timestamp_index).is_pending();
        }
        false
    }
}

/// Fills the grids of a `HistoryValues` row by row
///
/// All slots start as pending.
#[derive(Debug, Clone)]
pub struct HistoryValuesBuilder {
    recording_type: RecordingType,
    decimal_values: DoubleArray2,
    min_values: Option<DoubleArray2>,
    max_values: Option<DoubleArray2>,
    enum_values: IntArray2,
    enum_most_time: Option<IntArray2>,
    reference_entry_ids: IntArray2,
    reference_entry_counts: Option<IntArray2>,
    reference_entry_statuses: IntArray2,
}

impl HistoryValuesBuilder {
    pub fn new(
        decimal_count: usize,
        enum_count: usize,
        reference_entry_count: usize,
        timestamps_count: usize,
        recording_type: RecordingType,
    ) -> Self {
        let calculated = recording_type == RecordingType::Calculated;
        let pending_decimals = || DoubleArray2::new(decimal_count, timestamps_count, PENDING);

        Self {
            recording_type,
            decimal_values: pending_decimals(),
            min_values: calculated.then(pending_decimals),
            max_values: calculated.then(pending_decimals),
            enum_values: IntArray2::new(enum_count, timestamps_count, HistoryEnumSet::PENDING.0),
            enum_most_time: calculated.then(|| {
                IntArray2::new(enum_count, timestamps_count, HistoryEnumOrdinal::PENDING.0)
            }),
            reference_entry_ids: IntArray2::new(
                reference_entry_count,
                timestamps_count,
                ReferenceEntryId::PENDING.0,
            ),
            reference_entry_counts: calculated.then(|| {
                IntArray2::new(reference_entry_count, timestamps_count, DIFFERENT_IDS_PENDING)
            }),
            reference_entry_statuses: IntArray2::new(
                reference_entry_count,
                timestamps_count,
                HistoryEnumSet::PENDING.0,
            ),
        }
    }

    pub fn recording_type(&self) -> RecordingType {
        self.recording_type
    }

    pub fn timestamps_count(&self) -> usize {
        self.decimal_values.height()
    }

    /// Changes the number of rows, keeping the existing rows.
    /// New rows are pending.
    pub fn resize_timestamps(&mut self, timestamps_count: usize) {
        if timestamps_count == self.timestamps_count() {
            return;
        }
        fn resize<T: GridElement>(grid: &Array2<T>, height: usize, fill: T) -> Array2<T> {
            let mut resized = Array2::new(grid.width(), height, fill);
            let copied = grid.height().min(height) * grid.width();
            resized.data_mut()[..copied].copy_from_slice(&grid.data()[..copied]);
            resized
        }

        self.decimal_values = resize(&self.decimal_values, timestamps_count, PENDING);
        self.min_values = self
            .min_values
            .as_ref()
            .map(|g| resize(g, timestamps_count, PENDING));
        self.max_values = self
            .max_values
            .as_ref()
            .map(|g| resize(g, timestamps_count, PENDING));
        self.enum_values = resize(&self.enum_values, timestamps_count, HistoryEnumSet::PENDING.0);
        self.enum_most_time = self
            .enum_most_time
            .as_ref()
            .map(|g| resize(g, timestamps_count, HistoryEnumOrdinal::PENDING.0));
        self.reference_entry_ids = resize(
            &self.reference_entry_ids,
            timestamps_count,
            ReferenceEntryId::PENDING.0,
        );
        self.reference_entry_counts = self
            .reference_entry_counts
            .as_ref()
            .map(|g| resize(g, timestamps_count, DIFFERENT_IDS_PENDING));
        self.reference_entry_statuses = resize(
            &self.reference_entry_statuses,
            timestamps_count,
            HistoryEnumSet::PENDING.0,
        );
    }

    fn require_measured(&self) {
        assert_eq!(
            self.recording_type,
            RecordingType::Measured,
            "only supported for measured values"
        );
    }

    fn require_calculated(&self) {
        assert_eq!(
            self.recording_type,
            RecordingType::Calculated,
            "only supported for calculated values"
        );
    }

    pub fn set_decimal_value(&mut self, series: usize, timestamp_index: usize, value: f64) {
        self.require_measured();
        self.decimal_values.set(series, timestamp_index, value);
    }

    pub fn set_decimal_row(&mut self, timestamp_index: usize, values: &[f64]) {
        self.require_measured();
        self.decimal_values.set_row(timestamp_index, values);
    }

    pub fn set_enum_value(&mut self, series: usize, timestamp_index: usize, value: HistoryEnumSet) {
        self.require_measured();
        self.enum_values.set(series, timestamp_index, value.0);
    }

    pub fn set_reference_entry_value(
        &mut self,
        series: usize,
        timestamp_index: usize,
        id: ReferenceEntryId,
        status: HistoryEnumSet,
    ) {
        self.require_measured();
        self.reference_entry_ids.set(series, timestamp_index, id.0);
        self.reference_entry_statuses
            .set(series, timestamp_index, status.0);
    }

    pub fn set_calculated_decimal(
        &mut self,
        series: usize,
        timestamp_index: usize,
        average: f64,
        min: f64,
        max: f64,
    ) {
        self.require_calculated();
        self.decimal_values.set(series, timestamp_index, average);
        if let Some(grid) = self.min_values.as_mut() {
            grid.set(series, timestamp_index, min);
        }
        if let Some(grid) = self.max_values.as_mut() {
            grid.set(series, timestamp_index, max);
        }
    }

    pub fn set_calculated_enum(
        &mut self,
        series: usize,
        timestamp_index: usize,
        union: HistoryEnumSet,
        most_time: HistoryEnumOrdinal,
    ) {
        self.require_calculated();
        self.enum_values.set(series, timestamp_index, union.0);
        if let Some(grid) = self.enum_most_time.as_mut() {
            grid.set(series, timestamp_index, most_time.0);
        }
    }

    pub fn set_calculated_reference_entry(
        &mut self,
        series: usize,
        timestamp_index: usize,
        most_time_id: ReferenceEntryId,
        different_ids_count: i32,
        statuses: HistoryEnumSet,
    ) {
        self.require_calculated();
        self.reference_entry_ids
            .set(series, timestamp_index, most_time_id.0);
        if let Some(grid) = self.reference_entry_counts.as_mut() {
            grid.set(series, timestamp_index, different_ids_count);
        }
        self.reference_entry_statuses
            .set(series, timestamp_index, statuses.0);
    }

    /// Copies all grids of one row from `source` into row `target_index`
    pub fn copy_row_from(&mut self, target_index: usize, source: &HistoryValues, source_index: usize) {
        self.decimal_values
            .set_row(target_index, source.decimal.values.row(source_index));
        if let (Some(target), Some(source_grid)) = (self.min_values.as_mut(), &source.decimal.min_values) {
            target.set_row(target_index, source_grid.row(source_index));
        }
        if let (Some(target), Some(source_grid)) = (self.max_values.as_mut(), &source.decimal.max_values) {
            target.set_row(target_index, source_grid.row(source_index));
        }
        self.enum_values
            .set_row(target_index, source.enums.values.row(source_index));
        if let (Some(target), Some(source_grid)) =
            (self.enum_most_time.as_mut(), &source.enums.most_of_the_time)
        {
            target.set_row(target_index, source_grid.row(source_index));
        }
        self.reference_entry_ids
            .set_row(target_index, source.reference_entries.ids.row(source_index));
        if let (Some(target), Some(source_grid)) = (
            self.reference_entry_counts.as_mut(),
            &source.reference_entries.different_ids_count,
        ) {
            target.set_row(target_index, source_grid.row(source_index));
        }
        self.reference_entry_statuses
            .set_row(target_index, source.reference_entries.statuses.row(source_index));
    }

    pub fn build(self) -> HistoryValues {
        HistoryValues {
            decimal: DecimalHistoryValues::new(self.decimal_values, self.min_values, self.max_values),
            enums: EnumHistoryValues::new(self.enum_values, self.enum_most_time),
            reference_entries: ReferenceEntryHistoryValues::new(
                self.reference_entry_ids,
                self.reference_entry_counts,
                self.reference_entry_statuses,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_aware_min_max() {
        assert_eq!(max_history_aware(PENDING, 3.0), 3.0);
        assert_eq!(max_history_aware(3.0, NO_VALUE), 3.0);
        assert_eq!(min_history_aware(-1.0, 4.0), -1.0);
        assert_eq!(min_history_aware(NO_VALUE, PENDING), PENDING);
        assert!(nan_if_pending_or_no_value(PENDING).is_nan());
        assert_eq!(nan_if_pending_or_no_value(2.5), 2.5);
    }

    #[test]
    fn test_builder_starts_pending() {
        let values = HistoryValuesBuilder::new(2, 1, 1, 3, RecordingType::Measured).build();
        assert_eq!(values.timestamps_count(), 3);
        assert!(values.is_pending(2));
        assert!(is_pending(values.decimal.get(1, 0)));
        assert!(values.enums.get(0, 1).is_pending());
        assert!(values.reference_entries.get_id(0, 2).is_pending());
        assert!(!values.decimal.has_min_max());
        assert!(values.enums.most_of_the_time().is_none());
    }

    #[test]
    fn test_measured_fallbacks() {
        let mut builder = HistoryValuesBuilder::new(1, 1, 1, 2, RecordingType::Measured);
        builder.set_decimal_value(0, 0, 7.0);
        builder.set_enum_value(0, 0, HistoryEnumSet(0b110));
        builder.set_reference_entry_value(0, 0, ReferenceEntryId(17), HistoryEnumSet::BOOLEAN_TRUE);
        builder.set_reference_entry_value(0, 1, ReferenceEntryId::NO_VALUE, HistoryEnumSet::NO_VALUE);
        let values = builder.build();

        assert_eq!(values.decimal.get_min(0, 0), 7.0);
        assert_eq!(values.decimal.get_max(0, 0), 7.0);
        assert_eq!(values.enums.get_ordinal_most_time(0, 0), HistoryEnumOrdinal(1));
        assert_eq!(values.reference_entries.get_different_ids_count(0, 0), 1);
        assert_eq!(
            values.reference_entries.get_different_ids_count(0, 1),
            DIFFERENT_IDS_NO_VALUE
        );
    }

    #[test]
    fn test_calculated_side_grids() {
        let mut builder = HistoryValuesBuilder::new(1, 1, 1, 1, RecordingType::Calculated);
        builder.set_calculated_decimal(0, 0, 5.0, 1.0, 9.0);
        builder.set_calculated_enum(0, 0, HistoryEnumSet(0b11), HistoryEnumOrdinal(1));
        builder.set_calculated_reference_entry(0, 0, ReferenceEntryId(4), 3, HistoryEnumSet(0b1));
        let values = builder.build();

        assert!(values.decimal.has_min_max());
        assert_eq!(values.decimal.get_min(0, 0), 1.0);
        assert_eq!(values.decimal.get_max(0, 0), 9.0);
        assert_eq!(values.enums.get_ordinal_most_time(0, 0), HistoryEnumOrdinal(1));
        assert_eq!(values.reference_entries.get_different_ids_count(0, 0), 3);
    }

    #[test]
    #[should_panic(expected = "only supported for measured values")]
    fn test_calculated_builder_rejects_measured_setter() {
        let mut builder = HistoryValuesBuilder::new(1, 0, 0, 1, RecordingType::Calculated);
        builder.set_decimal_value(0, 0, 1.0);
    }

    #[test]
    fn test_resize_keeps_rows() {
        let mut builder = HistoryValuesBuilder::new(2, 0, 0, 2, RecordingType::Measured);
        builder.set_decimal_row(0, &[1.0, 2.0]);
        builder.set_decimal_row(1, &[3.0, 4.0]);
        builder.resize_timestamps(3);
        let values = builder.build();
        assert_eq!(values.timestamps_count(), 3);
        assert_eq!(values.decimal.get(1, 1), 4.0);
        assert!(is_pending(values.decimal.get(0, 2)));

        let mut shrink = HistoryValuesBuilder::new(1, 0, 0, 4, RecordingType::Measured);
        shrink.set_decimal_value(0, 0, 8.0);
        shrink.resize_timestamps(1);
        assert_eq!(shrink.build().decimal.get(0, 0), 8.0);
    }
}
