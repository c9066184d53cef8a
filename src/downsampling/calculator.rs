//! Aggregation of the samples that fall into one down-sampled slot
//!
//! Per series kind:
//!
//! - **decimal**: running average, min and max. Calculated children
//!   contribute their own min/max, so extremes survive every tier.
//! - **enum**: union of all sets plus a per ordinal counter for "most time"
//! - **reference entry**: the id seen most often and the number of different ids
//!
//! A slot that received only `NoValue` samples yields `NoValue`. A slot
//! that received nothing yields `Pending`.

use crate::chunk::values::{
    is_no_value, is_pending, max_history_aware, min_history_aware, DIFFERENT_IDS_NO_VALUE, DIFFERENT_IDS_PENDING,
    NO_VALUE, PENDING,
};
use crate::chunk::{HistoryEnumOrdinal, HistoryEnumSet, HistoryValuesBuilder, ReferenceEntryId};
use std::collections::BTreeMap;

/// Counts how often each ordinal has been set
#[derive(Debug, Clone, Default)]
pub struct HistoryEnumOrdinalCounter {
    counts: BTreeMap<i32, u32>,
}

impl HistoryEnumOrdinalCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts every ordinal set in `set`. Sentinels are ignored.
    pub fn add_all(&mut self, set: HistoryEnumSet) {
        for ordinal in set.set_ordinals() {
            *self.counts.entry(ordinal.value()).or_insert(0) += 1;
        }
    }

    /// The ordinal counted most often, the lowest ordinal on a tie.
    /// `NO_VALUE` if nothing has been counted.
    pub fn winner(&self) -> HistoryEnumOrdinal {
        let mut best: Option<(i32, u32)> = None;
        for (&ordinal, &count) in &self.counts {
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((ordinal, count)),
            }
        }
        best.map(|(ordinal, _)| HistoryEnumOrdinal(ordinal))
            .unwrap_or(HistoryEnumOrdinal::NO_VALUE)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn reset(&mut self) {
        self.counts.clear();
    }
}

/// Finds the reference entry that was active most of the time and
/// estimates how many different entries a slot has seen.
#[derive(Debug, Clone)]
pub struct ReferenceEntryCounter {
    counts_per_id: BTreeMap<ReferenceEntryId, u32>,
    /// Sum of the counts of calculated samples, pending for measured samples
    different_ids_count: i32,
    contains_no_value: bool,
    last_id: ReferenceEntryId,
}

impl Default for ReferenceEntryCounter {
    fn default() -> Self {
        Self {
            counts_per_id: BTreeMap::new(),
            different_ids_count: DIFFERENT_IDS_PENDING,
            contains_no_value: false,
            last_id: ReferenceEntryId::PENDING,
        }
    }
}

impl ReferenceEntryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegates to `add_from_measured` without a count and to
    /// `add_from_calculated` otherwise
    pub fn add(&mut self, id: ReferenceEntryId, different_ids_count: Option<i32>) {
        match different_ids_count {
            None => self.add_from_measured(id),
            Some(count) => self.add_from_calculated(id, count),
        }
    }

    pub fn add_from_measured(&mut self, id: ReferenceEntryId) {
        if id.is_pending() {
            return;
        }
        if id.is_no_value() {
            self.contains_no_value = true;
            return;
        }
        *self.counts_per_id.entry(id).or_insert(0) += 1;
    }

    /// `id` is the most-of-the-time id of a calculated slot, `different_ids_count`
    /// the number of ids that slot has seen.
    pub fn add_from_calculated(&mut self, id: ReferenceEntryId, different_ids_count: i32) {
        if id.is_pending() {
            return;
        }
        if id.is_no_value() {
            self.contains_no_value = true;
            return;
        }
        let different_ids_count = different_ids_count.max(0);

        // An id active at the border of two slots is counted in both
        if self.different_ids_count < 0 || self.last_id.is_pending() {
            self.different_ids_count = different_ids_count;
        } else if self.last_id == id {
            self.different_ids_count += (different_ids_count - 1).max(0);
        } else {
            self.different_ids_count += different_ids_count;
        }
        self.last_id = id;

        *self.counts_per_id.entry(id).or_insert(0) += 1;
    }

    /// The id seen most often, the smallest id on a tie
    pub fn winner_most_of_the_time(&self) -> ReferenceEntryId {
        let mut best: Option<(ReferenceEntryId, u32)> = None;
        for (&id, &count) in &self.counts_per_id {
            match best {
                Some((_, best_count)) if best_count >= count => {}
                _ => best = Some((id, count)),
            }
        }
        match best {
            Some((id, _)) => id,
            None if self.contains_no_value => ReferenceEntryId::NO_VALUE,
            None => ReferenceEntryId::PENDING,
        }
    }

    pub fn different_ids_count(&self) -> i32 {
        if self.different_ids_count != DIFFERENT_IDS_PENDING {
            return self.different_ids_count;
        }
        if self.counts_per_id.is_empty() {
            return if self.contains_no_value {
                DIFFERENT_IDS_NO_VALUE
            } else {
                DIFFERENT_IDS_PENDING
            };
        }
        self.counts_per_id.len() as i32
    }

    pub fn contains_no_value(&self) -> bool {
        self.contains_no_value
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Collects the samples of one slot for every series of a configuration
#[derive(Debug, Clone)]
pub struct DownSamplingCalculator {
    averages: Vec<f64>,
    min_values: Vec<f64>,
    max_values: Vec<f64>,
    average_counts: Vec<usize>,
    contains_no_value_decimal: Vec<bool>,

    enum_unions: Vec<HistoryEnumSet>,
    enum_counters: Vec<HistoryEnumOrdinalCounter>,
    contains_no_value_enum: Vec<bool>,

    reference_entry_counters: Vec<ReferenceEntryCounter>,
    reference_entry_statuses: Vec<HistoryEnumSet>,
}

impl DownSamplingCalculator {
    pub fn new(decimal_count: usize, enum_count: usize, reference_entry_count: usize) -> Self {
        Self {
            averages: vec![PENDING; decimal_count],
            min_values: vec![PENDING; decimal_count],
            max_values: vec![PENDING; decimal_count],
            average_counts: vec![0; decimal_count],
            contains_no_value_decimal: vec![false; decimal_count],
            enum_unions: vec![HistoryEnumSet::PENDING; enum_count],
            enum_counters: vec![HistoryEnumOrdinalCounter::new(); enum_count],
            contains_no_value_enum: vec![false; enum_count],
            reference_entry_counters: vec![ReferenceEntryCounter::new(); reference_entry_count],
            reference_entry_statuses: vec![HistoryEnumSet::PENDING; reference_entry_count],
        }
    }

    /// Adds the decimal values of one timestamp.
    ///
    /// `mins` and `maxs` are the extremes of a calculated row, `None` for
    /// measured rows.
    pub fn add_decimals_sample(&mut self, values: &[f64], mins: Option<&[f64]>, maxs: Option<&[f64]>) {
        assert_eq!(values.len(), self.averages.len(), "invalid decimal sample size");

        for (series, &value) in values.iter().enumerate() {
            if is_no_value(value) {
                self.contains_no_value_decimal[series] = true;
                continue;
            }
            if is_pending(value) {
                continue;
            }

            let count = self.average_counts[series];
            self.averages[series] = if count == 0 {
                value
            } else {
                let average = self.averages[series];
                average + (value - average) / (count + 1) as f64
            };
            self.average_counts[series] = count + 1;

            let min = mins.map(|m| m[series]).unwrap_or(value);
            let max = maxs.map(|m| m[series]).unwrap_or(value);
            self.min_values[series] = min_history_aware(self.min_values[series], min_history_aware(min, value));
            self.max_values[series] = max_history_aware(self.max_values[series], max_history_aware(max, value));
        }
    }

    /// Adds the enum sets of one timestamp (raw `i32` bit sets)
    pub fn add_enum_sample(&mut self, values: &[i32]) {
        assert_eq!(values.len(), self.enum_unions.len(), "invalid enum sample size");

        for (series, &bits) in values.iter().enumerate() {
            let set = HistoryEnumSet(bits);
            if set.is_no_value() {
                self.contains_no_value_enum[series] = true;
                continue;
            }
            if set.is_pending() {
                continue;
            }
            self.enum_unions[series] = self.enum_unions[series].union(set);
            self.enum_counters[series].add_all(set);
        }
    }

    /// Adds the reference entries of one timestamp.
    /// `different_ids_counts` is only available for calculated rows.
    pub fn add_reference_entry_sample(
        &mut self,
        ids: &[i32],
        different_ids_counts: Option<&[i32]>,
        statuses: &[i32],
    ) {
        assert_eq!(ids.len(), self.reference_entry_counters.len(), "invalid reference entry sample size");
        assert_eq!(statuses.len(), ids.len(), "invalid status sample size");

        for (series, &id) in ids.iter().enumerate() {
            let count = different_ids_counts.map(|counts| counts[series]);
            self.reference_entry_counters[series].add(ReferenceEntryId(id), count);

            let status = HistoryEnumSet(statuses[series]);
            if status.is_value() {
                self.reference_entry_statuses[series] = self.reference_entry_statuses[series].union(status);
            }
        }
    }

    fn decimal_result(&self, series: usize, value: f64) -> f64 {
        if self.average_counts[series] > 0 {
            value
        } else if self.contains_no_value_decimal[series] {
            NO_VALUE
        } else {
            PENDING
        }
    }

    pub fn average(&self, series: usize) -> f64 {
        self.decimal_result(series, self.averages[series])
    }

    pub fn min(&self, series: usize) -> f64 {
        self.decimal_result(series, self.min_values[series])
    }

    pub fn max(&self, series: usize) -> f64 {
        self.decimal_result(series, self.max_values[series])
    }

    /// Number of values that went into the average of the series
    pub fn average_count(&self, series: usize) -> usize {
        self.average_counts[series]
    }

    pub fn enum_value(&self, series: usize) -> HistoryEnumSet {
        let union = self.enum_unions[series];
        if !union.is_pending() {
            union
        } else if self.contains_no_value_enum[series] {
            HistoryEnumSet::NO_VALUE
        } else {
            HistoryEnumSet::PENDING
        }
    }

    pub fn enum_ordinal_most_time(&self, series: usize) -> HistoryEnumOrdinal {
        let counter = &self.enum_counters[series];
        if !counter.is_empty() {
            counter.winner()
        } else if self.enum_value(series).is_pending() {
            HistoryEnumOrdinal::PENDING
        } else {
            HistoryEnumOrdinal::NO_VALUE
        }
    }

    pub fn reference_entry_id(&self, series: usize) -> ReferenceEntryId {
        self.reference_entry_counters[series].winner_most_of_the_time()
    }

    pub fn reference_entry_different_ids_count(&self, series: usize) -> i32 {
        self.reference_entry_counters[series].different_ids_count()
    }

    pub fn reference_entry_status(&self, series: usize) -> HistoryEnumSet {
        let status = self.reference_entry_statuses[series];
        if !status.is_pending() {
            status
        } else if self.reference_entry_counters[series].contains_no_value() {
            HistoryEnumSet::NO_VALUE
        } else {
            HistoryEnumSet::PENDING
        }
    }

    /// Writes the aggregated values into row `timestamp_index` of a calculated builder
    pub fn write_to(&self, builder: &mut HistoryValuesBuilder, timestamp_index: usize) {
        for series in 0..self.averages.len() {
            builder.set_calculated_decimal(
                series,
                timestamp_index,
                self.average(series),
                self.min(series),
                self.max(series),
            );
        }
        for series in 0..self.enum_unions.len() {
            builder.set_calculated_enum(
                series,
                timestamp_index,
                self.enum_value(series),
                self.enum_ordinal_most_time(series),
            );
        }
        for series in 0..self.reference_entry_counters.len() {
            builder.set_calculated_reference_entry(
                series,
                timestamp_index,
                self.reference_entry_id(series),
                self.reference_entry_different_ids_count(series),
                self.reference_entry_status(series),
            );
        }
    }

    pub fn reset(&mut self) {
        self.averages.fill(PENDING);
        self.min_values.fill(PENDING);
        self.max_values.fill(PENDING);
        self.average_counts.fill(0);
        self.contains_no_value_decimal.fill(false);

        self.enum_unions.fill(HistoryEnumSet::PENDING);
        self.enum_counters.iter_mut().for_each(HistoryEnumOrdinalCounter::reset);
        self.contains_no_value_enum.fill(false);

        self.reference_entry_counters
            .iter_mut()
            .for_each(ReferenceEntryCounter::reset);
        self.reference_entry_statuses.fill(HistoryEnumSet::PENDING);
    }
}
