//! Data series definitions of a chunk
//!
//! A `HistoryConfiguration` lists the decimal, enum and reference-entry data
//! series in column order. Two chunks can only be merged or down-sampled
//! together if their configurations are equal.

use crate::chunk::enum_set::HistoryEnumOrdinal;
use crate::storage::error::{HistoryError, HistoryResult};
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Identifies a data series across chunks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DataSeriesId(pub i32);

/// Unit of a decimal data series (e.g. "kg", "°C")
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistoryUnit(pub Option<String>);

impl HistoryUnit {
    pub fn none() -> Self {
        HistoryUnit(None)
    }

    pub fn new(unit: impl Into<String>) -> Self {
        HistoryUnit(Some(unit.into()))
    }
}

/// One option of a `HistoryEnum`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEnumValue {
    pub ordinal: HistoryEnumOrdinal,
    pub key: String,
}

/// The options of an enum data series
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEnum {
    description: String,
    values: Vec<HistoryEnumValue>,
}

impl HistoryEnum {
    /// Creates an enum with ordinals 0..n in the given order.
    ///
    /// Fails if the options do not fit into a `HistoryEnumSet`.
    pub fn new(
        description: impl Into<String>,
        keys: impl IntoIterator<Item = impl Into<String>>,
    ) -> HistoryResult<Self> {
        let description = description.into();
        let values: Vec<HistoryEnumValue> = keys
            .into_iter()
            .enumerate()
            .map(|(ordinal, key)| HistoryEnumValue {
                ordinal: HistoryEnumOrdinal(ordinal as i32),
                key: key.into(),
            })
            .collect();

        let max_values = (HistoryEnumOrdinal::MAX.0 + 1) as usize;
        if values.len() > max_values {
            return Err(HistoryError::InvalidConfiguration(format!(
                "enum <{}> has {} values but at most {} are supported",
                description,
                values.len(),
                max_values
            )));
        }
        if values.is_empty() {
            return Err(HistoryError::InvalidConfiguration(format!(
                "enum <{}> has no values",
                description
            )));
        }

        Ok(Self {
            description,
            values,
        })
    }

    /// An enum with the options "false" and "true"
    pub fn boolean(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            values: vec![
                HistoryEnumValue {
                    ordinal: HistoryEnumOrdinal::BOOLEAN_FALSE,
                    key: "false".to_string(),
                },
                HistoryEnumValue {
                    ordinal: HistoryEnumOrdinal::BOOLEAN_TRUE,
                    key: "true".to_string(),
                },
            ],
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn values(&self) -> &[HistoryEnumValue] {
        &self.values
    }

    pub fn value_for(&self, ordinal: HistoryEnumOrdinal) -> Option<&HistoryEnumValue> {
        self.values.iter().find(|v| v.ordinal == ordinal)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecimalDataSeries {
    pub id: DataSeriesId,
    pub display_name: String,
    pub unit: HistoryUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDataSeries {
    pub id: DataSeriesId,
    pub display_name: String,
    pub enum_configuration: HistoryEnum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEntryDataSeries {
    pub id: DataSeriesId,
    pub display_name: String,
    pub status_enum: Option<HistoryEnum>,
}

/// Ordered data series definitions
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryConfiguration {
    decimal_data_series: Vec<DecimalDataSeries>,
    enum_data_series: Vec<EnumDataSeries>,
    reference_entry_data_series: Vec<ReferenceEntryDataSeries>,
}

impl HistoryConfiguration {
    pub fn builder() -> HistoryConfigurationBuilder {
        HistoryConfigurationBuilder::default()
    }

    /// Configuration with decimal series only
    pub fn only_decimals(ids: &[i32], display_names: &[&str]) -> Self {
        assert_eq!(ids.len(), display_names.len(), "ids and names must match");
        let mut builder = Self::builder();
        for (id, name) in ids.iter().zip(display_names) {
            builder = builder.decimal_data_series(DataSeriesId(*id), *name, HistoryUnit::none());
        }
        builder.build()
    }

    pub fn decimal_data_series_count(&self) -> usize {
        self.decimal_data_series.len()
    }

    pub fn enum_data_series_count(&self) -> usize {
        self.enum_data_series.len()
    }

    pub fn reference_entry_data_series_count(&self) -> usize {
        self.reference_entry_data_series.len()
    }

    pub fn total_data_series_count(&self) -> usize {
        self.decimal_data_series_count()
            + self.enum_data_series_count()
            + self.reference_entry_data_series_count()
    }

    pub fn decimal_data_series(&self) -> &[DecimalDataSeries] {
        &self.decimal_data_series
    }

    pub fn enum_data_series(&self) -> &[EnumDataSeries] {
        &self.enum_data_series
    }

    pub fn reference_entry_data_series(&self) -> &[ReferenceEntryDataSeries] {
        &self.reference_entry_data_series
    }

    pub fn decimal_index_of(&self, id: DataSeriesId) -> Option<usize> {
        self.decimal_data_series.iter().position(|s| s.id == id)
    }

    pub fn enum_index_of(&self, id: DataSeriesId) -> Option<usize> {
        self.enum_data_series.iter().position(|s| s.id == id)
    }

    pub fn reference_entry_index_of(&self, id: DataSeriesId) -> Option<usize> {
        self.reference_entry_data_series
            .iter()
            .position(|s| s.id == id)
    }

    /// Human readable listing of all data series
    pub fn dump(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Decimal data series ({}):", self.decimal_data_series_count());
        for s in &self.decimal_data_series {
            let unit = s.unit.0.as_deref().unwrap_or("-");
            let _ = writeln!(out, "  {:>5}: {} [{}]", s.id.0, s.display_name, unit);
        }
        let _ = writeln!(out, "Enum data series ({}):", self.enum_data_series_count());
        for s in &self.enum_data_series {
            let _ = writeln!(
                out,
                "  {:>5}: {} ({} values)",
                s.id.0,
                s.display_name,
                s.enum_configuration.values().len()
            );
        }
        let _ = writeln!(
            out,
            "Reference entry data series ({}):",
            self.reference_entry_data_series_count()
        );
        for s in &self.reference_entry_data_series {
            let _ = writeln!(out, "  {:>5}: {}", s.id.0, s.display_name);
        }
        out
    }
}

/// Builder for `HistoryConfiguration`
#[derive(Debug, Default)]
pub struct HistoryConfigurationBuilder {
    configuration: HistoryConfiguration,
}

impl HistoryConfigurationBuilder {
    pub fn decimal_data_series(
        mut self,
        id: DataSeriesId,
        display_name: impl Into<String>,
        unit: HistoryUnit,
    ) -> Self {
        self.configuration
            .decimal_data_series
            .push(DecimalDataSeries {
                id,
                display_name: display_name.into(),
                unit,
            });
        self
    }

    pub fn enum_data_series(
        mut self,
        id: DataSeriesId,
        display_name: impl Into<String>,
        enum_configuration: HistoryEnum,
    ) -> Self {
        self.configuration.enum_data_series.push(EnumDataSeries {
            id,
            display_name: display_name.into(),
            enum_configuration,
        });
        self
    }

    pub fn reference_entry_data_series(
        mut self,
        id: DataSeriesId,
        display_name: impl Into<String>,
        status_enum: Option<HistoryEnum>,
    ) -> Self {
        self.configuration
            .reference_entry_data_series
            .push(ReferenceEntryDataSeries {
                id,
                display_name: display_name.into(),
                status_enum,
            });
        self
    }

    pub fn build(self) -> HistoryConfiguration {
        self.configuration
    }
}
