//! Chunk model: value grids, configurations and buckets
//!
//! ```text
//! HistoryBucket
//!   descriptor: HistoryBucketDescriptor
//!   chunk: HistoryChunk
//!     configuration: HistoryConfiguration
//!     timestamps: Vec<Timestamp>
//!     values: HistoryValues (DoubleArray2 / IntArray2 grids)
//!     recording_type: Measured | Calculated
//! ```

pub mod bucket;
pub mod configuration;
pub mod enum_set;
pub mod grid;
pub mod history_chunk;
pub mod relative;
pub mod values;

pub use bucket::{find_decimal_value_at, find_enum_value_at, find_reference_entry_id_at, HistoryBucket};
pub use configuration::{
    DataSeriesId, HistoryConfiguration, HistoryConfigurationBuilder, HistoryEnum, HistoryUnit,
};
pub use enum_set::{EnumAggregationMode, HistoryEnumOrdinal, HistoryEnumSet};
pub use grid::{DoubleArray2, IntArray2};
pub use history_chunk::{HistoryChunk, HistoryChunkBuilder};
pub use relative::RelativeEncoding;
pub use values::{HistoryValues, HistoryValuesBuilder, RecordingType, ReferenceEntryId};
