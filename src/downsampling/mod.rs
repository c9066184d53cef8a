//! Down-sampling of the history
//!
//! - **calculator**: aggregation of the samples of one slot
//! - **calculations**: builds a calculated bucket from its children
//! - **service**: job planning and execution against a storage
//! - **dirty**: collects the ranges that have to be recalculated
//!
//! ```text
//! store_without_cache ─→ observer ─→ DownSamplingDirtyRangesCollector
//!                                              │
//!            calculate_down_sampling_if_required (finest tier first)
//!                                              ↓
//!   create_jobs → get_all(children) → calculate_down_sampled → store_without_cache
//! ```

pub mod calculations;
pub mod calculator;
pub mod dirty;
pub mod service;

pub use calculations::{calculate_down_sampled, calculate_time_stamps};
pub use calculator::{DownSamplingCalculator, HistoryEnumOrdinalCounter, ReferenceEntryCounter};
pub use dirty::DownSamplingDirtyRangesCollector;
pub use service::{create_jobs, DownSamplingJob, DownSamplingService, RefreshRange};
