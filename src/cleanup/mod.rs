//! Retention of the history
//!
//! - **size**: `MaxHistorySizeConfiguration`, buckets kept per tier
//! - **service**: `HistoryCleanupService`, deletes the oldest buckets

pub mod service;
pub mod size;

pub use service::HistoryCleanupService;
pub use size::MaxHistorySizeConfiguration;
