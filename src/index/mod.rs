//! Index structures of the history storage
//!
//! - **InMemoryBookKeeping**: sorted descriptor sets per resolution tier for
//!   O(log n) earliest/latest lookups and range scans
//!
//! ```text
//! query(start, end, OneMinute)
//!        ↓
//! BookKeeping: descriptors of OneMinute touching [start, end] → [d7, d8, d9]
//!        ↓
//! Storage: load only these buckets
//! ```

mod bookkeeping;

pub use bookkeeping::InMemoryBookKeeping;
