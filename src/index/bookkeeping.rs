//! Book-keeping - which buckets exist, per resolution tier
//!
//! Maps range → sorted set of descriptors. Earliest and latest bounds are
//! the first and last set entries, so both lookups are O(log n).
//!
//! # Persistence
//! The file storage saves the book-keeping as JSON next to the bucket files
//! so it does not have to walk the directory tree on startup.

use crate::storage::descriptor::HistoryBucketDescriptor;
use crate::storage::error::HistoryResult;
use crate::storage::sampling::HistoryBucketRange;
use crate::storage::types::TimeRange;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Tracks the stored descriptors of every tier
#[derive(Debug, Default, Clone)]
pub struct InMemoryBookKeeping {
    /// range → descriptors currently stored
    index: HashMap<HistoryBucketRange, BTreeSet<HistoryBucketDescriptor>>,
    /// Track if modified since last save
    dirty: bool,
}

/// Serialization format for JSON persistence
#[derive(Serialize, Deserialize)]
struct BookKeepingData {
    /// Version for future compatibility
    version: u32,
    descriptors: Vec<HistoryBucketDescriptor>,
}

impl InMemoryBookKeeping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from a JSON file, empty if the file does not exist
    pub fn load(path: &Path) -> HistoryResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let data: BookKeepingData = serde_json::from_reader(reader)?;

        let mut book_keeping = Self::new();
        for descriptor in data.descriptors {
            book_keeping.store(descriptor);
        }
        book_keeping.dirty = false;
        Ok(book_keeping)
    }

    /// Save to a JSON file if modified
    pub fn save(&mut self, path: &Path) -> HistoryResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let data = BookKeepingData {
            version: 1,
            descriptors: self.all().collect(),
        };
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &data)?;
        self.dirty = false;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn store(&mut self, descriptor: HistoryBucketDescriptor) {
        if self.index.entry(descriptor.range).or_default().insert(descriptor) {
            self.dirty = true;
        }
    }

    pub fn remove(&mut self, descriptor: &HistoryBucketDescriptor) -> bool {
        let removed = self
            .index
            .get_mut(&descriptor.range)
            .map(|set| set.remove(descriptor))
            .unwrap_or(false);
        if removed {
            self.dirty = true;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.index.is_empty() {
            self.dirty = true;
        }
        self.index.clear();
    }

    pub fn contains(&self, descriptor: &HistoryBucketDescriptor) -> bool {
        self.index
            .get(&descriptor.range)
            .map(|set| set.contains(descriptor))
            .unwrap_or(false)
    }

    pub fn earliest_bound(&self, range: HistoryBucketRange) -> Option<HistoryBucketDescriptor> {
        self.index.get(&range).and_then(|set| set.first().copied())
    }

    pub fn latest_bound(&self, range: HistoryBucketRange) -> Option<HistoryBucketDescriptor> {
        self.index.get(&range).and_then(|set| set.last().copied())
    }

    /// From the start of the earliest to the end of the latest bucket
    pub fn time_range(&self, range: HistoryBucketRange) -> Option<TimeRange> {
        let earliest = self.earliest_bound(range)?;
        let latest = self.latest_bound(range)?;
        Some(TimeRange::new(earliest.start(), latest.end()))
    }

    /// Stored descriptors of one tier, oldest first
    pub fn descriptors(&self, range: HistoryBucketRange) -> impl Iterator<Item = HistoryBucketDescriptor> + '_ {
        self.index.get(&range).into_iter().flatten().copied()
    }

    /// Stored descriptors of the tier of `descriptor` up to and including it
    pub fn descriptors_until(&self, descriptor: &HistoryBucketDescriptor) -> Vec<HistoryBucketDescriptor> {
        self.index
            .get(&descriptor.range)
            .map(|set| set.range(..=*descriptor).copied().collect())
            .unwrap_or_default()
    }

    /// Stored descriptors of one tier whose buckets touch [start, end]
    pub fn descriptors_in(
        &self,
        range: HistoryBucketRange,
        start: f64,
        end: f64,
    ) -> Vec<HistoryBucketDescriptor> {
        if start > end {
            return Vec::new();
        }
        let from = HistoryBucketDescriptor::for_timestamp(start, range);
        let to = HistoryBucketDescriptor::for_timestamp(end, range);
        self.index
            .get(&range)
            .map(|set| set.range(from..=to).copied().collect())
            .unwrap_or_default()
    }

    /// All descriptors of all tiers, finest tier first
    pub fn all(&self) -> impl Iterator<Item = HistoryBucketDescriptor> + '_ {
        HistoryBucketRange::ALL
            .into_iter()
            .flat_map(move |range| self.descriptors(range))
    }

    pub fn count(&self, range: HistoryBucketRange) -> usize {
        self.index.get(&range).map(BTreeSet::len).unwrap_or(0)
    }

    pub fn total_count(&self) -> usize {
        self.index.values().map(BTreeSet::len).sum()
    }
}
