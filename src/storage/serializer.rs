//! Bucket encodings for the file storage
//!
//! Two formats are supported:
//!
//! - **json**: `serde_json`, readable, used for debugging
//! - **compressed**: a small binary frame around an LZ4 compressed
//!   `bincode` payload
//!
//! ```text
//! Compressed frame:
//!   [magic "CHHB": 4][version: u16 LE][crc32 of payload: u32 LE][payload]
//!   payload = lz4(size-prepended, bincode(HistoryBucket))
//! ```

use crate::chunk::HistoryBucket;
use crate::storage::error::{HistoryError, HistoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Magic bytes for compressed bucket identification
const BUCKET_MAGIC: [u8; 4] = *b"CHHB";

/// Current compressed format version
const BUCKET_VERSION: u16 = 1;

/// magic + version + checksum
const FRAME_HEADER_SIZE: usize = 10;

/// Converts buckets to bytes and back
pub trait BucketSerializer: Send + Sync {
    fn serialize(&self, bucket: &HistoryBucket) -> HistoryResult<Vec<u8>>;

    fn deserialize(&self, bytes: &[u8]) -> HistoryResult<HistoryBucket>;

    /// File extension (without dot) of files written with this serializer
    fn extension(&self) -> &'static str;
}

/// Selects a serializer in the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializerKind {
    Json,
    #[default]
    Compressed,
}

impl SerializerKind {
    pub fn create(&self) -> Box<dyn BucketSerializer> {
        match self {
            SerializerKind::Json => Box::new(JsonBucketSerializer),
            SerializerKind::Compressed => Box::new(CompressedBucketSerializer),
        }
    }
}

impl fmt::Display for SerializerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializerKind::Json => write!(f, "json"),
            SerializerKind::Compressed => write!(f, "compressed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBucketSerializer;

impl BucketSerializer for JsonBucketSerializer {
    fn serialize(&self, bucket: &HistoryBucket) -> HistoryResult<Vec<u8>> {
        Ok(serde_json::to_vec(bucket)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> HistoryResult<HistoryBucket> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompressedBucketSerializer;

impl BucketSerializer for CompressedBucketSerializer {
    fn serialize(&self, bucket: &HistoryBucket) -> HistoryResult<Vec<u8>> {
        let serialized = bincode::serialize(bucket)?;
        let payload = lz4_flex::compress_prepend_size(&serialized);
        let checksum = crc32fast::hash(&payload);

        let mut out = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        out.extend_from_slice(&BUCKET_MAGIC);
        out.extend_from_slice(&BUCKET_VERSION.to_le_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&payload);
        Ok(out)
    }

    fn deserialize(&self, bytes: &[u8]) -> HistoryResult<HistoryBucket> {
        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(HistoryError::Corruption(format!(
                "Bucket frame too short: {} bytes",
                bytes.len()
            )));
        }
        if bytes[0..4] != BUCKET_MAGIC {
            return Err(HistoryError::Corruption(format!(
                "Invalid magic: {:?}",
                &bytes[0..4]
            )));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version > BUCKET_VERSION {
            return Err(HistoryError::Corruption(format!(
                "Unsupported version: {}",
                version
            )));
        }

        let stored_checksum = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let payload = &bytes[FRAME_HEADER_SIZE..];
        let computed_checksum = crc32fast::hash(payload);
        if stored_checksum != computed_checksum {
            return Err(HistoryError::Corruption(format!(
                "Bucket checksum mismatch: stored={}, computed={}",
                stored_checksum, computed_checksum
            )));
        }

        let decompressed = lz4_flex::decompress_size_prepended(payload)
            .map_err(|e| HistoryError::Compression(format!("LZ4 decompression failed: {}", e)))?;
        Ok(bincode::deserialize(&decompressed)?)
    }

    fn extension(&self) -> &'static str {
        "bin"
    }
}
