//! History storage error types
//!
//! Missing data is never an error in this crate: empty queries return empty
//! lists and gaps are represented by sentinel values. The variants below cover
//! I/O, payload decoding and configuration problems only.

use thiserror::Error;

/// Errors that can occur while storing, encoding or configuring history data
#[derive(Error, Debug)]
pub enum HistoryError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(String),

    /// Data corruption detected (checksum mismatch, invalid magic, etc.)
    #[error("Corrupt data: {0}")]
    Corruption(String),

    /// A grid payload could not be decoded
    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    /// Invalid time range (start > end)
    #[error("Invalid time range: {start} - {end}")]
    InvalidTimeRange { start: f64, end: f64 },

    /// A descriptor could not be created for the given input
    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    /// Invalid history configuration (enum too large, size mismatch)
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),
}

impl From<bincode::Error> for HistoryError {
    fn from(err: bincode::Error) -> Self {
        HistoryError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Serialization(err.to_string())
    }
}

/// Result type alias for history operations
pub type HistoryResult<T> = Result<T, HistoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HistoryError::InvalidDescriptor("start 5 not aligned".to_string());
        assert_eq!(err.to_string(), "Invalid descriptor: start 5 not aligned");

        let err = HistoryError::InvalidTimeRange {
            start: 10.0,
            end: 5.0,
        };
        assert_eq!(err.to_string(), "Invalid time range: 10 - 5");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: HistoryError = io_err.into();
        assert!(matches!(err, HistoryError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<u32>("not a number").unwrap_err();
        let err: HistoryError = json_err.into();
        assert!(matches!(err, HistoryError::Serialization(_)));
    }
}
