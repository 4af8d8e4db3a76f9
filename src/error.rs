use std::path::PathBuf;

use thiserror::Error;

/// The primary error type for all operations in the `lc0ar` crate.
#[derive(Debug, Error)]
pub enum ArchiverError {
    /// An I/O error occurred, typically while reading an input or writing the archive.
    /// Includes the path where the error happened (empty when unknown).
    #[error("I/O error on path '{}': {}", .path.display(), .source)]
    Io { source: std::io::Error, path: PathBuf },

    /// A configuration value is unusable (zero page size, zero workers, ...).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A single record does not fit the 32-bit size field of the block header.
    #[error("Record '{name}' is too large for a block ({size} bytes)")]
    RecordTooLarge { name: String, size: usize },

    /// A block payload does not fit the 32-bit payload size field.
    #[error("Block payload of {0} bytes exceeds the header size field")]
    PayloadTooLarge(usize),

    /// The block header could not be serialized.
    #[error("Failed to encode block header: {0}")]
    HeaderEncode(#[from] prost::EncodeError),

    /// A previous flush failed; the archive may end in a torn frame and must not grow further.
    #[error("Archive writer is unusable after an earlier write failure")]
    Poisoned,

    /// A wrapper for any other error that doesn't fit the specific variants.
    #[error("An unexpected error occurred: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl ArchiverError {
    /// Attach a path to an I/O error.
    pub fn io(source: std::io::Error, path: impl Into<PathBuf>) -> Self {
        ArchiverError::Io { source, path: path.into() }
    }
}

// Generic IO error conversion that doesn't require a path
impl From<std::io::Error> for ArchiverError {
    fn from(err: std::io::Error) -> Self {
        ArchiverError::Io { source: err, path: PathBuf::new() }
    }
}
