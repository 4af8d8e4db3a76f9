//! Block header wire messages and the frame layout.
//!
//! Every block is written as
//!
//! ```text
//! [4 bytes, big-endian u32]  header length
//! [header length bytes]      protobuf-encoded ArchiveHeader
//! [payload_size_bytes bytes] block payload
//! ```
//!
//! The payload is not length-prefixed; its size is the header's
//! `payload_size_bytes`. Blocks carry no cross-references, so a stream of
//! frames can be decoded one block at a time.

use prost::Message;
use std::io::Write;

use crate::ArchiverError;

pub const DEFAULT_MAGIC: &str = "lc0ar";
pub const FORMAT_VERSION: u32 = 1;

/// Immutable format identity stamped into every block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveFormat {
    magic: String,
    version: u32,
}

impl ArchiveFormat {
    pub fn new(magic: impl Into<String>, version: u32) -> Self {
        Self { magic: magic.into(), version }
    }

    pub fn magic(&self) -> &str {
        &self.magic
    }

    pub fn version(&self) -> u32 {
        self.version
    }
}

impl Default for ArchiveFormat {
    fn default() -> Self {
        Self::new(DEFAULT_MAGIC, FORMAT_VERSION)
    }
}

/// Layout of a block payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PayloadType {
    /// Padded records back to back, as appended.
    Plain = 1,
    /// Byte-plane transposed with `transposition_page_size_bytes` as the record size.
    Transposed = 2,
}

/// Name and original (unpadded) size of one record packed into a block.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FileMetadata {
    #[prost(string, optional, tag = "1")]
    pub name: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub size_bytes: Option<u32>,
}

impl FileMetadata {
    pub fn new(name: String, size_bytes: u32) -> Self {
        Self { name: Some(name), size_bytes: Some(size_bytes) }
    }
}

/// Per-block header. Entries of `file_metadata` follow payload order; the
/// i-th record starts after the padded sizes of all entries before it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ArchiveHeader {
    #[prost(string, optional, tag = "1")]
    pub magic: Option<String>,
    #[prost(uint32, optional, tag = "2")]
    pub version: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub payload_size_bytes: Option<u32>,
    #[prost(enumeration = "PayloadType", optional, tag = "4")]
    pub payload_type: Option<i32>,
    #[prost(message, repeated, tag = "5")]
    pub file_metadata: Vec<FileMetadata>,
    #[prost(uint32, optional, tag = "6")]
    pub transposition_page_size_bytes: Option<u32>,
}

impl ArchiveHeader {
    pub fn for_block(
        format: &ArchiveFormat,
        payload_type: PayloadType,
        payload_size_bytes: u32,
        page_size: u32,
        file_metadata: Vec<FileMetadata>,
    ) -> Self {
        Self {
            magic: Some(format.magic().to_string()),
            version: Some(format.version()),
            payload_size_bytes: Some(payload_size_bytes),
            payload_type: Some(payload_type as i32),
            file_metadata,
            transposition_page_size_bytes: Some(page_size),
        }
    }
}

/// Write one frame (length prefix, header, payload) to `sink`.
///
/// Returns the number of bytes written. Nothing is rolled back if the sink
/// fails half-way through.
pub fn encode_frame<W: Write + ?Sized>(
    sink: &mut W,
    header: &ArchiveHeader,
    payload: &[u8],
) -> Result<u64, ArchiverError> {
    let mut header_bytes = Vec::with_capacity(header.encoded_len());
    header.encode(&mut header_bytes)?;
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| {
        ArchiverError::Other(format!("block header of {} bytes is too large", header_bytes.len()).into())
    })?;

    sink.write_all(&header_len.to_be_bytes())?;
    sink.write_all(&header_bytes)?;
    sink.write_all(payload)?;
    Ok(4 + header_bytes.len() as u64 + payload.len() as u64)
}
