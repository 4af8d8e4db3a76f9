//! Common utilities and types module.
// Shared structs and constants used by the scanner, the writer and the pipeline.

/// Default page (record) size in bytes, the size of one training record.
pub const DEFAULT_PAGE_SIZE: u32 = 8356;

/// A block is flushed once its padded payload reaches this many bytes.
pub const DEFAULT_BLOCK_THRESHOLD: usize = 512 * 1024 * 1024; // 512 MiB

/// Default edge length of the square tiles the transpose is split into.
pub const DEFAULT_TILE_SIZE: usize = 256;

/// One logical input file: its name and its fully buffered content.
///
/// Produced once per input by the scanner and never mutated afterwards.
/// Names are not unique across an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub content: Vec<u8>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self { name: name.into(), content }
    }
}

/// Round `len` up to the next multiple of `page_size`.
///
/// Returns `None` when `page_size` is zero or the result overflows.
pub fn padded_len(len: usize, page_size: usize) -> Option<usize> {
    let rem = len.checked_rem(page_size)?;
    if rem == 0 {
        Some(len)
    } else {
        len.checked_add(page_size - rem)
    }
}
