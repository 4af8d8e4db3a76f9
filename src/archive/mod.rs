//! # Archive Writer
//!
//! This module turns an ordered stream of [`FileRecord`]s into a sequence of
//! self-describing blocks on a compressed sink.
//!
//! Records are appended to an in-memory [`Block`], each padded to a whole
//! number of pages. Once the padded payload reaches the block threshold (or on
//! [`ArchiveWriter::close`]) the block is detached, its payload transposed into
//! byte planes, and a frame (length prefix, header, payload) is written.
//!
//! The writer is single-owned: one thread drives `write`, `flush` and `close`,
//! so a `write` that triggers a flush simply blocks until the frame is out.

pub mod block;
pub mod header;

pub use block::Block;
pub use header::{encode_frame, ArchiveFormat, ArchiveHeader, FileMetadata, PayloadType};

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use tracing::{debug, error, info};

use crate::common::{FileRecord, DEFAULT_BLOCK_THRESHOLD, DEFAULT_PAGE_SIZE};
use crate::transpose::{transpose_with, TransposeOptions};
use crate::ArchiverError;

/// Destination of archive frames.
///
/// `finish` flushes whatever the sink buffers and hands back the inner writer.
pub trait FrameSink: Write {
    type Inner;

    fn finish(self) -> io::Result<Self::Inner>;
}

impl<W: Write> FrameSink for zstd::stream::write::Encoder<'static, W> {
    type Inner = W;

    fn finish(self) -> io::Result<W> {
        let mut inner = zstd::stream::write::Encoder::finish(self)?;
        inner.flush()?;
        Ok(inner)
    }
}

impl FrameSink for Vec<u8> {
    type Inner = Vec<u8>;

    fn finish(self) -> io::Result<Vec<u8>> {
        Ok(self)
    }
}

/// How [`ArchiveFileWriter::create`] opens an existing archive file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Replace any existing content.
    Truncate,
    /// Add a new compressed stream after the existing one.
    Append,
}

/// Holds all configuration options for an archive writer.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Record stride; every record is zero-padded to a multiple of it.
    pub page_size: u32,
    /// Padded payload size at which a block is flushed.
    pub block_threshold: usize,
    /// Payload layout written to every block.
    pub layout: PayloadType,
    pub transpose: TransposeOptions,
    /// zstd level of the file sink opened by [`ArchiveFileWriter::create`].
    pub compression_level: i32,
    /// zstd worker threads for the file sink. `0` or `1` keeps it single-threaded.
    pub compression_threads: u32,
    pub format: ArchiveFormat,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            block_threshold: DEFAULT_BLOCK_THRESHOLD,
            layout: PayloadType::Transposed,
            transpose: TransposeOptions::default(),
            compression_level: 3,
            compression_threads: 0,
            format: ArchiveFormat::default(),
        }
    }
}

impl WriterOptions {
    pub fn validate(&self) -> Result<(), ArchiverError> {
        if self.page_size == 0 {
            return Err(ArchiverError::InvalidConfig("page size must be non-zero".into()));
        }
        if self.block_threshold == 0 {
            return Err(ArchiverError::InvalidConfig("block threshold must be non-zero".into()));
        }
        self.transpose.validate()
    }
}

/// Archive writer over a zstd-compressed file.
pub type ArchiveFileWriter = ArchiveWriter<zstd::stream::write::Encoder<'static, BufWriter<File>>>;

/// A writer responsible for constructing a block-structured archive.
pub struct ArchiveWriter<S: FrameSink> {
    sink: S,
    options: WriterOptions,
    block: Block,
    blocks_written: u64,
    poisoned: bool,
    /// Largest payload a header can describe.
    payload_limit: usize,
}

impl ArchiveFileWriter {
    /// Opens `path` and wraps it in a buffered zstd stream.
    ///
    /// Options are validated before the file is touched.
    pub fn create(path: impl AsRef<Path>, mode: OpenMode, options: WriterOptions) -> Result<Self, ArchiverError> {
        let path = path.as_ref();
        options.validate()?;

        let mut open = OpenOptions::new();
        open.create(true).write(true);
        match mode {
            OpenMode::Truncate => open.truncate(true),
            OpenMode::Append => open.append(true),
        };
        let file = open.open(path).map_err(|e| ArchiverError::io(e, path))?;

        // use 8 MiB buffer to reduce syscall overhead during block writes
        let writer = BufWriter::with_capacity(8 * 1024 * 1024, file);
        let mut encoder = zstd::stream::write::Encoder::new(writer, options.compression_level)
            .map_err(|e| ArchiverError::io(e, path))?;
        if options.compression_threads > 1 {
            encoder.multithread(options.compression_threads)?;
        }
        debug!("opened archive {} ({:?})", path.display(), mode);
        Self::new(encoder, options)
    }
}

impl<S: FrameSink> ArchiveWriter<S> {
    /// Creates a new `ArchiveWriter` over `sink`.
    pub fn new(sink: S, options: WriterOptions) -> Result<Self, ArchiverError> {
        options.validate()?;
        Ok(Self {
            sink,
            options,
            block: Block::new(),
            blocks_written: 0,
            poisoned: false,
            payload_limit: u32::MAX as usize,
        })
    }

    /// Number of frames emitted so far.
    pub fn blocks_written(&self) -> u64 {
        self.blocks_written
    }

    /// Records sitting in the current, not yet flushed block.
    pub fn pending_files(&self) -> usize {
        self.block.file_count()
    }

    pub fn pending_bytes(&self) -> usize {
        self.block.len()
    }

    /// Appends `record` to the current block, flushing once the threshold is reached.
    pub fn write(&mut self, record: FileRecord) -> Result<(), ArchiverError> {
        self.check_usable()?;
        let page_size = self.options.page_size as usize;
        let padded = Block::padded_size(record.content.len(), page_size)?;
        if padded > self.payload_limit {
            return Err(ArchiverError::RecordTooLarge { name: record.name, size: record.content.len() });
        }

        // Keep payload_size_bytes within u32 by closing the block early.
        if !self.block.is_empty() && self.block.len() + padded > self.payload_limit {
            self.flush()?;
        }

        self.block.append(record, page_size)?;
        if self.block.len() >= self.options.block_threshold {
            self.flush()?;
        }
        Ok(())
    }

    /// Detaches the current block, installs an empty one and writes the detached block out.
    ///
    /// Runs even for an empty block, producing a frame with no records.
    pub fn flush(&mut self) -> Result<(), ArchiverError> {
        self.check_usable()?;
        let block = std::mem::take(&mut self.block);
        if let Err(e) = self.write_block(block) {
            error!("failed to write block {}: {}", self.blocks_written, e);
            self.poisoned = true;
            return Err(e);
        }
        Ok(())
    }

    /// Flushes the last block (even an empty one) and finishes the sink.
    pub fn close(mut self) -> Result<S::Inner, ArchiverError> {
        self.flush()?;
        let ArchiveWriter { sink, .. } = self;
        Ok(sink.finish()?)
    }

    fn check_usable(&self) -> Result<(), ArchiverError> {
        if self.poisoned {
            Err(ArchiverError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn write_block(&mut self, block: Block) -> Result<(), ArchiverError> {
        let page_size = self.options.page_size;
        let file_count = block.file_count();
        let (payload, metadata) = block.into_parts();

        let payload = match self.options.layout {
            PayloadType::Transposed => transpose_with(&payload, page_size as usize, &self.options.transpose)?,
            PayloadType::Plain => payload,
        };
        let payload_size = u32::try_from(payload.len()).map_err(|_| ArchiverError::PayloadTooLarge(payload.len()))?;

        let header = ArchiveHeader::for_block(&self.options.format, self.options.layout, payload_size, page_size, metadata);
        let written = encode_frame(&mut self.sink, &header, &payload)?;

        info!(
            "block {}: {} files, {} payload bytes, {} bytes framed",
            self.blocks_written, file_count, payload_size, written
        );
        self.blocks_written += 1;
        Ok(())
    }
}
