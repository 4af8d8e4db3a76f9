use crate::archive::header::FileMetadata;
use crate::common::{padded_len, FileRecord};
use crate::ArchiverError;

/// In-progress block: padded record payload plus one metadata entry per record.
///
/// `payload.len()` is always a multiple of the page size, and the i-th
/// metadata entry describes the i-th padded segment of the payload.
#[derive(Debug, Default)]
pub struct Block {
    payload: Vec<u8>,
    metadata: Vec<FileMetadata>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    /// Size `content_len` occupies once padded to `page_size`.
    pub fn padded_size(content_len: usize, page_size: usize) -> Result<usize, ArchiverError> {
        if page_size == 0 {
            return Err(ArchiverError::InvalidConfig("page size must be non-zero".into()));
        }
        padded_len(content_len, page_size)
            .ok_or_else(|| ArchiverError::InvalidConfig(format!("record of {content_len} bytes overflows padding")))
    }

    /// Append `record`, zero-padded to a whole number of pages.
    pub fn append(&mut self, record: FileRecord, page_size: usize) -> Result<(), ArchiverError> {
        let FileRecord { name, content } = record;
        let padded = Self::padded_size(content.len(), page_size)?;
        if padded > u32::MAX as usize {
            return Err(ArchiverError::RecordTooLarge { name, size: content.len() });
        }

        // size fits: content.len() <= padded <= u32::MAX
        let size_bytes = content.len() as u32;
        self.payload.reserve(padded);
        self.payload.extend_from_slice(&content);
        self.payload.resize(self.payload.len() + (padded - content.len()), 0);
        self.metadata.push(FileMetadata::new(name, size_bytes));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty() && self.metadata.is_empty()
    }

    pub fn file_count(&self) -> usize {
        self.metadata.len()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn metadata(&self) -> &[FileMetadata] {
        &self.metadata
    }

    pub fn into_parts(self) -> (Vec<u8>, Vec<FileMetadata>) {
        (self.payload, self.metadata)
    }
}
