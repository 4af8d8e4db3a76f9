//! Pipeline wiring: input scanner → single consumer thread → archive writer.
//!
//! The scanner fans out over many threads, but the writer has exactly one
//! owner: a consumer thread drains the scanner output in arrival order and
//! feeds every record to [`ArchiveWriter::write`]. The calling thread queues
//! the inputs and then closes the scanner, which ends the consumer's stream.

use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::thread;
use tracing::{error, info};

use crate::archive::{ArchiveFileWriter, ArchiveWriter, FrameSink, OpenMode, WriterOptions};
use crate::common::FileRecord;
use crate::scanner::{Scanner, ScannerConfig};
use crate::ArchiverError;

/// Everything `lc0ar add` needs besides the paths.
#[derive(Debug, Clone)]
pub struct AddOptions {
    pub scanner: ScannerConfig,
    pub writer: WriterOptions,
    pub mode: OpenMode,
    /// Print one `[n] name (bytes)` line per record to stdout.
    pub progress: bool,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            writer: WriterOptions::default(),
            mode: OpenMode::Truncate,
            progress: false,
        }
    }
}

/// Totals of one pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub records: u64,
    /// Unpadded content bytes written.
    pub bytes: u64,
    pub blocks: u64,
    /// Scan items dropped because of errors.
    pub skipped: u64,
}

/// Scan `inputs` and write every record into the archive at `archive`.
pub fn run_add(archive: &Path, inputs: &[PathBuf], opts: &AddOptions) -> Result<PipelineSummary, ArchiverError> {
    opts.scanner.validate()?;
    let writer = ArchiveFileWriter::create(archive, opts.mode, opts.writer.clone())?;
    let (summary, _file) = run_pipeline(writer, inputs, opts.scanner, opts.progress)?;
    info!(
        "{}: {} records, {} bytes in {} blocks ({} skipped)",
        archive.display(),
        summary.records,
        summary.bytes,
        summary.blocks,
        summary.skipped
    );
    Ok(summary)
}

/// Scan `inputs` into `writer`, close it and return the finished sink.
pub fn run_pipeline<S>(
    writer: ArchiveWriter<S>,
    inputs: &[PathBuf],
    config: ScannerConfig,
    progress: bool,
) -> Result<(PipelineSummary, S::Inner), ArchiverError>
where
    S: FrameSink + Send,
    S::Inner: Send,
{
    let scanner = Scanner::new(config)?;
    let records = scanner.output();

    thread::scope(|s| {
        let consumer = s.spawn(move || consume(writer, records, progress));

        for input in inputs {
            scanner.add_input(input);
        }
        let stats = scanner.close();

        let (mut summary, inner) = consumer
            .join()
            .map_err(|_| ArchiverError::Other("archive writer thread panicked".into()))??;
        summary.skipped = stats.skipped;
        Ok((summary, inner))
    })
}

fn consume<S: FrameSink>(
    mut writer: ArchiveWriter<S>,
    records: Receiver<FileRecord>,
    progress: bool,
) -> Result<(PipelineSummary, S::Inner), ArchiverError> {
    let mut summary = PipelineSummary::default();
    let mut failure = None;

    for record in records.iter() {
        // After a failure keep draining so the scanner can shut down.
        if failure.is_some() {
            continue;
        }
        if progress {
            println!("[{}] {} ({})", summary.records, record.name, record.content.len());
        }
        summary.records += 1;
        summary.bytes += record.content.len() as u64;
        if let Err(e) = writer.write(record) {
            error!("error writing file to archive: {}", e);
            failure = Some(e);
        }
    }
    if let Some(e) = failure {
        return Err(e);
    }

    summary.blocks = writer.blocks_written() + 1;
    let inner = writer.close()?;
    Ok((summary, inner))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveHeader;
    use crate::transpose::TransposeOptions;
    use prost::Message;
    use std::fs;
    use tempfile::tempdir;

    fn names_in(mut bytes: &[u8]) -> Vec<String> {
        let mut names = Vec::new();
        while !bytes.is_empty() {
            let header_len = u32::from_be_bytes(bytes[..4].try_into().unwrap()) as usize;
            let header = ArchiveHeader::decode(&bytes[4..4 + header_len]).unwrap();
            names.extend(header.file_metadata.iter().filter_map(|m| m.name.clone()));
            bytes = &bytes[4 + header_len + header.payload_size_bytes.unwrap() as usize..];
        }
        names
    }

    #[test]
    fn test_pipeline_writes_every_scanned_record() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        for i in 0..20 {
            fs::write(dir.path().join(format!("g{i}.bin")), vec![i as u8; 100 + i])?;
        }
        let options = WriterOptions {
            page_size: 64,
            block_threshold: 1024,
            transpose: TransposeOptions { tile_size: 16, workers: 2 },
            ..WriterOptions::default()
        };
        let writer = ArchiveWriter::new(Vec::new(), options)?;
        let config = ScannerConfig { expansion_workers: 2, decompression_workers: 1, output_capacity: Some(1) };

        let (summary, bytes) = run_pipeline(writer, &[dir.path().to_path_buf()], config, false)?;

        assert_eq!(summary.records, 20);
        assert_eq!(summary.bytes, (0..20).map(|i| 100 + i as u64).sum::<u64>());
        assert_eq!(summary.skipped, 0);
        assert!(summary.blocks > 1);

        let mut names = names_in(&bytes);
        names.sort();
        let mut expected: Vec<_> = (0..20)
            .map(|i| dir.path().join(format!("g{i}.bin")).to_string_lossy().into_owned())
            .collect();
        expected.sort();
        assert_eq!(names, expected);
        Ok(())
    }

    #[test]
    fn test_pipeline_with_rendezvous_queues_and_gzip_inputs() -> Result<(), Box<dyn std::error::Error>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let dir = tempdir()?;
        for i in 0..30u8 {
            fs::write(dir.path().join(format!("p{i}.bin")), vec![i; 40])?;
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&[i; 70])?;
            fs::write(dir.path().join(format!("z{i}.bin.gz")), enc.finish()?)?;
        }
        let options = WriterOptions {
            page_size: 32,
            block_threshold: 512,
            transpose: TransposeOptions { tile_size: 8, workers: 2 },
            ..WriterOptions::default()
        };
        let writer = ArchiveWriter::new(Vec::new(), options)?;
        let config = ScannerConfig { expansion_workers: 4, decompression_workers: 1, output_capacity: Some(0) };

        let (summary, bytes) = run_pipeline(writer, &[dir.path().to_path_buf()], config, false)?;

        assert_eq!(summary.records, 60);
        assert_eq!(summary.bytes, 30 * 40 + 30 * 70);
        assert_eq!(summary.skipped, 0);
        assert_eq!(names_in(&bytes).len(), 60);
        Ok(())
    }

    #[test]
    fn test_run_add_rejects_bad_page_size_without_creating_archive() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("out.lc0ar");
        let mut opts = AddOptions::default();
        opts.writer.page_size = 0;
        let res = run_add(&archive, &[dir.path().to_path_buf()], &opts);
        assert!(matches!(res, Err(ArchiverError::InvalidConfig(_))));
        assert!(!archive.exists());
    }
}
