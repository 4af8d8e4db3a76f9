//! # Input Scanner
//!
//! Expands input paths into a flat, unordered stream of [`FileRecord`]s.
//!
//! ```text
//! add_input ──► path queue ──► expansion workers ──► output
//!                   ▲               │    │
//!                   └─ dir entries ─┘    └─► gunzip queue ──► decompression workers ──► output
//! ```
//!
//! - Directories are listed one level deep; every non-directory child goes
//!   back onto the path queue.
//! - `*.tar` files are iterated; `*.gz` entries go to the decompression pool,
//!   everything else is emitted under its entry name.
//! - `*.gz` files are read whole and sent to the decompression pool, which
//!   strips the `.gz` suffix from the name.
//! - Any other file is emitted under its path.
//!
//! Failures (unreadable paths, broken tar or gzip streams) are logged and only
//! the affected unit of work is dropped.
//!
//! The path queue is unbounded and a pending-work counter tells
//! [`Scanner::close`] when directory fan-out has finished. The gunzip queue
//! holds one buffer per decompression worker; decompressors only ever wait on
//! the output, so it cannot close a cycle. With the default unbounded output,
//! `close` can therefore run before anyone drains [`Scanner::output`]. A
//! bounded output (`output_capacity: Some(_)`) caps memory but needs a
//! consumer draining concurrently, otherwise `close` blocks forever.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

use crate::common::FileRecord;
use crate::ArchiverError;

/// Worker pool sizes and output buffering of a [`Scanner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScannerConfig {
    /// Threads expanding paths (stat, directory listing, tar iteration, reads).
    pub expansion_workers: usize,
    /// Threads inflating gzip content.
    pub decompression_workers: usize,
    /// `None` for an unbounded output queue; `Some(0)` is a rendezvous hand-off.
    pub output_capacity: Option<usize>,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            expansion_workers: 10,
            decompression_workers: 5,
            output_capacity: None,
        }
    }
}

impl ScannerConfig {
    pub fn validate(&self) -> Result<(), ArchiverError> {
        if self.expansion_workers == 0 || self.decompression_workers == 0 {
            return Err(ArchiverError::InvalidConfig("scanner needs at least one worker in each pool".into()));
        }
        Ok(())
    }
}

/// Counters reported by [`Scanner::close`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    /// Records delivered to the output queue.
    pub records: u64,
    /// Units of work dropped because of an error.
    pub skipped: u64,
}

enum Job {
    Expand(PathBuf),
    Shutdown,
}

struct Compressed {
    name: String,
    content: Vec<u8>,
}

/// Number of paths queued or being expanded.
#[derive(Default)]
struct Pending {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Pending {
    fn add(&self) {
        *self.count.lock().unwrap_or_else(|e| e.into_inner()) += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(|e| e.into_inner());
        while *count > 0 {
            count = self.idle.wait(count).unwrap_or_else(|e| e.into_inner());
        }
    }
}

#[derive(Default)]
struct Counters {
    records: AtomicU64,
    skipped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ScanStats {
        ScanStats {
            records: self.records.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }
}

/// Handle for pushing paths onto the shared path queue.
#[derive(Clone)]
struct PathQueue {
    jobs: Sender<Job>,
    pending: Arc<Pending>,
}

impl PathQueue {
    fn push(&self, path: PathBuf) {
        self.pending.add();
        if self.jobs.send(Job::Expand(path)).is_err() {
            self.pending.done();
        }
    }
}

/// Everything an expansion worker needs to emit its results.
#[derive(Clone)]
struct Expander {
    queue: PathQueue,
    gunzip: Sender<Compressed>,
    output: Sender<FileRecord>,
    counters: Arc<Counters>,
}

impl Expander {
    fn run(self, jobs: Receiver<Job>) {
        for job in jobs.iter() {
            match job {
                Job::Expand(path) => {
                    if let Err(e) = self.expand(&path) {
                        self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                        warn!("skipping {}: {}", path.display(), e);
                    }
                    self.queue.pending.done();
                }
                Job::Shutdown => break,
            }
        }
    }

    fn expand(&self, path: &Path) -> Result<(), ArchiverError> {
        let meta = fs::metadata(path).map_err(|e| ArchiverError::io(e, path))?;
        if meta.is_dir() {
            return self.expand_directory(path);
        }

        let name = path.to_string_lossy().into_owned();
        if name.ends_with(".tar") {
            self.expand_tar(path)
        } else if name.ends_with(".gz") {
            let content = fs::read(path).map_err(|e| ArchiverError::io(e, path))?;
            self.send_compressed(name, content);
            Ok(())
        } else {
            let content = fs::read(path).map_err(|e| ArchiverError::io(e, path))?;
            emit(&self.output, &self.counters, FileRecord::new(name, content));
            Ok(())
        }
    }

    fn expand_directory(&self, dir: &Path) -> Result<(), ArchiverError> {
        let entries = fs::read_dir(dir).map_err(|e| ArchiverError::io(e, dir))?;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                    warn!("skipping entry of {}: {}", dir.display(), e);
                    continue;
                }
            };
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                self.queue.push(entry.path());
            }
        }
        Ok(())
    }

    fn expand_tar(&self, path: &Path) -> Result<(), ArchiverError> {
        let file = File::open(path).map_err(|e| ArchiverError::io(e, path))?;
        let tar_len = file.metadata().map_err(|e| ArchiverError::io(e, path))?.len();
        let mut archive = tar::Archive::new(BufReader::new(file));
        let tar_err = |e: std::io::Error| ArchiverError::io(e, path);

        for entry in archive.entries().map_err(tar_err)? {
            let mut entry = entry.map_err(tar_err)?;
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let name = entry.path().map_err(tar_err)?.to_string_lossy().into_owned();
            // the declared size is untrusted; a short entry surfaces as UnexpectedEof
            let mut content = Vec::with_capacity(entry.size().min(tar_len) as usize);
            entry.read_to_end(&mut content).map_err(tar_err)?;
            if content.len() as u64 != entry.size() {
                return Err(tar_err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("entry '{}' declares {} bytes, found {}", name, entry.size(), content.len()),
                )));
            }

            if name.ends_with(".gz") {
                self.send_compressed(name, content);
            } else {
                emit(&self.output, &self.counters, FileRecord::new(name, content));
            }
        }
        Ok(())
    }

    fn send_compressed(&self, name: String, content: Vec<u8>) {
        if self.gunzip.send(Compressed { name, content }).is_err() {
            self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            error!("decompression pool is gone, dropping gzip input");
        }
    }
}

fn run_decompression(jobs: Receiver<Compressed>, output: Sender<FileRecord>, counters: Arc<Counters>) {
    for Compressed { name, content } in jobs.iter() {
        let mut decoded = Vec::with_capacity(content.len());
        if let Err(e) = MultiGzDecoder::new(content.as_slice()).read_to_end(&mut decoded) {
            counters.skipped.fetch_add(1, Ordering::Relaxed);
            warn!("skipping {}: gzip: {}", name, e);
            continue;
        }
        let name = name.strip_suffix(".gz").map(str::to_string).unwrap_or(name);
        emit(&output, &counters, FileRecord::new(name, decoded));
    }
}

fn emit(output: &Sender<FileRecord>, counters: &Counters, record: FileRecord) {
    debug!("scanned {} ({} bytes)", record.name, record.content.len());
    if output.send(record).is_ok() {
        counters.records.fetch_add(1, Ordering::Relaxed);
    } else {
        counters.skipped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Concurrent expansion of input paths into [`FileRecord`]s.
pub struct Scanner {
    queue: PathQueue,
    output: Receiver<FileRecord>,
    counters: Arc<Counters>,
    expanders: Vec<JoinHandle<()>>,
    decompressors: Vec<JoinHandle<()>>,
}

impl Scanner {
    /// Starts both worker pools.
    pub fn new(config: ScannerConfig) -> Result<Self, ArchiverError> {
        config.validate()?;

        let (jobs_tx, jobs_rx) = unbounded::<Job>();
        // compressed buffers wait for a free decompressor instead of piling up
        let (gunzip_tx, gunzip_rx) = bounded::<Compressed>(config.decompression_workers);
        let (output_tx, output_rx) = match config.output_capacity {
            Some(cap) => bounded::<FileRecord>(cap),
            None => unbounded::<FileRecord>(),
        };
        let counters = Arc::new(Counters::default());
        let queue = PathQueue { jobs: jobs_tx, pending: Arc::new(Pending::default()) };

        let mut decompressors = Vec::with_capacity(config.decompression_workers);
        for i in 0..config.decompression_workers {
            let jobs = gunzip_rx.clone();
            let output = output_tx.clone();
            let counters = Arc::clone(&counters);
            let handle = thread::Builder::new()
                .name(format!("gunzip-{i}"))
                .spawn(move || run_decompression(jobs, output, counters))?;
            decompressors.push(handle);
        }

        let expander = Expander { queue: queue.clone(), gunzip: gunzip_tx, output: output_tx, counters: Arc::clone(&counters) };
        let mut expanders = Vec::with_capacity(config.expansion_workers);
        for i in 0..config.expansion_workers {
            let expander = expander.clone();
            let jobs = jobs_rx.clone();
            let handle = thread::Builder::new()
                .name(format!("scan-{i}"))
                .spawn(move || expander.run(jobs))?;
            expanders.push(handle);
        }

        Ok(Self { queue, output: output_rx, counters, expanders, decompressors })
    }

    /// Queues `path` for expansion.
    pub fn add_input(&self, path: impl Into<PathBuf>) {
        self.queue.push(path.into());
    }

    /// The record stream. Every record is received by exactly one receiver;
    /// it ends once [`Scanner::close`] has finished.
    pub fn output(&self) -> Receiver<FileRecord> {
        self.output.clone()
    }

    /// Waits for all queued and discovered work, stops both pools and ends the output stream.
    pub fn close(mut self) -> ScanStats {
        self.shutdown();
        self.counters.snapshot()
    }

    fn shutdown(&mut self) {
        if self.expanders.is_empty() && self.decompressors.is_empty() {
            return;
        }
        self.queue.pending.wait_idle();

        for _ in 0..self.expanders.len() {
            let _ = self.queue.jobs.send(Job::Shutdown);
        }
        for handle in self.expanders.drain(..) {
            if handle.join().is_err() {
                error!("scan worker panicked");
            }
        }
        // The expanders held the last gunzip senders; the pool drains and exits.
        for handle in self.decompressors.drain(..) {
            if handle.join().is_err() {
                error!("gunzip worker panicked");
            }
        }
    }
}

impl Drop for Scanner {
    fn drop(&mut self) {
        self.shutdown();
    }
}
