use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::archive::{OpenMode, PayloadType, WriterOptions};
use crate::common::{DEFAULT_PAGE_SIZE, DEFAULT_TILE_SIZE};
use crate::scanner::ScannerConfig;
use crate::transpose::TransposeOptions;
use crate::workers::AddOptions;

#[derive(Parser, Debug)]
#[command(name = "lc0ar", author, version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Add training games to an archive.
    #[command(alias = "a")]
    Add {
        /// The archive file to write (e.g., games.lc0ar).
        #[arg(required = true)]
        archive: PathBuf,

        /// Tar files, gzip files, plain files or directories to add.
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Size of one training record in bytes. Files are zero-padded to a multiple of it.
        #[arg(short = 's', long, default_value_t = DEFAULT_PAGE_SIZE)]
        struct_size: u32,

        /// Append new blocks to an existing archive instead of replacing it.
        #[arg(long)]
        append: bool,

        /// Store block payloads as-is instead of byte-plane transposed.
        #[arg(long)]
        plain: bool,

        /// Zstandard compression level of the archive stream.
        #[arg(long, default_value_t = 3)]
        level: i32,

        /// Number of zstd worker threads. [0 = single-threaded]
        #[arg(long, default_value_t = 0)]
        zstd_threads: u32,

        /// Flush a block once its padded payload reaches this many MiB.
        #[arg(long, default_value_t = 512)]
        block_size_mib: usize,

        /// Threads listing directories, reading files and iterating tars.
        #[arg(long, default_value_t = 10)]
        scan_workers: usize,

        /// Threads decompressing gzip content.
        #[arg(long, default_value_t = 5)]
        gunzip_workers: usize,

        /// Threads used to transpose each block. [0 = auto-detect based on CPU cores]
        #[arg(long, default_value_t = 0)]
        transpose_workers: usize,

        /// `[ADVANCED]` Edge length of transpose tiles.
        #[arg(long, default_value_t = DEFAULT_TILE_SIZE, hide = true)]
        tile_size: usize,

        /// Do not print a line per added file.
        #[arg(short, long)]
        quiet: bool,
    },
}

impl Commands {
    /// Builds pipeline options from the parsed flags. Validation happens when the pipeline starts.
    pub fn add_options(&self) -> AddOptions {
        let Commands::Add {
            struct_size,
            append,
            plain,
            level,
            zstd_threads,
            block_size_mib,
            scan_workers,
            gunzip_workers,
            transpose_workers,
            tile_size,
            quiet,
            ..
        } = self;

        let workers = if *transpose_workers == 0 { num_cpus::get() } else { *transpose_workers };
        AddOptions {
            scanner: ScannerConfig {
                expansion_workers: *scan_workers,
                decompression_workers: *gunzip_workers,
                // the pipeline always drains on its own thread
                output_capacity: Some(*scan_workers),
            },
            writer: WriterOptions {
                page_size: *struct_size,
                block_threshold: block_size_mib.saturating_mul(1024 * 1024),
                layout: if *plain { PayloadType::Plain } else { PayloadType::Transposed },
                transpose: TransposeOptions { tile_size: *tile_size, workers },
                compression_level: *level,
                compression_threads: *zstd_threads,
                ..WriterOptions::default()
            },
            mode: if *append { OpenMode::Append } else { OpenMode::Truncate },
            progress: !*quiet,
        }
    }
}

/// Parses command-line arguments using `clap` and returns the command to execute.
pub fn run() -> Result<Commands, Box<dyn std::error::Error>> {
    let args = Args::parse();
    Ok(args.command)
}
