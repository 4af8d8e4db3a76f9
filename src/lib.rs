//! # lc0ar Core Library
//!
//! Bundles many small training-data files (loose files, tar containers, gzip
//! files and directories of these) into one archive of self-describing,
//! size-bounded blocks whose payloads are byte-plane transposed.
//!
//! ## Key Modules
//!
//! - [`scanner`]: expands input paths into a stream of [`common::FileRecord`]s on two worker pools.
//! - [`archive`]: accumulates records into blocks and writes framed blocks to a zstd stream.
//! - [`transpose`]: the tiled, parallel byte-plane transpose applied to every block payload.
//! - [`workers`]: wires the scanner into a single archive writer.
//! - [`cli`]: the `lc0ar` command line.
//!
//! ## Examples
//!
//! ```no_run
//! use lc0ar::archive::{ArchiveFileWriter, OpenMode, WriterOptions};
//! use lc0ar::common::FileRecord;
//!
//! let mut writer = ArchiveFileWriter::create("games.lc0ar", OpenMode::Truncate, WriterOptions::default())?;
//! writer.write(FileRecord::new("game.bin", vec![0u8; 8356]))?;
//! writer.close()?;
//! # Ok::<(), lc0ar::ArchiverError>(())
//! ```

pub mod archive;
pub mod cli;
pub mod common;
pub mod error;
pub use error::ArchiverError;

pub mod scanner;
pub mod transpose;
pub mod workers;
