//! # Byte-plane Transpose
//!
//! Turns a buffer of fixed-size records laid out record-major
//! (record 0, record 1, ...) into offset-major layout (byte 0 of every record,
//! then byte 1 of every record, ...):
//!
//! ```text
//! dst[offset * record_count + record] = src[record * page_size + offset]
//! ```
//!
//! Grouping one byte offset across all records gives the downstream compressor
//! long runs of similar bytes, and lets a reader fetch a single feature plane
//! with one contiguous read.
//!
//! ## Strategy
//!
//! 1. The `record_count × page_size` index space is cut into square tiles.
//! 2. Every tile borrows its own disjoint `&mut` runs of the destination
//!    buffer, carved out before any thread starts.
//! 3. Tiles are sent in row-major order through a bounded channel to a scoped
//!    worker pool; leaving the scope is the only synchronization needed.
//!
//! The tile edge only affects cache behaviour, never the result.

use crossbeam_channel::bounded;
use std::thread;
use tracing::debug;

use crate::common::DEFAULT_TILE_SIZE;
use crate::ArchiverError;

/// Tuning knobs for [`transpose_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransposeOptions {
    /// Edge length of the square tiles, in records and in bytes.
    pub tile_size: usize,
    /// Number of worker threads spawned per call.
    pub workers: usize,
}

impl Default for TransposeOptions {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            workers: num_cpus::get(),
        }
    }
}

impl TransposeOptions {
    pub fn validate(&self) -> Result<(), ArchiverError> {
        if self.tile_size == 0 {
            return Err(ArchiverError::InvalidConfig("transpose tile size must be non-zero".into()));
        }
        if self.workers == 0 {
            return Err(ArchiverError::InvalidConfig("transpose needs at least one worker".into()));
        }
        Ok(())
    }
}

/// One unit of parallel work.
///
/// `rows[k]` is the run of plane `first_offset + k` holding records
/// `first_record..first_record + rows[k].len()`.
struct Tile<'a> {
    first_record: usize,
    first_offset: usize,
    rows: Vec<&'a mut [u8]>,
}

/// Transpose `src` with the default tile size and one worker per CPU.
pub fn transpose(src: &[u8], page_size: usize) -> Result<Vec<u8>, ArchiverError> {
    transpose_with(src, page_size, &TransposeOptions::default())
}

/// Transpose `src`, viewed as `src.len() / page_size` records of `page_size` bytes.
///
/// Fails with [`ArchiverError::InvalidConfig`] if `page_size` is zero or does not
/// divide `src.len()`. An empty `src` yields an empty buffer.
///
/// Calling this again on the result with `record_count` as the page size
/// restores the original buffer.
pub fn transpose_with(
    src: &[u8],
    page_size: usize,
    opts: &TransposeOptions,
) -> Result<Vec<u8>, ArchiverError> {
    opts.validate()?;
    if page_size == 0 {
        return Err(ArchiverError::InvalidConfig("page size must be non-zero".into()));
    }
    if src.len() % page_size != 0 {
        return Err(ArchiverError::InvalidConfig(format!(
            "buffer of {} bytes is not a whole number of {}-byte pages",
            src.len(),
            page_size
        )));
    }

    let record_count = src.len() / page_size;
    let mut dst = vec![0u8; src.len()];
    if record_count == 0 {
        return Ok(dst);
    }

    let tile = opts.tile_size;
    let record_tiles = record_count.div_ceil(tile);
    let offset_tiles = page_size.div_ceil(tile);

    let mut tiles: Vec<Tile<'_>> = (0..record_tiles * offset_tiles)
        .map(|id| Tile {
            first_record: (id / offset_tiles) * tile,
            first_offset: (id % offset_tiles) * tile,
            rows: Vec::with_capacity(tile.min(page_size)),
        })
        .collect();

    // Each plane is split into tile-wide runs; every run belongs to exactly one tile.
    for (offset, plane) in dst.chunks_mut(record_count).enumerate() {
        let offset_tile = offset / tile;
        for (record_tile, run) in plane.chunks_mut(tile).enumerate() {
            tiles[record_tile * offset_tiles + offset_tile].rows.push(run);
        }
    }

    let workers = opts.workers.min(tiles.len());
    debug!(
        "transposing {} records of {} bytes as {} tiles on {} workers",
        record_count,
        page_size,
        tiles.len(),
        workers
    );

    let (tile_tx, tile_rx) = bounded::<Tile<'_>>(workers);
    thread::scope(|s| {
        for _ in 0..workers {
            let tile_rx = tile_rx.clone();
            s.spawn(move || {
                for tile in tile_rx {
                    copy_tile(src, page_size, tile);
                }
            });
        }
        drop(tile_rx);

        for tile in tiles {
            if tile_tx.send(tile).is_err() {
                break;
            }
        }
        drop(tile_tx);
    });

    Ok(dst)
}

fn copy_tile(src: &[u8], page_size: usize, tile: Tile<'_>) {
    let Tile { first_record, first_offset, rows } = tile;
    for (k, run) in rows.into_iter().enumerate() {
        let mut idx = first_record * page_size + first_offset + k;
        for slot in run.iter_mut() {
            *slot = src[idx];
            idx += page_size;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{thread_rng, Rng, RngCore};

    fn naive(src: &[u8], page_size: usize) -> Vec<u8> {
        let records = src.len() / page_size;
        let mut dst = vec![0u8; src.len()];
        for r in 0..records {
            for b in 0..page_size {
                dst[b * records + r] = src[r * page_size + b];
            }
        }
        dst
    }

    fn random_buf(len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        thread_rng().fill_bytes(&mut buf);
        buf
    }

    #[test]
    fn test_matches_index_mapping() {
        // 3 records of 4 bytes
        let src: Vec<u8> = (0u8..12).collect();
        let out = transpose(&src, 4).unwrap();
        assert_eq!(out, vec![0, 4, 8, 1, 5, 9, 2, 6, 10, 3, 7, 11]);
    }

    #[test]
    fn test_involution_random_shapes() {
        let mut rng = thread_rng();
        for _ in 0..40 {
            let page = rng.gen_range(1..300);
            let records = rng.gen_range(1..300);
            let src = random_buf(page * records);
            let opts = TransposeOptions { tile_size: rng.gen_range(1..80), workers: rng.gen_range(1..6) };

            let fwd = transpose_with(&src, page, &opts).unwrap();
            assert_eq!(fwd, naive(&src, page), "page={page} records={records}");
            let back = transpose_with(&fwd, records, &opts).unwrap();
            assert_eq!(back, src, "page={page} records={records}");
        }
    }

    #[test]
    fn test_length_and_byte_multiset_preserved() {
        let src = random_buf(37 * 91);
        let out = transpose(&src, 37).unwrap();
        assert_eq!(out.len(), src.len());

        let mut a = src.clone();
        let mut b = out;
        a.sort_unstable();
        b.sort_unstable();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tile_size_does_not_change_result() {
        let page = 300;
        let records = 517;
        let src = random_buf(page * records);
        let reference = transpose_with(&src, page, &TransposeOptions { tile_size: 1, workers: 3 }).unwrap();
        for tile_size in [64, 256, 10_000, usize::MAX] {
            let out = transpose_with(&src, page, &TransposeOptions { tile_size, workers: 4 }).unwrap();
            assert_eq!(out, reference, "tile_size={tile_size}");
        }
    }

    #[test]
    fn test_single_record_and_single_byte_pages() {
        let src = random_buf(129);
        // One record: the byte order is unchanged.
        assert_eq!(transpose(&src, 129).unwrap(), src);
        // One-byte pages: every record is its own plane, also unchanged.
        assert_eq!(transpose(&src, 1).unwrap(), src);
    }

    #[test]
    fn test_empty_buffer() {
        assert!(transpose(&[], 8356).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(matches!(transpose(&[1, 2, 3], 0), Err(ArchiverError::InvalidConfig(_))));
        assert!(matches!(transpose(&[1, 2, 3], 2), Err(ArchiverError::InvalidConfig(_))));
        let opts = TransposeOptions { tile_size: 0, workers: 1 };
        assert!(matches!(transpose_with(&[1, 2], 1, &opts), Err(ArchiverError::InvalidConfig(_))));
        let opts = TransposeOptions { tile_size: 4, workers: 0 };
        assert!(matches!(transpose_with(&[1, 2], 1, &opts), Err(ArchiverError::InvalidConfig(_))));
    }
}
