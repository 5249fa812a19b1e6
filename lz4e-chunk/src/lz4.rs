//! LZ4 block chunk service

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use lz4_flex::block::{compress_into, decompress_into, get_maximum_output_size};
use lz4e_api::chunk::{Lz4eBuffer, Lz4eChunk};
use lz4e_api::error::{io_error, resource_exhausted, Result};
use lz4e_api::interfaces::ChunkService;
use lz4e_api::memory::PageBuffer;
use lz4e_api::LOG_TARGET;

/// Largest payload a single chunk accepts (1MB)
///
/// A shadow bio holds at most 256 pages, so once the compression bound is
/// added the largest write that can be mapped is 254 pages.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 256 * lz4e_api::PAGE_SIZE;

/// Worst-case LZ4 block size for `len` input bytes
pub const fn lz4_compress_bound(len: usize) -> usize {
    len + len / 255 + 16
}

/// Chunk service statistics.
///
/// Tracks chunk allocations and compression throughput.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChunkStats {
    /// Chunks allocated so far.
    pub allocated: u64,
    /// Chunks released so far.
    pub freed: u64,
    /// Chunks currently alive.
    pub live: usize,
    /// Uncompressed bytes fed to the compressor.
    pub bytes_in: u64,
    /// Compressed bytes produced.
    pub bytes_out: u64,
}

/// LZ4 block compression service
#[derive(Debug)]
pub struct Lz4ChunkService {
    max_chunk_size: usize,
    allocated: AtomicU64,
    freed: AtomicU64,
    live: AtomicUsize,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
}

impl Lz4ChunkService {
    /// Create a service accepting payloads up to `DEFAULT_MAX_CHUNK_SIZE`
    pub fn new() -> Self {
        Self::with_max_chunk_size(DEFAULT_MAX_CHUNK_SIZE)
    }

    /// Create a service accepting payloads up to `max_chunk_size` bytes
    pub fn with_max_chunk_size(max_chunk_size: usize) -> Self {
        Self {
            max_chunk_size,
            allocated: AtomicU64::new(0),
            freed: AtomicU64::new(0),
            live: AtomicUsize::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
        }
    }

    /// Largest accepted payload
    pub fn max_chunk_size(&self) -> usize {
        self.max_chunk_size
    }

    /// Get service statistics
    pub fn stats(&self) -> ChunkStats {
        ChunkStats {
            allocated: self.allocated.load(Ordering::Relaxed),
            freed: self.freed.load(Ordering::Relaxed),
            live: self.live.load(Ordering::Acquire),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
        }
    }
}

impl Default for Lz4ChunkService {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkService for Lz4ChunkService {
    fn compress_bound(&self, len: usize) -> usize {
        lz4_compress_bound(len)
    }

    fn alloc_chunk(&self, len: usize) -> Result<Lz4eChunk> {
        if len > self.max_chunk_size {
            log::error!(
                target: LOG_TARGET,
                "lz4e: chunk of {} bytes exceeds limit {}", len, self.max_chunk_size
            );
            return Err(resource_exhausted("chunk larger than limit"));
        }

        let src_buf = Lz4eBuffer::alloc(len).map_err(|_| {
            log::error!(target: LOG_TARGET, "lz4e: failed to allocate source buffer");
            resource_exhausted("source buffer")
        })?;

        // The encoder wants room for its own, looser worst case; only the
        // LZ4 bound is exposed as the destination buffer.
        let bound = self.compress_bound(len);
        let dst_buf = PageBuffer::alloc(get_maximum_output_size(len).max(bound))
            .and_then(|frame| Lz4eBuffer::from_frame(frame, 0, bound))
            .map_err(|_| {
                log::error!(target: LOG_TARGET, "lz4e: failed to allocate destination buffer");
                resource_exhausted("destination buffer")
            })?;

        self.allocated.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_add(1, Ordering::AcqRel);

        log::debug!(target: LOG_TARGET, "lz4e: allocated chunk of {} bytes", len);
        Ok(Lz4eChunk { src_buf, dst_buf })
    }

    fn compress(&self, chunk: &mut Lz4eChunk) -> Result<()> {
        let binding = chunk
            .src_buf
            .bio()
            .ok_or_else(|| io_error("source buffer is not bound to a request"))?;
        let src_len = binding.size;
        if src_len > chunk.src_buf.buf_size() {
            return Err(io_error("request payload larger than source buffer"));
        }

        chunk
            .src_buf
            .with_bytes_mut(|src| binding.gather(&mut src[..src_len]))?;
        chunk.src_buf.set_data_size(src_len)?;

        let scratch = chunk.dst_buf.offset() + get_maximum_output_size(src_len);
        let frame = chunk.dst_buf.frame();
        if scratch > frame.len() {
            return Err(io_error("destination frame smaller than encoder bound"));
        }

        let start = chunk.dst_buf.offset();
        let written = chunk
            .src_buf
            .with_bytes(|src| {
                frame.with_bytes_mut(|dst| compress_into(&src[..src_len], &mut dst[start..scratch]))
            })
            .map_err(|err| {
                log::error!(target: LOG_TARGET, "lz4e: compression failed: {}", err);
                io_error("compression failed")
            })?;
        if written > chunk.dst_buf.buf_size() {
            log::error!(
                target: LOG_TARGET,
                "lz4e: compressed {} bytes into {}, above bound {}",
                src_len,
                written,
                chunk.dst_buf.buf_size()
            );
            return Err(io_error("compressed payload exceeds bound"));
        }
        chunk.dst_buf.set_data_size(written)?;

        self.bytes_in.fetch_add(src_len as u64, Ordering::Relaxed);
        self.bytes_out.fetch_add(written as u64, Ordering::Relaxed);

        log::debug!(target: LOG_TARGET, "lz4e: compressed {} bytes into {}", src_len, written);
        Ok(())
    }

    fn decompress(&self, chunk: &mut Lz4eChunk) -> Result<()> {
        let dst_len = chunk.dst_buf.data_size();
        let expected = chunk.src_buf.data_size();

        let dst_buf = &chunk.dst_buf;
        let produced = dst_buf
            .with_bytes(|dst| {
                chunk
                    .src_buf
                    .with_bytes_mut(|src| decompress_into(&dst[..dst_len], src))
            })
            .map_err(|err| {
                log::error!(target: LOG_TARGET, "lz4e: decompression failed: {}", err);
                io_error("decompression failed")
            })?;

        if produced != expected {
            log::error!(
                target: LOG_TARGET,
                "lz4e: decompressed {} bytes, expected {}", produced, expected
            );
            return Err(io_error("decompressed size mismatch"));
        }

        log::debug!(target: LOG_TARGET, "lz4e: decompressed {} bytes into {}", dst_len, produced);
        Ok(())
    }

    fn free_chunk(&self, chunk: Lz4eChunk) {
        drop(chunk);
        self.freed.fetch_add(1, Ordering::Relaxed);
        self.live.fetch_sub(1, Ordering::AcqRel);
        log::debug!(target: LOG_TARGET, "lz4e: released chunk");
    }
}
