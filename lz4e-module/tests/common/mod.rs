//! Shared fixtures for the module tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use lz4e_api::error::{io_error, resource_exhausted, Result};
use lz4e_api::*;
use lz4e_module::*;

/// Bound used by the fake chunk service, 4096 -> 4108
pub fn fake_bound(len: usize) -> usize {
    len + len / 512 + 4
}

/// Chunk service that stores the payload as is and counts every chunk
#[derive(Default)]
pub struct FakeChunkService {
    pub fail_alloc: AtomicBool,
    pub fail_compress: AtomicBool,
    pub fail_decompress: AtomicBool,
    allocated: AtomicUsize,
    freed: AtomicUsize,
    compressed: AtomicUsize,
    decompressed: AtomicUsize,
}

impl FakeChunkService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    pub fn freed(&self) -> usize {
        self.freed.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.allocated() - self.freed()
    }

    pub fn compressed(&self) -> usize {
        self.compressed.load(Ordering::SeqCst)
    }

    pub fn decompressed(&self) -> usize {
        self.decompressed.load(Ordering::SeqCst)
    }
}

impl ChunkService for FakeChunkService {
    fn compress_bound(&self, len: usize) -> usize {
        fake_bound(len)
    }

    fn alloc_chunk(&self, len: usize) -> Result<Lz4eChunk> {
        if self.fail_alloc.load(Ordering::SeqCst) {
            return Err(resource_exhausted("injected chunk allocation failure"));
        }
        let src_buf = Lz4eBuffer::alloc(len)?;
        let dst_buf = Lz4eBuffer::alloc(fake_bound(len))?;
        self.allocated.fetch_add(1, Ordering::SeqCst);
        Ok(Lz4eChunk { src_buf, dst_buf })
    }

    fn compress(&self, chunk: &mut Lz4eChunk) -> Result<()> {
        if self.fail_compress.load(Ordering::SeqCst) {
            return Err(io_error("injected compression failure"));
        }
        let binding = chunk
            .src_buf
            .bio()
            .ok_or_else(|| io_error("source buffer is not bound"))?;
        let size = binding.size;
        chunk
            .src_buf
            .with_bytes_mut(|src| binding.gather(&mut src[..size]))?;
        chunk.src_buf.set_data_size(size)?;

        let data = chunk.src_buf.with_bytes(|src| src[..size].to_vec());
        chunk
            .dst_buf
            .with_bytes_mut(|dst| dst[..size].copy_from_slice(&data));
        chunk.dst_buf.set_data_size(size)?;
        self.compressed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn decompress(&self, chunk: &mut Lz4eChunk) -> Result<()> {
        if self.fail_decompress.load(Ordering::SeqCst) {
            return Err(io_error("injected decompression failure"));
        }
        let size = chunk.dst_buf.data_size();
        let data = chunk.dst_buf.with_bytes(|dst| dst[..size].to_vec());
        chunk
            .src_buf
            .with_bytes_mut(|src| src[..size].copy_from_slice(&data));
        self.decompressed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn free_chunk(&self, chunk: Lz4eChunk) {
        drop(chunk);
        self.freed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Statuses an original bio was completed with
pub type Completions = Arc<Mutex<Vec<BlkStatus>>>;

/// A caller bio of `lens` fragments, one page of `frame` each, addressed
/// to a default-configured filter
pub fn caller_bio(
    op: ReqOp,
    sector: Sector,
    frame: &Arc<PageBuffer>,
    lens: &[usize],
) -> (Box<Bio>, Completions) {
    let max_vecs = u16::try_from(lens.len().max(1)).unwrap();
    let mut bio = Box::new(Bio::new(Lz4eConfig::default().id, max_vecs, OpFlags::new(op)));
    bio.set_sector(sector);
    for (i, &len) in lens.iter().enumerate() {
        assert_eq!(bio.add_page(frame.page(i).unwrap(), len, 0), len);
    }

    let completions: Completions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&completions);
    bio.set_end_io(Box::new(move |bio| seen.lock().unwrap().push(bio.status())));
    (bio, completions)
}

/// A filter on a RAM device with a fake chunk service
pub struct Fixture {
    pub under: Arc<MemUnderDev>,
    pub chunks: Arc<FakeChunkService>,
    pub read_stats: Arc<Lz4eStats>,
    pub write_stats: Arc<Lz4eStats>,
    pub dev: Arc<Lz4eDev>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_configs(Lz4eConfig::default(), MemUnderDevConfig::default())
    }

    pub fn with_configs(config: Lz4eConfig, under_config: MemUnderDevConfig) -> Self {
        Self::build(config, under_config, None)
    }

    pub fn with_stage(stage: Box<dyn PostCompress>) -> Self {
        Self::build(
            Lz4eConfig::default(),
            MemUnderDevConfig::default(),
            Some(stage),
        )
    }

    fn build(
        config: Lz4eConfig,
        under_config: MemUnderDevConfig,
        stage: Option<Box<dyn PostCompress>>,
    ) -> Self {
        let under = Arc::new(MemUnderDev::new(under_config).unwrap());
        let chunks = Arc::new(FakeChunkService::new());
        let read_stats = Arc::new(Lz4eStats::new());
        let write_stats = Arc::new(Lz4eStats::new());

        let mut builder = Lz4eDev::builder(under.clone())
            .with_config(config)
            .with_chunks(chunks.clone())
            .with_read_stats(read_stats.clone())
            .with_write_stats(write_stats.clone());
        if let Some(stage) = stage {
            builder = builder.with_post_compress(stage);
        }

        Self {
            under,
            chunks,
            read_stats,
            write_stats,
            dev: builder.build().unwrap(),
        }
    }

    /// Nothing held by any request
    pub fn assert_released(&self) {
        assert_eq!(self.under.pool_stats().used_bios, 0);
        assert_eq!(self.chunks.live(), 0);
    }
}
