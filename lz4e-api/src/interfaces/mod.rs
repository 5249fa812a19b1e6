//! Collaborator interfaces
//!
//! The request lifecycle controller drives three services: the underlying
//! device, which allocates and executes descriptors; the chunk service, which
//! owns compression and its buffers; and a statistics sink. All of them are
//! shared between concurrently running requests and must be `Send + Sync`.

use alloc::boxed::Box;

use crate::bio::{Bio, BioEndIo};
use crate::chunk::Lz4eChunk;
use crate::core::types::{DeviceId, OpFlags};
use crate::error::Result;

/// Trait for the underlying block device
pub trait DeviceService: Send + Sync {
    /// Identity of the device
    fn id(&self) -> DeviceId;

    /// Allocate a descriptor bound to this device
    ///
    /// Fails with `Error::ResourceExhausted` when the descriptor pool is
    /// empty.
    fn alloc_bio(&self, max_vecs: u16, opf: OpFlags) -> Result<Box<Bio>>;

    /// Return a descriptor to an empty state bound to this device
    fn reset_bio(&self, bio: &mut Bio, opf: OpFlags);

    /// Release a descriptor back to the pool
    fn put_bio(&self, bio: Box<Bio>);

    /// Dispatch a descriptor
    ///
    /// Returns without waiting. `end_io` is called exactly once with the
    /// descriptor when the I/O finishes, possibly on another thread and
    /// never before this call has returned.
    fn submit_bio(&self, bio: Box<Bio>, end_io: BioEndIo);
}

/// Trait for the compression service
pub trait ChunkService: Send + Sync {
    /// Worst-case compressed size of `len` input bytes
    ///
    /// Deterministic and monotonic non-decreasing in `len`.
    fn compress_bound(&self, len: usize) -> usize;

    /// Allocate a chunk for a payload of `len` bytes
    ///
    /// `dst_buf` capacity is at least `compress_bound(len)`. Fails with
    /// `Error::ResourceExhausted` when buffers cannot be allocated.
    fn alloc_chunk(&self, len: usize) -> Result<Lz4eChunk>;

    /// Compress the payload bound to `src_buf` into `dst_buf`
    fn compress(&self, chunk: &mut Lz4eChunk) -> Result<()>;

    /// Decompress `dst_buf` back into `src_buf`
    fn decompress(&self, chunk: &mut Lz4eChunk) -> Result<()>;

    /// Release a chunk
    fn free_chunk(&self, chunk: Lz4eChunk);
}

/// Trait for statistics accumulation
pub trait StatsSink: Send + Sync {
    /// Account a completed descriptor
    fn record(&self, bio: &Bio);
}
