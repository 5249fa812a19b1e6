//! Compression workspace types
//!
//! A write is transformed inside an `Lz4eChunk`: the payload is gathered into
//! `src_buf` and compressed into `dst_buf`. Each buffer can be bound to the
//! descriptor it serves, which the chunk service uses to locate the payload
//! and the statistics code uses for bookkeeping.

use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::bio::{Bio, BioVec};
use crate::core::types::{DeviceId, OpFlags, Sector};
use crate::error::{invalid_argument, Result};
use crate::memory::PageBuffer;

/// Snapshot of the descriptor a buffer is bound to
///
/// The fragments hold page handles, so the bound payload stays readable for
/// as long as the binding exists.
#[derive(Debug, Clone)]
pub struct BioBinding {
    /// Device of the bound descriptor
    pub bdev: DeviceId,
    /// Operation and flags of the bound descriptor
    pub opf: OpFlags,
    /// Starting sector of the bound descriptor
    pub sector: Sector,
    /// Payload size of the bound descriptor
    pub size: usize,
    /// Fragments of the bound descriptor
    pub segments: Vec<BioVec>,
}

impl BioBinding {
    /// Capture the shape of `bio`
    pub fn of(bio: &Bio) -> Self {
        Self {
            bdev: bio.bdev(),
            opf: bio.opf(),
            sector: bio.sector(),
            size: bio.size(),
            segments: bio.segments().to_vec(),
        }
    }

    /// Gather the bound payload into `out`
    pub fn gather(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < self.size {
            return Err(invalid_argument("gather buffer smaller than bound payload"));
        }
        let mut pos = 0;
        for bv in &self.segments {
            bv.page.read(bv.offset, &mut out[pos..pos + bv.len])?;
            pos += bv.len;
        }
        Ok(pos)
    }
}

/// A contiguous data buffer with an optional descriptor back-reference
#[derive(Debug)]
pub struct Lz4eBuffer {
    frame: Arc<PageBuffer>,
    offset: usize,
    buf_size: usize,
    data_size: usize,
    bio: Option<BioBinding>,
}

impl Lz4eBuffer {
    /// Allocate a page-aligned buffer of `buf_size` bytes
    pub fn alloc(buf_size: usize) -> Result<Self> {
        let frame = PageBuffer::alloc(buf_size)?;
        Self::from_frame(frame, 0, buf_size)
    }

    /// Use `buf_size` bytes of `frame` starting at `offset`
    pub fn from_frame(frame: Arc<PageBuffer>, offset: usize, buf_size: usize) -> Result<Self> {
        match offset.checked_add(buf_size) {
            Some(end) if end <= frame.len() => Ok(Self {
                frame,
                offset,
                buf_size,
                data_size: 0,
                bio: None,
            }),
            _ => Err(invalid_argument("buffer outside its page frame")),
        }
    }

    /// Virtual address of the first byte
    pub fn data(&self) -> usize {
        self.frame.addr() + self.offset
    }

    /// Capacity in bytes
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Number of valid bytes
    pub fn data_size(&self) -> usize {
        self.data_size
    }

    /// Record the number of valid bytes
    pub fn set_data_size(&mut self, data_size: usize) -> Result<()> {
        if data_size > self.buf_size {
            return Err(invalid_argument("data size exceeds buffer capacity"));
        }
        self.data_size = data_size;
        Ok(())
    }

    /// Backing page frame
    pub fn frame(&self) -> &Arc<PageBuffer> {
        &self.frame
    }

    /// Offset of the buffer inside its frame
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Bind the buffer to a descriptor
    pub fn bind(&mut self, bio: &Bio) {
        self.bio = Some(BioBinding::of(bio));
    }

    /// Descriptor the buffer is bound to
    pub fn bio(&self) -> Option<&BioBinding> {
        self.bio.as_ref()
    }

    /// Run `f` over the buffer's bytes
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let range = self.offset..self.offset + self.buf_size;
        self.frame.with_bytes(|bytes| f(&bytes[range]))
    }

    /// Run `f` over the buffer's bytes mutably
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let range = self.offset..self.offset + self.buf_size;
        self.frame.with_bytes_mut(|bytes| f(&mut bytes[range]))
    }
}

/// The compression workspace of one write
#[derive(Debug)]
pub struct Lz4eChunk {
    /// Uncompressed payload
    pub src_buf: Lz4eBuffer,
    /// Compressed payload, sized to the compression bound of `src_buf`
    pub dst_buf: Lz4eBuffer,
}
