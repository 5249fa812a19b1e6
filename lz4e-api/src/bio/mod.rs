//! Block I/O descriptor
//!
//! A `Bio` describes one I/O against a block device: the operation, the
//! starting sector and a bounded list of `(page, offset, length)` fragments.
//! The fragment capacity is fixed when the descriptor is created; `add_page`
//! reports a full descriptor by adding nothing.
//!
//! Completion is delivered through a single-fire `BioEndIo` continuation
//! which receives the descriptor back by value.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::core::types::{DeviceId, OpFlags, ReqOp, Sector};
use crate::error::{invalid_argument, BlkStatus, Error, Result};
use crate::memory::{Page, PAGE_SIZE};

/// Completion continuation of a descriptor
pub type BioEndIo = Box<dyn FnOnce(Box<Bio>) + Send>;

/// One fragment of a descriptor's buffer list
#[derive(Debug, Clone)]
pub struct BioVec {
    /// Page holding the fragment
    pub page: Page,
    /// Offset of the fragment within the page
    pub offset: usize,
    /// Fragment length in bytes
    pub len: usize,
}

impl BioVec {
    /// Virtual address of the first byte of the fragment
    pub fn addr(&self) -> usize {
        self.page.addr() + self.offset
    }
}

/// Block I/O descriptor
pub struct Bio {
    bdev: DeviceId,
    opf: OpFlags,
    sector: Sector,
    max_vecs: usize,
    vecs: Vec<BioVec>,
    size: usize,
    status: BlkStatus,
    end_io: Option<BioEndIo>,
}

impl Bio {
    /// Create a descriptor holding up to `max_vecs` fragments
    pub fn new(bdev: DeviceId, max_vecs: u16, opf: OpFlags) -> Self {
        Self {
            bdev,
            opf,
            sector: 0,
            max_vecs: usize::from(max_vecs),
            vecs: Vec::with_capacity(usize::from(max_vecs)),
            size: 0,
            status: BlkStatus::Ok,
            end_io: None,
        }
    }

    /// Create a descriptor, reporting allocation failure instead of aborting
    pub fn try_new(bdev: DeviceId, max_vecs: u16, opf: OpFlags) -> Result<Box<Self>> {
        let mut vecs = Vec::new();
        vecs.try_reserve_exact(usize::from(max_vecs))
            .map_err(|_| Error::OutOfMemory)?;
        Ok(Box::new(Self {
            bdev,
            opf,
            sector: 0,
            max_vecs: usize::from(max_vecs),
            vecs,
            size: 0,
            status: BlkStatus::Ok,
            end_io: None,
        }))
    }

    /// Append a fragment
    ///
    /// Returns the number of bytes added: `len` on success, 0 when the
    /// descriptor is full or the fragment does not fit inside one page.
    pub fn add_page(&mut self, page: Page, len: usize, offset: usize) -> usize {
        if self.vecs.len() >= self.max_vecs {
            return 0;
        }
        if len == 0 || offset.checked_add(len).is_none_or(|end| end > PAGE_SIZE) {
            return 0;
        }
        self.vecs.push(BioVec { page, offset, len });
        self.size += len;
        len
    }

    /// Drop every fragment past the first `vcnt`
    pub fn truncate_vecs(&mut self, vcnt: usize) {
        self.vecs.truncate(vcnt);
        self.size = self.vecs.iter().map(|bv| bv.len).sum();
    }

    /// Return the descriptor to an empty, freshly-addressed state
    ///
    /// Fragments, sector, status and continuation are cleared; the fragment
    /// capacity is kept.
    pub fn reset(&mut self, bdev: DeviceId, opf: OpFlags) {
        self.bdev = bdev;
        self.opf = opf;
        self.sector = 0;
        self.vecs.clear();
        self.size = 0;
        self.status = BlkStatus::Ok;
        self.end_io = None;
    }

    /// Device the descriptor is bound to
    pub fn bdev(&self) -> DeviceId {
        self.bdev
    }

    /// Operation and flags
    pub fn opf(&self) -> OpFlags {
        self.opf
    }

    /// Operation
    pub fn op(&self) -> ReqOp {
        self.opf.op
    }

    /// Starting sector
    pub fn sector(&self) -> Sector {
        self.sector
    }

    /// Set the starting sector
    pub fn set_sector(&mut self, sector: Sector) {
        self.sector = sector;
    }

    /// Fragment capacity
    pub fn max_vecs(&self) -> usize {
        self.max_vecs
    }

    /// Number of fragments
    pub fn vcnt(&self) -> usize {
        self.vecs.len()
    }

    /// Fragments in order
    pub fn segments(&self) -> &[BioVec] {
        &self.vecs
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Completion status
    pub fn status(&self) -> BlkStatus {
        self.status
    }

    /// Set the completion status
    pub fn set_status(&mut self, status: BlkStatus) {
        self.status = status;
    }

    /// Install the completion continuation
    pub fn set_end_io(&mut self, end_io: BioEndIo) {
        self.end_io = Some(end_io);
    }

    /// Check whether a completion continuation is installed
    pub fn has_end_io(&self) -> bool {
        self.end_io.is_some()
    }

    /// Signal completion
    ///
    /// Consumes the descriptor and hands it to its continuation. Without a
    /// continuation the descriptor is simply dropped.
    pub fn endio(mut self: Box<Self>) {
        if let Some(end_io) = self.end_io.take() {
            end_io(self);
        }
    }

    /// Gather the payload into `out`
    ///
    /// `out` must be at least `size()` bytes; returns the number of bytes
    /// copied.
    pub fn copy_to(&self, out: &mut [u8]) -> Result<usize> {
        if out.len() < self.size {
            return Err(invalid_argument("gather buffer smaller than payload"));
        }
        let mut pos = 0;
        for bv in &self.vecs {
            bv.page.read(bv.offset, &mut out[pos..pos + bv.len])?;
            pos += bv.len;
        }
        Ok(pos)
    }

    /// Scatter `data` over the fragments
    ///
    /// `data` must be at least `size()` bytes; returns the number of bytes
    /// copied.
    pub fn copy_from(&self, data: &[u8]) -> Result<usize> {
        if data.len() < self.size {
            return Err(invalid_argument("scatter buffer smaller than payload"));
        }
        let mut pos = 0;
        for bv in &self.vecs {
            bv.page.write(bv.offset, &data[pos..pos + bv.len])?;
            pos += bv.len;
        }
        Ok(pos)
    }
}

impl fmt::Debug for Bio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bio")
            .field("bdev", &self.bdev)
            .field("opf", &self.opf)
            .field("sector", &self.sector)
            .field("vcnt", &self.vecs.len())
            .field("max_vecs", &self.max_vecs)
            .field("size", &self.size)
            .field("status", &self.status)
            .finish()
    }
}
