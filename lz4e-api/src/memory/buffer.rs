//! Page-aligned buffers
//!
//! A `PageBuffer` is a zero-initialized, page-aligned heap region. Block I/O
//! descriptors never point at raw addresses; each fragment holds a `Page`,
//! which keeps the backing `PageBuffer` alive for as long as the fragment
//! exists. Access to the bytes is serialized by a per-buffer lock.

use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use alloc::sync::Arc;
use core::fmt;
use core::ptr::NonNull;
use core::slice;
use spin::Mutex;

use super::page::{bytes_to_pages, page_round_down, PAGE_SIZE};
use crate::error::{invalid_argument, Error, Result};

/// A page-aligned, zero-initialized memory region
pub struct PageBuffer {
    /// Base address of the region
    base: NonNull<u8>,
    /// Number of pages in the region
    nr_pages: usize,
    /// Serializes access to the bytes
    lock: Mutex<()>,
}

impl PageBuffer {
    /// Allocate a buffer large enough for `len` bytes
    ///
    /// The size is rounded up to whole pages and is never less than one page.
    /// Returns `Error::OutOfMemory` when the allocator cannot satisfy the
    /// request.
    pub fn alloc(len: usize) -> Result<Arc<Self>> {
        let nr_pages = bytes_to_pages(len).max(1);
        let size = nr_pages
            .checked_mul(PAGE_SIZE)
            .ok_or_else(|| invalid_argument("page buffer size overflows"))?;
        let layout = Layout::from_size_align(size, PAGE_SIZE)
            .map_err(|_| invalid_argument("page buffer layout"))?;

        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(Error::OutOfMemory)?;

        Ok(Arc::new(Self {
            base,
            nr_pages,
            lock: Mutex::new(()),
        }))
    }

    /// Virtual address of the first byte
    pub fn addr(&self) -> usize {
        self.base.as_ptr() as usize
    }

    /// Size of the region in bytes
    pub fn len(&self) -> usize {
        self.nr_pages * PAGE_SIZE
    }

    /// A page buffer always holds at least one page
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Number of pages in the region
    pub fn nr_pages(&self) -> usize {
        self.nr_pages
    }

    /// Check whether `addr` lies inside the region
    pub fn contains(&self, addr: usize) -> bool {
        addr >= self.addr() && addr < self.addr() + self.len()
    }

    /// Get the page at `index`
    pub fn page(self: &Arc<Self>, index: usize) -> Option<Page> {
        if index >= self.nr_pages {
            return None;
        }
        Some(Page {
            frame: Arc::clone(self),
            index,
        })
    }

    /// Get the page containing `addr`
    pub fn virt_to_page(self: &Arc<Self>, addr: usize) -> Option<Page> {
        if !self.contains(addr) {
            return None;
        }
        self.page((page_round_down(addr) - self.addr()) / PAGE_SIZE)
    }

    /// Run `f` with shared access to the whole region
    ///
    /// `f` must not access this same buffer again, the lock is not
    /// reentrant.
    pub fn with_bytes<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let _guard = self.lock.lock();
        // SAFETY: `base` is valid for `len()` bytes until drop and the lock
        // excludes every other accessor.
        let bytes = unsafe { slice::from_raw_parts(self.base.as_ptr(), self.len()) };
        f(bytes)
    }

    /// Run `f` with exclusive access to the whole region
    ///
    /// `f` must not access this same buffer again, the lock is not
    /// reentrant.
    pub fn with_bytes_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let _guard = self.lock.lock();
        // SAFETY: as in `with_bytes`; holding the lock makes this the only
        // live reference to the region.
        let bytes = unsafe { slice::from_raw_parts_mut(self.base.as_ptr(), self.len()) };
        f(bytes)
    }

    /// Copy bytes starting at `offset` into `out`
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let end = self.check_range(offset, out.len())?;
        self.with_bytes(|bytes| out.copy_from_slice(&bytes[offset..end]));
        Ok(())
    }

    /// Copy `data` into the region starting at `offset`
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let end = self.check_range(offset, data.len())?;
        self.with_bytes_mut(|bytes| bytes[offset..end].copy_from_slice(data));
        Ok(())
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<usize> {
        match offset.checked_add(len) {
            Some(end) if end <= self.len() => Ok(end),
            _ => Err(invalid_argument("range outside page buffer")),
        }
    }
}

impl Drop for PageBuffer {
    fn drop(&mut self) {
        // SAFETY: the region was allocated in `alloc` with exactly this
        // layout, which was validated there.
        unsafe {
            let layout = Layout::from_size_align_unchecked(self.len(), PAGE_SIZE);
            dealloc(self.base.as_ptr(), layout);
        }
    }
}

impl fmt::Debug for PageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageBuffer")
            .field("addr", &format_args!("{:#x}", self.addr()))
            .field("nr_pages", &self.nr_pages)
            .finish()
    }
}

// The region is only reachable through the lock
unsafe impl Send for PageBuffer {}
unsafe impl Sync for PageBuffer {}

/// One page of a `PageBuffer`
#[derive(Clone)]
pub struct Page {
    frame: Arc<PageBuffer>,
    index: usize,
}

impl Page {
    /// Virtual address of the page
    pub fn addr(&self) -> usize {
        self.frame.addr() + self.index * PAGE_SIZE
    }

    /// Index of the page inside its buffer
    pub fn index(&self) -> usize {
        self.index
    }

    /// The buffer this page belongs to
    pub fn frame(&self) -> &Arc<PageBuffer> {
        &self.frame
    }

    /// Check whether two handles refer to the same page
    pub fn same_page(&self, other: &Page) -> bool {
        Arc::ptr_eq(&self.frame, &other.frame) && self.index == other.index
    }

    /// Copy bytes at `offset` within the page into `out`
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.check_range(offset, out.len())?;
        self.frame.read_at(self.index * PAGE_SIZE + offset, out)
    }

    /// Copy `data` into the page at `offset`
    pub fn write(&self, offset: usize, data: &[u8]) -> Result<()> {
        self.check_range(offset, data.len())?;
        self.frame.write_at(self.index * PAGE_SIZE + offset, data)
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        match offset.checked_add(len) {
            Some(end) if end <= PAGE_SIZE => Ok(()),
            _ => Err(invalid_argument("range crosses page boundary")),
        }
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({:#x})", self.addr())
    }
}
