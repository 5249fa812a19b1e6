//! RAM-backed underlying device
//!
//! `MemUnderDev` stores sectors in memory and hands out bios from a bounded
//! pool. Submitted bios are queued; `complete_pending` executes them and
//! fires their continuations from whichever thread calls it, so a
//! continuation never runs inside `submit_bio`.

pub mod pool;

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

use lz4e_api::error::{invalid_argument, Error, Result};
use lz4e_api::interfaces::DeviceService;
use lz4e_api::{Bio, BioEndIo, BlkStatus, DeviceId, OpFlags, ReqOp, SECTOR_SIZE};

pub use pool::{BioPool, PoolStats};

use crate::config::MemUnderDevConfig;
use crate::{lz4e_debug, lz4e_err};

/// RAM-backed block device
pub struct MemUnderDev {
    config: MemUnderDevConfig,
    store: Mutex<Vec<u8>>,
    pool: BioPool,
    pending: Mutex<VecDeque<Box<Bio>>>,
    fault: Mutex<Option<BlkStatus>>,
    completed: AtomicU64,
}

impl MemUnderDev {
    /// Create a zero-filled device
    pub fn new(config: MemUnderDevConfig) -> Result<Self> {
        config.validate()?;

        let size = usize::try_from(config.capacity_sectors)
            .ok()
            .and_then(|sectors| sectors.checked_mul(SECTOR_SIZE))
            .ok_or_else(|| invalid_argument("device capacity overflows"))?;
        let mut store = Vec::new();
        store.try_reserve_exact(size).map_err(|_| Error::OutOfMemory)?;
        store.resize(size, 0);

        lz4e_debug!("created {} with {} sectors", config.id, config.capacity_sectors);
        Ok(Self {
            config,
            store: Mutex::new(store),
            pool: BioPool::new(config.pool_size),
            pending: Mutex::new(VecDeque::new()),
            fault: Mutex::new(None),
            completed: AtomicU64::new(0),
        })
    }

    /// Device configuration
    pub fn config(&self) -> &MemUnderDevConfig {
        &self.config
    }

    /// Capacity in bytes
    pub fn capacity_bytes(&self) -> usize {
        self.store.lock().len()
    }

    /// Bio pool statistics
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Number of submitted bios waiting for completion
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Number of bios completed so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Fail every following bio with `status`, or stop failing with `None`
    pub fn inject_fault(&self, status: Option<BlkStatus>) {
        *self.fault.lock() = status;
    }

    /// Execute and complete the oldest pending bio
    ///
    /// Returns `false` if nothing was pending.
    pub fn complete_one(&self) -> bool {
        let Some(mut bio) = self.pending.lock().pop_front() else {
            return false;
        };

        let status = self.execute(&bio);
        bio.set_status(status);
        if !status.is_ok() {
            lz4e_err!(
                "{} failed {:?} at sector {}: {}",
                self.config.id,
                bio.op(),
                bio.sector(),
                status
            );
        }

        self.completed.fetch_add(1, Ordering::AcqRel);
        bio.endio();
        true
    }

    /// Execute and complete every pending bio
    ///
    /// Bios submitted by the continuations themselves are completed too.
    /// Returns the number of completed bios.
    pub fn complete_pending(&self) -> usize {
        let mut count = 0;
        while self.complete_one() {
            count += 1;
        }
        count
    }

    /// Copy stored bytes starting at `offset` into `out`
    pub fn read_at(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        let store = self.store.lock();
        let range = Self::range(&store, offset, out.len())
            .ok_or_else(|| invalid_argument("range outside device"))?;
        out.copy_from_slice(&store[range]);
        Ok(())
    }

    /// Store `data` starting at `offset`
    pub fn write_at(&self, offset: usize, data: &[u8]) -> Result<()> {
        let mut store = self.store.lock();
        let range = Self::range(&store, offset, data.len())
            .ok_or_else(|| invalid_argument("range outside device"))?;
        store[range].copy_from_slice(data);
        Ok(())
    }

    fn range(store: &[u8], offset: usize, len: usize) -> Option<core::ops::Range<usize>> {
        let end = offset.checked_add(len)?;
        (end <= store.len()).then_some(offset..end)
    }

    fn execute(&self, bio: &Bio) -> BlkStatus {
        if bio.bdev() != self.config.id {
            return BlkStatus::IoErr;
        }
        if let Some(status) = *self.fault.lock() {
            return status;
        }

        let offset = match usize::try_from(bio.sector())
            .ok()
            .and_then(|sector| sector.checked_mul(SECTOR_SIZE))
        {
            Some(offset) => offset,
            None => return BlkStatus::IoErr,
        };

        match bio.op() {
            ReqOp::Read => {
                let store = self.store.lock();
                match Self::range(&store, offset, bio.size()) {
                    Some(range) => match bio.copy_from(&store[range]) {
                        Ok(_) => BlkStatus::Ok,
                        Err(_) => BlkStatus::IoErr,
                    },
                    None => BlkStatus::IoErr,
                }
            }
            ReqOp::Write => {
                let mut store = self.store.lock();
                match Self::range(&store, offset, bio.size()) {
                    Some(range) => match bio.copy_to(&mut store[range]) {
                        Ok(_) => BlkStatus::Ok,
                        Err(_) => BlkStatus::IoErr,
                    },
                    None => BlkStatus::IoErr,
                }
            }
            ReqOp::Flush => BlkStatus::Ok,
            _ => BlkStatus::NotSupp,
        }
    }
}

impl DeviceService for MemUnderDev {
    fn id(&self) -> DeviceId {
        self.config.id
    }

    fn alloc_bio(&self, max_vecs: u16, opf: OpFlags) -> Result<Box<Bio>> {
        self.pool.alloc(self.config.id, max_vecs, opf)
    }

    fn reset_bio(&self, bio: &mut Bio, opf: OpFlags) {
        bio.reset(self.config.id, opf);
    }

    fn put_bio(&self, bio: Box<Bio>) {
        self.pool.free(bio);
    }

    fn submit_bio(&self, mut bio: Box<Bio>, end_io: BioEndIo) {
        bio.set_end_io(end_io);
        lz4e_debug!("queued {:?} of {} bytes at sector {}", bio.op(), bio.size(), bio.sector());
        self.pending.lock().push_back(bio);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use lz4e_api::PageBuffer;
    use lz4e_api::PAGE_SIZE;

    fn dev() -> MemUnderDev {
        MemUnderDev::new(MemUnderDevConfig::default().with_capacity_sectors(16)).unwrap()
    }

    fn counter_end_io(counter: &Arc<AtomicU64>) -> BioEndIo {
        let counter = Arc::clone(counter);
        Box::new(move |bio| {
            assert!(bio.status().is_ok());
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_write_then_read() {
        let dev = dev();
        let fired = Arc::new(AtomicU64::new(0));
        let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
        frame.write_at(0, b"sector data").unwrap();

        let mut bio = dev.alloc_bio(1, OpFlags::new(ReqOp::Write)).unwrap();
        bio.set_sector(2);
        bio.add_page(frame.page(0).unwrap(), 512, 0);
        dev.submit_bio(bio, counter_end_io(&fired));

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(dev.pending(), 1);
        assert_eq!(dev.complete_pending(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let mut out = [0u8; 11];
        dev.read_at(1024, &mut out).unwrap();
        assert_eq!(&out, b"sector data");
    }

    #[test]
    fn test_out_of_range() {
        let dev = dev();
        let status = Arc::new(Mutex::new(BlkStatus::Ok));
        let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();

        let mut bio = dev.alloc_bio(1, OpFlags::new(ReqOp::Read)).unwrap();
        bio.set_sector(15);
        bio.add_page(frame.page(0).unwrap(), 1024, 0);

        let seen = Arc::clone(&status);
        dev.submit_bio(bio, Box::new(move |bio| *seen.lock() = bio.status()));
        dev.complete_pending();
        assert_eq!(*status.lock(), BlkStatus::IoErr);
    }

    #[test]
    fn test_fault_injection() {
        let dev = dev();
        let status = Arc::new(Mutex::new(BlkStatus::Ok));
        dev.inject_fault(Some(BlkStatus::Again));

        let bio = dev.alloc_bio(0, OpFlags::new(ReqOp::Flush)).unwrap();
        let seen = Arc::clone(&status);
        dev.submit_bio(bio, Box::new(move |bio| *seen.lock() = bio.status()));
        dev.complete_pending();
        assert_eq!(*status.lock(), BlkStatus::Again);
    }

    #[test]
    fn test_pool_accounting() {
        let dev = MemUnderDev::new(MemUnderDevConfig::default().with_pool_size(1)).unwrap();
        let bio = dev.alloc_bio(1, OpFlags::new(ReqOp::Write)).unwrap();
        assert!(dev.alloc_bio(1, OpFlags::new(ReqOp::Write)).is_err());
        dev.put_bio(bio);
        assert_eq!(dev.pool_stats().used_bios, 0);
    }
}
