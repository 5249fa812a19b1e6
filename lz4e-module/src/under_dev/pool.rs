//! Bio pool
//!
//! A fixed number of bio slots shared by every request targeting the
//! device. Allocation fails instead of waiting once all slots are in use.

use alloc::boxed::Box;
use spin::Mutex;

use lz4e_api::error::{resource_exhausted, Result};
use lz4e_api::{Bio, DeviceId, OpFlags};

/// Bio pool statistics.
///
/// Tracks usage and capacity information for a bio pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Total number of bios in the pool.
    pub total_bios: usize,
    /// Number of bios currently in use.
    pub used_bios: usize,
    /// Allocations refused because the pool was exhausted.
    pub failed_allocs: u64,
}

struct PoolState {
    used_bios: usize,
    failed_allocs: u64,
}

/// A pool of bio slots
pub struct BioPool {
    /// Total number of slots
    total_bios: usize,
    /// Usage counters
    state: Mutex<PoolState>,
}

impl BioPool {
    /// Create a pool with `total_bios` slots
    pub const fn new(total_bios: usize) -> Self {
        Self {
            total_bios,
            state: Mutex::new(PoolState {
                used_bios: 0,
                failed_allocs: 0,
            }),
        }
    }

    /// Allocate a bio from the pool
    pub fn alloc(&self, bdev: DeviceId, max_vecs: u16, opf: OpFlags) -> Result<Box<Bio>> {
        let mut state = self.state.lock();
        if state.used_bios >= self.total_bios {
            state.failed_allocs += 1;
            return Err(resource_exhausted("bio pool exhausted"));
        }

        let bio = Bio::try_new(bdev, max_vecs, opf)
            .map_err(|_| resource_exhausted("bio allocation"))?;
        state.used_bios += 1;
        Ok(bio)
    }

    /// Return a bio to the pool
    pub fn free(&self, bio: Box<Bio>) {
        drop(bio);
        let mut state = self.state.lock();
        state.used_bios = state.used_bios.saturating_sub(1);
    }

    /// Get pool statistics
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            total_bios: self.total_bios,
            used_bios: state.used_bios,
            failed_allocs: state.failed_allocs,
        }
    }

    /// Check if no bio is in use
    pub fn is_empty(&self) -> bool {
        self.state.lock().used_bios == 0
    }

    /// Check if every bio is in use
    pub fn is_full(&self) -> bool {
        self.state.lock().used_bios >= self.total_bios
    }
}
