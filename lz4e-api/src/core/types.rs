//! Fundamental block I/O types

use bitflags::bitflags;
use core::fmt;

/// Sector shift (log2 of the sector size)
pub const SECTOR_SHIFT: u32 = 9;

/// Maximum number of fragments a single descriptor may hold
pub const BIO_MAX_VECS: u16 = 256;

/// Starting sector of a request
pub type Sector = u64;

/// Identity of a block device
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct DeviceId(pub u32);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blk{}", self.0)
    }
}

/// Request operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ReqOp {
    /// Read sectors from the device
    #[default]
    Read = 0,
    /// Write sectors to the device
    Write = 1,
    /// Flush the volatile write cache
    Flush = 2,
    /// Discard sectors
    Discard = 3,
    /// Securely erase sectors
    SecureErase = 5,
    /// Write zeroes to sectors
    WriteZeroes = 9,
}

impl ReqOp {
    /// Returns true if the operation moves data towards the device
    pub const fn is_write(self) -> bool {
        (self as u8) & 1 == 1
    }
}

bitflags! {
    /// Request modifier flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ReqFlags: u32 {
        /// Request is synchronous
        const SYNC = 1 << 0;
        /// Metadata I/O
        const META = 1 << 1;
        /// Boost priority
        const PRIO = 1 << 2;
        /// Do not merge with other requests
        const NOMERGE = 1 << 3;
        /// Forced unit access
        const FUA = 1 << 4;
        /// Flush the cache before the request
        const PREFLUSH = 1 << 5;
        /// Do not retry on failure
        const FAILFAST = 1 << 6;
    }
}

/// Operation and flags of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OpFlags {
    /// Operation
    pub op: ReqOp,
    /// Modifier flags
    pub flags: ReqFlags,
}

impl OpFlags {
    /// Creates operation flags without modifiers
    pub const fn new(op: ReqOp) -> Self {
        Self { op, flags: ReqFlags::empty() }
    }

    /// Creates operation flags with modifiers
    pub const fn with_flags(op: ReqOp, flags: ReqFlags) -> Self {
        Self { op, flags }
    }
}
