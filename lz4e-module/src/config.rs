//! Filter configuration
//!
//! Tunables of the compression filter and of the RAM-backed reference
//! device. Both are plain values fixed at construction time.

use alloc::string::{String, ToString};

use lz4e_api::error::{invalid_argument, Result};
use lz4e_api::{DeviceId, BIO_MAX_VECS};

/// Filter configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lz4eConfig {
    /// Name of the virtual device
    pub name: String,
    /// Identity of the virtual device
    pub id: DeviceId,
    /// Fragment capacity ceiling for shadow descriptors
    pub max_vecs: u16,
}

impl Default for Lz4eConfig {
    fn default() -> Self {
        Self {
            name: "lz4e0".to_string(),
            id: DeviceId(0),
            max_vecs: BIO_MAX_VECS,
        }
    }
}

impl Lz4eConfig {
    /// Set the device name
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Set the device identity
    pub fn with_id(mut self, id: DeviceId) -> Self {
        self.id = id;
        self
    }

    /// Set the fragment capacity ceiling
    pub fn with_max_vecs(mut self, max_vecs: u16) -> Self {
        self.max_vecs = max_vecs;
        self
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(invalid_argument("device name is empty"));
        }
        if self.max_vecs == 0 || self.max_vecs > BIO_MAX_VECS {
            return Err(invalid_argument("max_vecs must be within 1..=BIO_MAX_VECS"));
        }
        Ok(())
    }
}

/// Reference device configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemUnderDevConfig {
    /// Identity of the device
    pub id: DeviceId,
    /// Capacity in sectors
    pub capacity_sectors: u64,
    /// Number of descriptors the pool can hand out at once
    pub pool_size: usize,
}

impl Default for MemUnderDevConfig {
    fn default() -> Self {
        Self {
            id: DeviceId(1),
            capacity_sectors: 8192, // 4MB
            pool_size: 128,
        }
    }
}

impl MemUnderDevConfig {
    /// Set the device identity
    pub fn with_id(mut self, id: DeviceId) -> Self {
        self.id = id;
        self
    }

    /// Set the capacity in sectors
    pub fn with_capacity_sectors(mut self, capacity_sectors: u64) -> Self {
        self.capacity_sectors = capacity_sectors;
        self
    }

    /// Set the descriptor pool size
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.capacity_sectors == 0 {
            return Err(invalid_argument("device capacity is zero"));
        }
        Ok(())
    }
}
