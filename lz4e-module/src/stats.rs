//! Request statistics
//!
//! One `Lz4eStats` instance is kept per direction. Completions update it
//! concurrently with independent atomic increments.

use core::sync::atomic::{AtomicU64, Ordering};

use lz4e_api::{Bio, StatsSink};

/// Snapshot of the counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Completed requests
    pub reqs_total: u64,
    /// Completed requests with a non-OK status
    pub reqs_failed: u64,
    /// Bytes moved by successful requests
    pub bytes_total: u64,
}

/// Per-direction request counters
#[derive(Debug, Default)]
pub struct Lz4eStats {
    reqs_total: AtomicU64,
    reqs_failed: AtomicU64,
    bytes_total: AtomicU64,
}

impl Lz4eStats {
    /// Create zeroed counters
    pub const fn new() -> Self {
        Self {
            reqs_total: AtomicU64::new(0),
            reqs_failed: AtomicU64::new(0),
            bytes_total: AtomicU64::new(0),
        }
    }

    /// Read the counters
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reqs_total: self.reqs_total.load(Ordering::Relaxed),
            reqs_failed: self.reqs_failed.load(Ordering::Relaxed),
            bytes_total: self.bytes_total.load(Ordering::Relaxed),
        }
    }

    /// Zero the counters
    pub fn reset(&self) {
        self.reqs_total.store(0, Ordering::Relaxed);
        self.reqs_failed.store(0, Ordering::Relaxed);
        self.bytes_total.store(0, Ordering::Relaxed);
    }
}

impl StatsSink for Lz4eStats {
    fn record(&self, bio: &Bio) {
        self.reqs_total.fetch_add(1, Ordering::Relaxed);
        if bio.status().is_ok() {
            self.bytes_total.fetch_add(bio.size() as u64, Ordering::Relaxed);
        } else {
            self.reqs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
