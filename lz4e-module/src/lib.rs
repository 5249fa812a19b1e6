//! LZ4E Module - Transparent compression block filter
//!
//! This crate provides the request lifecycle controller of the LZ4E filter,
//! which sits between a virtual block device and the device underneath it.
//! Writes are compressed into a chunk and persisted through a shadow bio;
//! reads are passed through. Completion of the shadow bio completes the
//! caller's bio and releases every resource of the request exactly once.
//!
//! # Architecture
//!
//! - **Config**: Filter and reference device tunables
//! - **Logging**: `lz4e:`-prefixed logging macros over the `log` facade
//! - **Stats**: Per-direction request counters
//! - **Mapper**: Maps contiguous buffers onto page fragments
//! - **Post**: The stage between compression and dispatch of a write
//! - **Req**: Request context allocation, initialization, submission and
//!   completion
//! - **Under dev**: RAM-backed underlying device with a bounded bio pool
//! - **Dev**: The virtual device entry point
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use lz4e_api::{Bio, OpFlags, PageBuffer, ReqOp, PAGE_SIZE};
//! use lz4e_module::{Lz4eDev, MemUnderDev, MemUnderDevConfig};
//!
//! let under = Arc::new(MemUnderDev::new(MemUnderDevConfig::default()).unwrap());
//! let dev = Lz4eDev::builder(under.clone()).build().unwrap();
//!
//! let payload = PageBuffer::alloc(PAGE_SIZE).unwrap();
//! let mut bio = Box::new(Bio::new(dev.config().id, 1, OpFlags::new(ReqOp::Write)));
//! bio.add_page(payload.page(0).unwrap(), PAGE_SIZE, 0);
//!
//! dev.submit_bio(bio);
//! assert_eq!(under.complete_pending(), 1);
//! ```

#![no_std]
#![warn(missing_docs)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

// Logging macros first so every later module can use them
pub mod logging;

pub mod config;
pub mod stats;
pub mod mapper;
pub mod post;
pub mod req;
pub mod under_dev;
pub mod dev;

// Re-export commonly used items
pub use config::{Lz4eConfig, MemUnderDevConfig};
pub use dev::{Lz4eDev, Lz4eDevBuilder};
pub use mapper::lz4e_add_buf_to_bio;
pub use post::{KeepCompressed, PostCompress, RoundTripSource};
pub use req::{
    lz4e_alloc_new_bio, lz4e_bio_bytes_to_pages, lz4e_req_alloc, lz4e_req_free, lz4e_req_init,
    lz4e_req_submit, lz4e_reset_bio, InitFailure, Lz4eReq,
};
pub use stats::{Lz4eStats, StatsSnapshot};
pub use under_dev::{BioPool, MemUnderDev, PoolStats};
