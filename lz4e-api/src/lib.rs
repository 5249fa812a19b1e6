//! LZ4E API - Core interfaces and types for the LZ4E compression filter
//!
//! This crate provides the block I/O types, page memory abstractions and
//! collaborator interfaces shared by the LZ4E request lifecycle controller
//! and the services it drives.
//!
//! # Architecture
//!
//! The API is organized into several key modules:
//!
//! - **Core**: Sectors, device identities, request operations and flags
//! - **Error**: Common error type and the block status space
//! - **Memory**: Page constants and page-addressable buffers
//! - **Bio**: The block I/O descriptor and its fragments
//! - **Chunk**: The compression workspace of one write
//! - **Interfaces**: Device, chunk and statistics services
//!
//! # Usage
//!
//! ```rust
//! use lz4e_api::bio::Bio;
//! use lz4e_api::core::types::{DeviceId, OpFlags, ReqOp};
//! use lz4e_api::memory::{PageBuffer, PAGE_SIZE};
//!
//! let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
//! let mut bio = Bio::new(DeviceId(1), 1, OpFlags::new(ReqOp::Write));
//! let added = bio.add_page(frame.page(0).unwrap(), PAGE_SIZE, 0);
//! assert_eq!(added, PAGE_SIZE);
//! assert_eq!(bio.size(), PAGE_SIZE);
//! ```

#![no_std]
#![warn(missing_docs)]

#[cfg(any(feature = "std", test))]
extern crate std;

extern crate alloc;

// Core modules
pub mod core;
pub mod error;
pub mod memory;
pub mod bio;
pub mod chunk;
pub mod interfaces;

// Re-export commonly used types
pub use crate::core::types::*;
pub use crate::error::{BlkStatus, Error, Result};
pub use crate::bio::{Bio, BioEndIo, BioVec};
pub use crate::chunk::{BioBinding, Lz4eBuffer, Lz4eChunk};
pub use crate::memory::{Page, PageBuffer, PAGE_SIZE, SECTOR_SIZE};
pub use crate::interfaces::{ChunkService, DeviceService, StatsSink};

/// Log target shared by every LZ4E crate
pub const LOG_TARGET: &str = "lz4e";
