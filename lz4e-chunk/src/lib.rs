//! LZ4E Chunk
//!
//! This crate provides the LZ4 chunk service used by the LZ4E compression
//! filter. A chunk pairs a source buffer, which receives the gathered write
//! payload, with a destination buffer sized to the LZ4 worst case.
//!
//! # Usage
//!
//! ```rust
//! use lz4e_api::{Bio, ChunkService, DeviceId, OpFlags, PageBuffer, ReqOp};
//! use lz4e_chunk::Lz4ChunkService;
//!
//! let service = Lz4ChunkService::new();
//! let payload = PageBuffer::alloc(4096).unwrap();
//! let mut bio = Bio::new(DeviceId(1), 1, OpFlags::new(ReqOp::Write));
//! bio.add_page(payload.page(0).unwrap(), 4096, 0);
//!
//! let mut chunk = service.alloc_chunk(bio.size()).unwrap();
//! chunk.src_buf.bind(&bio);
//! service.compress(&mut chunk).unwrap();
//! assert!(chunk.dst_buf.data_size() < 4096);
//! service.free_chunk(chunk);
//! ```

#![no_std]
#![warn(missing_docs)]

extern crate alloc;

pub mod lz4;

pub use lz4::{lz4_compress_bound, ChunkStats, Lz4ChunkService, DEFAULT_MAX_CHUNK_SIZE};
