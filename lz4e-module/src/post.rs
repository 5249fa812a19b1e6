//! Post-compress stage
//!
//! Runs on a write after the payload has been compressed into the chunk's
//! destination buffer and before the shadow bio is dispatched. The stage
//! decides what the shadow bio finally carries.

use alloc::sync::Arc;

use lz4e_api::chunk::{Lz4eBuffer, Lz4eChunk};
use lz4e_api::error::{io_error, Result};
use lz4e_api::interfaces::{ChunkService, DeviceService};
use lz4e_api::{Bio, SECTOR_SIZE};

use crate::mapper::lz4e_add_buf_to_bio;
use crate::req::lz4e_reset_bio;
use crate::{lz4e_debug, lz4e_err};

/// Trait for the stage between compression and dispatch of a write
pub trait PostCompress: Send + Sync {
    /// Name of the stage, for logging
    fn name(&self) -> &'static str;

    /// Finish the shadow bio of a write
    ///
    /// On entry `new_bio` holds the mapped destination buffer and
    /// `chunk.dst_buf` holds the compressed payload of `original`. Any error
    /// fails the write; the caller releases `new_bio` and `chunk`.
    fn run(
        &self,
        chunk: &mut Lz4eChunk,
        new_bio: &mut Bio,
        original: &Bio,
        chunks: &dyn ChunkService,
        under_dev: &dyn DeviceService,
    ) -> Result<()>;
}

/// Round-trip the payload and persist the restored source buffer
///
/// Decompresses `dst_buf` back into `src_buf`, resets the shadow bio to the
/// original's sector and flags, then maps `src_buf` onto it.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundTripSource;

impl PostCompress for RoundTripSource {
    fn name(&self) -> &'static str {
        "round-trip-source"
    }

    fn run(
        &self,
        chunk: &mut Lz4eChunk,
        new_bio: &mut Bio,
        original: &Bio,
        chunks: &dyn ChunkService,
        under_dev: &dyn DeviceService,
    ) -> Result<()> {
        chunks.decompress(chunk).map_err(|err| {
            lz4e_err!("failed to decompress data: {}", err);
            io_error("decompression failed")
        })?;

        lz4e_reset_bio(new_bio, original, under_dev);

        lz4e_add_buf_to_bio(new_bio, &chunk.src_buf).map_err(|err| {
            lz4e_err!("failed to add src buffer to bio: {}", err);
            io_error("failed to map source buffer")
        })?;

        lz4e_debug!("post-compress stage {} done", self.name());
        Ok(())
    }
}

/// Persist the compressed payload, padded to whole sectors
///
/// Remaps the shadow bio onto the first `data_size` bytes of `dst_buf`
/// rounded up to `SECTOR_SIZE`. A payload that does not shrink below the
/// original's extent fails the write, since the shadow bio may never touch
/// sectors the caller did not address.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepCompressed;

impl PostCompress for KeepCompressed {
    fn name(&self) -> &'static str {
        "keep-compressed"
    }

    fn run(
        &self,
        chunk: &mut Lz4eChunk,
        new_bio: &mut Bio,
        original: &Bio,
        _chunks: &dyn ChunkService,
        under_dev: &dyn DeviceService,
    ) -> Result<()> {
        let len = chunk.dst_buf.data_size().next_multiple_of(SECTOR_SIZE);
        if len > original.size() {
            lz4e_err!(
                "compressed payload of {} bytes exceeds request of {} bytes",
                len,
                original.size()
            );
            return Err(io_error("compressed payload exceeds request extent"));
        }

        let payload = Lz4eBuffer::from_frame(
            Arc::clone(chunk.dst_buf.frame()),
            chunk.dst_buf.offset(),
            len,
        )?;

        lz4e_reset_bio(new_bio, original, under_dev);

        lz4e_add_buf_to_bio(new_bio, &payload).map_err(|err| {
            lz4e_err!("failed to add compressed payload to bio: {}", err);
            io_error("failed to map compressed payload")
        })?;

        lz4e_debug!(
            "post-compress stage {} done, {} of {} bytes",
            self.name(),
            len,
            original.size()
        );
        Ok(())
    }
}
