//! Request lifecycle controller
//!
//! Every bio arriving at the filter gets a request context. The context
//! owns a shadow bio bound to the underlying device and, for writes, the
//! chunk the payload was compressed in. The shadow bio is dispatched with a
//! completion continuation that carries the context; the continuation
//! accounts the request, completes the original bio and releases everything
//! the context holds.
//!
//! # Lifecycle
//!
//! ```text
//! lz4e_req_alloc -> lz4e_req_init -> lz4e_req_submit -> (device) -> lz4e_end_io
//!                         |
//!                         +-> InitFailure: original bio handed back
//! ```

use alloc::alloc::Layout;
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::ptr::NonNull;

use lz4e_api::chunk::Lz4eChunk;
use lz4e_api::error::{
    invalid_argument, io_error, resource_exhausted, unsupported, BlkStatus, Error, Result,
};
use lz4e_api::interfaces::{ChunkService, DeviceService, StatsSink};
use lz4e_api::memory::bytes_to_pages;
use lz4e_api::{Bio, OpFlags, ReqOp};
use scopeguard::{guard, ScopeGuard};

use crate::dev::Lz4eDev;
use crate::mapper::lz4e_add_buf_to_bio;
use crate::{lz4e_debug, lz4e_err, lz4e_info, lz4e_warn};

/// Request context
///
/// Empty after allocation. `lz4e_req_init` fills every field at once, so a
/// context is either fully initialized or untouched.
#[derive(Default)]
pub struct Lz4eReq {
    original_bio: Option<Box<Bio>>,
    new_bio: Option<Box<Bio>>,
    stats_to_update: Option<Arc<dyn StatsSink>>,
    chunk: Option<Lz4eChunk>,
    under_dev: Option<Arc<dyn DeviceService>>,
    chunks: Option<Arc<dyn ChunkService>>,
}

impl Lz4eReq {
    /// Caller's bio
    pub fn original_bio(&self) -> Option<&Bio> {
        self.original_bio.as_deref()
    }

    /// Shadow bio bound to the underlying device
    pub fn new_bio(&self) -> Option<&Bio> {
        self.new_bio.as_deref()
    }

    /// Statistics updated on completion
    pub fn stats_to_update(&self) -> Option<&Arc<dyn StatsSink>> {
        self.stats_to_update.as_ref()
    }

    /// Compression workspace, writes only
    pub fn chunk(&self) -> Option<&Lz4eChunk> {
        self.chunk.as_ref()
    }

    /// Check whether `lz4e_req_init` succeeded on this context
    pub fn is_initialized(&self) -> bool {
        self.original_bio.is_some()
    }
}

impl fmt::Debug for Lz4eReq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lz4eReq")
            .field("original_bio", &self.original_bio)
            .field("new_bio", &self.new_bio)
            .field("has_stats", &self.stats_to_update.is_some())
            .field("chunk", &self.chunk)
            .finish()
    }
}

impl Drop for Lz4eReq {
    fn drop(&mut self) {
        if let (Some(chunk), Some(chunks)) = (self.chunk.take(), self.chunks.as_ref()) {
            chunks.free_chunk(chunk);
        }

        if let Some(new_bio) = self.new_bio.take() {
            lz4e_warn!("releasing request context with an unsubmitted bio");
            match self.under_dev.as_ref() {
                Some(under_dev) => under_dev.put_bio(new_bio),
                None => drop(new_bio),
            }
        }

        if let Some(mut original_bio) = self.original_bio.take() {
            lz4e_warn!("releasing request context before completion");
            original_bio.set_status(BlkStatus::IoErr);
            original_bio.endio();
        }
    }
}

/// Failed initialization
///
/// Hands the original bio back to the caller, untouched, together with the
/// reason.
pub struct InitFailure {
    /// Reason of the failure
    pub error: Error,
    /// The caller's bio
    pub bio: Box<Bio>,
}

impl InitFailure {
    /// Status to complete the original bio with
    pub fn status(&self) -> BlkStatus {
        BlkStatus::from(&self.error)
    }

    /// Take the original bio back
    pub fn into_bio(self) -> Box<Bio> {
        self.bio
    }

    /// Complete the original bio with the failure status
    pub fn complete(self) {
        let status = self.status();
        let mut bio = self.bio;
        bio.set_status(status);
        bio.endio();
    }
}

impl fmt::Debug for InitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitFailure")
            .field("error", &self.error)
            .field("bio", &self.bio)
            .finish()
    }
}

/// Release a request context
///
/// Frees the chunk through the chunk service. Accepts `None`.
pub fn lz4e_req_free(req: Option<Box<Lz4eReq>>) {
    let Some(req) = req else {
        return;
    };

    drop(req);

    lz4e_debug!("released request context");
}

/// Allocate an empty request context
///
/// Reports allocation failure as `Error::OutOfMemory` instead of aborting.
pub fn lz4e_req_alloc() -> Result<Box<Lz4eReq>> {
    let layout = Layout::new::<Lz4eReq>();

    // SAFETY: `Lz4eReq` is not zero-sized. The memory comes back
    // uninitialized, not zeroed, and is not read before the write below.
    let raw = unsafe { alloc::alloc::alloc(layout) }.cast::<Lz4eReq>();
    let ptr = NonNull::new(raw).ok_or_else(|| {
        lz4e_err!("failed to allocate request context");
        Error::OutOfMemory
    })?;

    // SAFETY: `ptr` was allocated by the global allocator with the layout of
    // `Lz4eReq`. The empty context is built by `Lz4eReq::default()` on the
    // stack and moved in with `write`, which never reads or drops the
    // uninitialized bytes, so the box only ever owns an initialized value.
    let req = unsafe {
        ptr.as_ptr().write(Lz4eReq::default());
        Box::from_raw(ptr.as_ptr())
    };

    lz4e_debug!("allocated request context");
    Ok(req)
}

/// Fields produced by a successful initialization
struct ReqParts {
    new_bio: Box<Bio>,
    stats_to_update: Arc<dyn StatsSink>,
    chunk: Option<Lz4eChunk>,
}

fn lz4e_read_req_init(original_bio: &Bio, lzdev: &Lz4eDev) -> Result<ReqParts> {
    let under_dev = lzdev.under_dev();
    let nr_vecs = u16::try_from(original_bio.vcnt()).unwrap_or(u16::MAX);
    let opf = OpFlags::with_flags(ReqOp::Read, original_bio.opf().flags);

    let new_bio = under_dev.alloc_bio(nr_vecs, opf).map_err(|err| {
        lz4e_err!("failed to alloc new bio: {}", err);
        resource_exhausted("read bio")
    })?;
    let mut new_bio = guard(new_bio, |bio| under_dev.put_bio(bio));
    new_bio.set_sector(original_bio.sector());

    // The device reads straight into the caller's pages
    for bv in original_bio.segments() {
        if new_bio.add_page(bv.page.clone(), bv.len, bv.offset) != bv.len {
            lz4e_err!("failed to add page to read bio");
            return Err(io_error("failed to clone read fragments"));
        }
    }

    lz4e_debug!("initialized read request");
    Ok(ReqParts {
        new_bio: ScopeGuard::into_inner(new_bio),
        stats_to_update: Arc::clone(lzdev.read_stats()),
        chunk: None,
    })
}

/// Number of fragments needed for `bytes`, capped at `max_vecs`
#[inline]
pub fn lz4e_bio_bytes_to_pages(bytes: usize, max_vecs: u16) -> u16 {
    let pages = bytes_to_pages(bytes).min(usize::from(max_vecs));
    u16::try_from(pages).unwrap_or(max_vecs)
}

/// Allocate the shadow bio of a write
///
/// Sized for the compression bound of the original payload, bound to the
/// underlying device with the original's flags and sector.
pub fn lz4e_alloc_new_bio(original_bio: &Bio, lzdev: &Lz4eDev) -> Result<Box<Bio>> {
    let bsize = lzdev.chunks().compress_bound(original_bio.size());
    let nr_vecs = lz4e_bio_bytes_to_pages(bsize, lzdev.config().max_vecs);

    let mut new_bio = lzdev
        .under_dev()
        .alloc_bio(nr_vecs, original_bio.opf())
        .map_err(|err| {
            lz4e_err!("failed to allocate new bio: {}", err);
            err
        })?;
    new_bio.set_sector(original_bio.sector());

    lz4e_debug!("allocated new bio");
    Ok(new_bio)
}

/// Empty `bio` and re-address it like `original_bio`
pub fn lz4e_reset_bio(bio: &mut Bio, original_bio: &Bio, under_dev: &dyn DeviceService) {
    under_dev.reset_bio(bio, original_bio.opf());
    bio.set_sector(original_bio.sector());

    lz4e_debug!("reset new bio");
}

fn lz4e_write_req_init(original_bio: &Bio, lzdev: &Lz4eDev) -> Result<ReqParts> {
    let chunks = lzdev.chunks();
    let under_dev = lzdev.under_dev();

    let chunk = chunks.alloc_chunk(original_bio.size()).map_err(|err| {
        lz4e_err!("failed to allocate chunk: {}", err);
        resource_exhausted("chunk")
    })?;
    let mut chunk = guard(chunk, |chunk| chunks.free_chunk(chunk));

    // Declared after the chunk so it is released first
    let new_bio = lz4e_alloc_new_bio(original_bio, lzdev)
        .map_err(|_| resource_exhausted("write bio"))?;
    let mut new_bio = guard(new_bio, |bio| under_dev.put_bio(bio));

    lz4e_add_buf_to_bio(&mut new_bio, &chunk.dst_buf).map_err(|err| {
        lz4e_err!("failed to add dst buffer to bio: {}", err);
        io_error("failed to map destination buffer")
    })?;

    chunk.src_buf.bind(original_bio);
    chunk.dst_buf.bind(&new_bio);

    chunks.compress(&mut chunk).map_err(|err| {
        lz4e_err!("failed to compress data: {}", err);
        io_error("compression failed")
    })?;

    lzdev
        .post_compress()
        .run(
            &mut chunk,
            &mut new_bio,
            original_bio,
            &**chunks,
            &**under_dev,
        )
        .map_err(|err| match err {
            Error::IoError(_) => err,
            other => {
                lz4e_err!("post-compress stage failed: {}", other);
                io_error("post-compress stage failed")
            }
        })?;

    lz4e_debug!("initialized write request");
    Ok(ReqParts {
        new_bio: ScopeGuard::into_inner(new_bio),
        stats_to_update: Arc::clone(lzdev.write_stats()),
        chunk: Some(ScopeGuard::into_inner(chunk)),
    })
}

/// Initialize `req` for `original_bio`
///
/// Reads get a shadow bio sharing the original's pages. Writes are
/// compressed and run through the device's post-compress stage. Any other
/// operation is rejected with `Error::Unsupported`.
///
/// On failure nothing is left allocated and the original bio comes back in
/// the `InitFailure`.
pub fn lz4e_req_init(
    req: &mut Lz4eReq,
    original_bio: Box<Bio>,
    lzdev: &Lz4eDev,
) -> core::result::Result<(), InitFailure> {
    if req.is_initialized() {
        return Err(InitFailure {
            error: invalid_argument("request context already initialized"),
            bio: original_bio,
        });
    }

    let parts = match original_bio.op() {
        ReqOp::Read => lz4e_read_req_init(&original_bio, lzdev),
        ReqOp::Write => lz4e_write_req_init(&original_bio, lzdev),
        op => {
            lz4e_err!("unsupported request operation {:?}", op);
            Err(unsupported("request operation"))
        }
    };

    match parts {
        Ok(parts) => {
            req.original_bio = Some(original_bio);
            req.new_bio = Some(parts.new_bio);
            req.stats_to_update = Some(parts.stats_to_update);
            req.chunk = parts.chunk;
            req.under_dev = Some(Arc::clone(lzdev.under_dev()));
            req.chunks = Some(Arc::clone(lzdev.chunks()));
            Ok(())
        }
        Err(error) => Err(InitFailure {
            error,
            bio: original_bio,
        }),
    }
}

fn lz4e_end_io(new_bio: Box<Bio>, mut req: Box<Lz4eReq>) {
    if let Some(stats_to_update) = req.stats_to_update.as_ref() {
        stats_to_update.record(&new_bio);
    }

    lz4e_info!("completed bio request");

    if let Some(mut original_bio) = req.original_bio.take() {
        original_bio.set_status(new_bio.status());
        original_bio.endio();
    }

    match req.under_dev.as_ref() {
        Some(under_dev) => under_dev.put_bio(new_bio),
        None => drop(new_bio),
    }
    lz4e_req_free(Some(req));
}

/// Dispatch an initialized request
///
/// Consumes the context; it comes back only inside the completion
/// continuation. A context that was never initialized is released and its
/// original bio, if any, failed.
pub fn lz4e_req_submit(mut req: Box<Lz4eReq>) {
    let (Some(new_bio), Some(under_dev)) = (req.new_bio.take(), req.under_dev.clone()) else {
        lz4e_err!("submitted request without a new bio");
        lz4e_req_free(Some(req));
        return;
    };

    under_dev.submit_bio(new_bio, Box::new(move |new_bio| lz4e_end_io(new_bio, req)));

    lz4e_debug!("submitted request to underlying device");
}
