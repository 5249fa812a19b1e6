//! Virtual device
//!
//! `Lz4eDev` ties the filter together: configuration, the underlying
//! device, the chunk service, per-direction statistics and the
//! post-compress stage. Its `submit_bio` is the block-device entry point.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;

use lz4e_api::error::{invalid_argument, Result};
use lz4e_api::interfaces::{ChunkService, DeviceService, StatsSink};
use lz4e_api::{Bio, BlkStatus};
use lz4e_chunk::Lz4ChunkService;

use crate::config::Lz4eConfig;
use crate::post::{PostCompress, RoundTripSource};
use crate::req::{lz4e_req_alloc, lz4e_req_free, lz4e_req_init, lz4e_req_submit};
use crate::stats::Lz4eStats;
use crate::{lz4e_err, lz4e_info};

/// Compression filter device
pub struct Lz4eDev {
    config: Lz4eConfig,
    under_dev: Arc<dyn DeviceService>,
    chunks: Arc<dyn ChunkService>,
    read_stats: Arc<dyn StatsSink>,
    write_stats: Arc<dyn StatsSink>,
    post_compress: Box<dyn PostCompress>,
}

impl Lz4eDev {
    /// Start building a device on top of `under_dev`
    pub fn builder(under_dev: Arc<dyn DeviceService>) -> Lz4eDevBuilder {
        Lz4eDevBuilder::new(under_dev)
    }

    /// Device configuration
    pub fn config(&self) -> &Lz4eConfig {
        &self.config
    }

    /// Underlying device
    pub fn under_dev(&self) -> &Arc<dyn DeviceService> {
        &self.under_dev
    }

    /// Chunk service
    pub fn chunks(&self) -> &Arc<dyn ChunkService> {
        &self.chunks
    }

    /// Statistics of completed reads
    pub fn read_stats(&self) -> &Arc<dyn StatsSink> {
        &self.read_stats
    }

    /// Statistics of completed writes
    pub fn write_stats(&self) -> &Arc<dyn StatsSink> {
        &self.write_stats
    }

    /// Stage run between compression and dispatch of writes
    pub fn post_compress(&self) -> &dyn PostCompress {
        &*self.post_compress
    }

    /// Accept a bio addressed to this device
    ///
    /// Returns once the shadow bio is dispatched. If the request cannot be
    /// set up, `bio` is completed right away with the failure status. A bio
    /// addressed to another device completes with `BlkStatus::Inval`.
    pub fn submit_bio(&self, mut bio: Box<Bio>) {
        if bio.bdev() != self.config.id {
            lz4e_err!(
                "{}: bio for {} submitted to {}",
                self.config.name,
                bio.bdev(),
                self.config.id
            );
            bio.set_status(BlkStatus::Inval);
            bio.endio();
            return;
        }

        let mut req = match lz4e_req_alloc() {
            Ok(req) => req,
            Err(err) => {
                bio.set_status(BlkStatus::from(&err));
                bio.endio();
                return;
            }
        };

        if let Err(failure) = lz4e_req_init(&mut req, bio, self) {
            lz4e_err!("{}: failed to init request: {}", self.config.name, failure.error);
            lz4e_req_free(Some(req));
            failure.complete();
            return;
        }

        lz4e_req_submit(req);
    }
}

impl fmt::Debug for Lz4eDev {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lz4eDev")
            .field("config", &self.config)
            .field("under_dev", &self.under_dev.id())
            .field("post_compress", &self.post_compress.name())
            .finish()
    }
}

/// Builder for `Lz4eDev`
///
/// Unset collaborators default to an `Lz4ChunkService`, fresh `Lz4eStats`
/// and the `RoundTripSource` stage.
pub struct Lz4eDevBuilder {
    config: Lz4eConfig,
    under_dev: Arc<dyn DeviceService>,
    chunks: Option<Arc<dyn ChunkService>>,
    read_stats: Option<Arc<dyn StatsSink>>,
    write_stats: Option<Arc<dyn StatsSink>>,
    post_compress: Option<Box<dyn PostCompress>>,
}

impl Lz4eDevBuilder {
    /// Creates a new device builder
    pub fn new(under_dev: Arc<dyn DeviceService>) -> Self {
        Self {
            config: Lz4eConfig::default(),
            under_dev,
            chunks: None,
            read_stats: None,
            write_stats: None,
            post_compress: None,
        }
    }

    /// Sets the configuration
    pub fn with_config(mut self, config: Lz4eConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the chunk service
    pub fn with_chunks(mut self, chunks: Arc<dyn ChunkService>) -> Self {
        self.chunks = Some(chunks);
        self
    }

    /// Sets the read statistics sink
    pub fn with_read_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.read_stats = Some(stats);
        self
    }

    /// Sets the write statistics sink
    pub fn with_write_stats(mut self, stats: Arc<dyn StatsSink>) -> Self {
        self.write_stats = Some(stats);
        self
    }

    /// Sets the post-compress stage
    pub fn with_post_compress(mut self, stage: Box<dyn PostCompress>) -> Self {
        self.post_compress = Some(stage);
        self
    }

    /// Builds the device
    pub fn build(self) -> Result<Arc<Lz4eDev>> {
        self.config.validate()?;
        if self.config.id == self.under_dev.id() {
            lz4e_err!(
                "{}: device id {} is taken by the underlying device",
                self.config.name,
                self.config.id
            );
            return Err(invalid_argument("device id equals underlying device id"));
        }

        let dev = Lz4eDev {
            config: self.config,
            under_dev: self.under_dev,
            chunks: self
                .chunks
                .unwrap_or_else(|| Arc::new(Lz4ChunkService::new())),
            read_stats: self.read_stats.unwrap_or_else(|| Arc::new(Lz4eStats::new())),
            write_stats: self.write_stats.unwrap_or_else(|| Arc::new(Lz4eStats::new())),
            post_compress: self
                .post_compress
                .unwrap_or_else(|| Box::new(RoundTripSource)),
        };

        lz4e_info!(
            "{}: created on top of {} with post-compress stage {}",
            dev.config.name,
            dev.under_dev.id(),
            dev.post_compress.name()
        );
        Ok(Arc::new(dev))
    }
}
