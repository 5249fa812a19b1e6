//! Request controller tests

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{caller_bio, fake_bound, FakeChunkService, Fixture};
use lz4e_api::*;
use lz4e_module::*;
use mockall::mock;
use proptest::prelude::*;

mock! {
    pub Stats {}

    impl StatsSink for Stats {
        fn record(&self, bio: &Bio);
    }
}

#[test]
fn test_read_three_fragments() {
    let fx = Fixture::new();
    let frame = PageBuffer::alloc(3 * PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Read, 16, &frame, &[PAGE_SIZE, PAGE_SIZE, 512]);

    let mut req = lz4e_req_alloc().unwrap();
    lz4e_req_init(&mut req, bio, &fx.dev).unwrap();

    let new_bio = req.new_bio().unwrap();
    assert!(new_bio.max_vecs() >= 3);
    assert_eq!(new_bio.op(), ReqOp::Read);
    assert_eq!(new_bio.sector(), 16);
    assert_eq!(new_bio.bdev(), fx.under.config().id);
    assert!(req.chunk().is_none());
    assert_eq!(fx.chunks.allocated(), 0);

    let read_stats: Arc<dyn StatsSink> = fx.read_stats.clone();
    assert!(Arc::ptr_eq(req.stats_to_update().unwrap(), &read_stats));

    lz4e_req_submit(req);
    assert!(done.lock().unwrap().is_empty());
    assert_eq!(fx.under.complete_pending(), 1);

    assert_eq!(*done.lock().unwrap(), [BlkStatus::Ok]);
    assert_eq!(fx.read_stats.snapshot().reqs_total, 1);
    fx.assert_released();
}

#[test]
fn test_write_uses_compression_bound() {
    let fx = Fixture::new();
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, _done) = caller_bio(ReqOp::Write, 8, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    lz4e_req_init(&mut req, bio, &fx.dev).unwrap();

    let chunk = req.chunk().unwrap();
    assert_eq!(fake_bound(PAGE_SIZE), 4108);
    assert_eq!(chunk.dst_buf.buf_size(), 4108);
    assert_eq!(chunk.src_buf.buf_size(), PAGE_SIZE);

    let new_bio = req.new_bio().unwrap();
    assert_eq!(new_bio.max_vecs(), 2);
    assert_eq!(new_bio.op(), ReqOp::Write);
    assert_eq!(new_bio.sector(), 8);
    assert_eq!(new_bio.size(), PAGE_SIZE);
    assert_eq!(new_bio.segments()[0].addr(), chunk.src_buf.data());

    let write_stats: Arc<dyn StatsSink> = fx.write_stats.clone();
    assert!(Arc::ptr_eq(req.stats_to_update().unwrap(), &write_stats));

    lz4e_req_submit(req);
    fx.under.complete_pending();
    fx.assert_released();
}

#[test]
fn test_write_pool_exhausted() {
    let fx = Fixture::with_configs(
        Lz4eConfig::default(),
        MemUnderDevConfig::default().with_pool_size(0),
    );
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    let failure = lz4e_req_init(&mut req, bio, &fx.dev).unwrap_err();

    assert!(matches!(failure.error, Error::ResourceExhausted(_)));
    assert_eq!(failure.status(), BlkStatus::Resource);
    assert_eq!(fx.chunks.allocated(), 1);
    assert_eq!(fx.chunks.freed(), 1);
    assert!(!req.is_initialized());

    // The caller gets its bio back untouched
    let bio = failure.into_bio();
    assert_eq!(bio.size(), PAGE_SIZE);
    assert!(bio.status().is_ok());
    assert!(done.lock().unwrap().is_empty());

    lz4e_req_free(Some(req));
    fx.assert_released();
}

#[test]
fn test_write_dst_mapping_fails() {
    let fx = Fixture::with_configs(
        Lz4eConfig::default().with_max_vecs(1),
        MemUnderDevConfig::default(),
    );
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    let failure = lz4e_req_init(&mut req, bio, &fx.dev).unwrap_err();

    assert!(matches!(failure.error, Error::IoError(_)));
    assert_eq!(fx.chunks.compressed(), 0);
    fx.assert_released();

    failure.complete();
    assert_eq!(*done.lock().unwrap(), [BlkStatus::IoErr]);
    lz4e_req_free(Some(req));
}

#[test]
fn test_write_chunk_alloc_fails() {
    let fx = Fixture::new();
    fx.chunks.fail_alloc.store(true, Ordering::SeqCst);
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, _done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    let failure = lz4e_req_init(&mut req, bio, &fx.dev).unwrap_err();
    assert_eq!(failure.status(), BlkStatus::Resource);
    assert_eq!(fx.under.pool_stats().failed_allocs, 0);
    fx.assert_released();
}

#[test]
fn test_write_compress_fails() {
    let fx = Fixture::new();
    fx.chunks.fail_compress.store(true, Ordering::SeqCst);
    let frame = PageBuffer::alloc(2 * PAGE_SIZE).unwrap();
    let (bio, _done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE, PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    let failure = lz4e_req_init(&mut req, bio, &fx.dev).unwrap_err();
    assert!(matches!(failure.error, Error::IoError(_)));
    assert_eq!(fx.chunks.allocated(), 1);
    fx.assert_released();
}

#[test]
fn test_write_decompress_fails() {
    let fx = Fixture::new();
    fx.chunks.fail_decompress.store(true, Ordering::SeqCst);
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, _done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    let failure = lz4e_req_init(&mut req, bio, &fx.dev).unwrap_err();
    assert_eq!(failure.status(), BlkStatus::IoErr);
    assert_eq!(fx.chunks.compressed(), 1);
    fx.assert_released();
}

#[test]
fn test_unsupported_op() {
    let fx = Fixture::new();
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, _done) = caller_bio(ReqOp::Discard, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    let failure = lz4e_req_init(&mut req, bio, &fx.dev).unwrap_err();
    assert!(matches!(failure.error, Error::Unsupported(_)));
    assert_eq!(failure.status(), BlkStatus::NotSupp);
    assert_eq!(fx.chunks.allocated(), 0);
    assert_eq!(fx.under.pool_stats().used_bios, 0);
}

#[test]
fn test_init_twice_rejected() {
    let fx = Fixture::new();
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (first, _) = caller_bio(ReqOp::Read, 0, &frame, &[PAGE_SIZE]);
    let (second, _) = caller_bio(ReqOp::Read, 8, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    lz4e_req_init(&mut req, first, &fx.dev).unwrap();
    let failure = lz4e_req_init(&mut req, second, &fx.dev).unwrap_err();
    assert_eq!(failure.status(), BlkStatus::Inval);
    assert_eq!(req.original_bio().unwrap().sector(), 0);

    lz4e_req_submit(req);
    fx.under.complete_pending();
    fx.assert_released();
}

#[test]
fn test_free_unsubmitted_request() {
    let fx = Fixture::new();
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    lz4e_req_init(&mut req, bio, &fx.dev).unwrap();
    assert_eq!(fx.under.pool_stats().used_bios, 1);

    lz4e_req_free(Some(req));
    assert_eq!(*done.lock().unwrap(), [BlkStatus::IoErr]);
    fx.assert_released();
}

#[test]
fn test_submit_uninitialized_request() {
    let req = lz4e_req_alloc().unwrap();
    lz4e_req_submit(req);
    lz4e_req_free(None);
}

#[test]
fn test_completion_updates_stats_once() {
    let mut stats = MockStats::new();
    stats
        .expect_record()
        .withf(|bio: &Bio| bio.op() == ReqOp::Write && bio.size() == PAGE_SIZE)
        .times(1)
        .return_const(());

    let under = Arc::new(MemUnderDev::new(MemUnderDevConfig::default()).unwrap());
    let dev = Lz4eDev::builder(under.clone())
        .with_chunks(Arc::new(FakeChunkService::new()))
        .with_write_stats(Arc::new(stats))
        .build()
        .unwrap();

    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);
    let mut req = lz4e_req_alloc().unwrap();
    lz4e_req_init(&mut req, bio, &dev).unwrap();
    lz4e_req_submit(req);

    assert_eq!(under.complete_pending(), 1);
    assert_eq!(under.complete_pending(), 0);
    assert_eq!(*done.lock().unwrap(), [BlkStatus::Ok]);
}

#[test]
fn test_completion_status_is_copied() {
    let fx = Fixture::new();
    fx.under.inject_fault(Some(BlkStatus::Again));
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Read, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    lz4e_req_init(&mut req, bio, &fx.dev).unwrap();
    lz4e_req_submit(req);
    fx.under.complete_pending();

    assert_eq!(*done.lock().unwrap(), [BlkStatus::Again]);
    assert_eq!(fx.read_stats.snapshot().reqs_failed, 1);
    fx.assert_released();
}

#[test]
fn test_round_trip_stage() {
    let chunks = FakeChunkService::new();
    let under = MemUnderDev::new(MemUnderDevConfig::default()).unwrap();
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    frame.write_at(0, b"round trip").unwrap();
    let (original, _) = caller_bio(ReqOp::Write, 24, &frame, &[PAGE_SIZE]);

    let mut chunk = chunks.alloc_chunk(PAGE_SIZE).unwrap();
    let mut new_bio = under.alloc_bio(2, OpFlags::new(ReqOp::Write)).unwrap();
    lz4e_add_buf_to_bio(&mut new_bio, &chunk.dst_buf).unwrap();
    chunk.src_buf.bind(&original);
    chunks.compress(&mut chunk).unwrap();
    chunk.src_buf.with_bytes_mut(|src| src.fill(0));

    RoundTripSource
        .run(&mut chunk, &mut new_bio, &original, &chunks, &under)
        .unwrap();

    assert_eq!(chunks.decompressed(), 1);
    assert_eq!(new_bio.sector(), 24);
    assert_eq!(new_bio.vcnt(), 1);
    assert_eq!(new_bio.size(), PAGE_SIZE);
    assert_eq!(new_bio.segments()[0].addr(), chunk.src_buf.data());
    chunk
        .src_buf
        .with_bytes(|src| assert_eq!(&src[..10], b"round trip"));

    under.put_bio(new_bio);
    chunks.free_chunk(chunk);
}

#[test]
fn test_keep_compressed_stage() {
    let fx = Fixture::with_stage(Box::new(KeepCompressed));
    fx.under.write_at(8 * SECTOR_SIZE, &[0xaa; PAGE_SIZE]).unwrap();

    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    frame.with_bytes_mut(|bytes| bytes.fill(0xbb));
    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);

    let mut req = lz4e_req_alloc().unwrap();
    lz4e_req_init(&mut req, bio, &fx.dev).unwrap();
    let new_bio = req.new_bio().unwrap();
    assert_eq!(new_bio.size(), PAGE_SIZE);
    assert_eq!(new_bio.sector(), 0);
    assert_eq!(fx.chunks.decompressed(), 0);

    lz4e_req_submit(req);
    fx.under.complete_pending();
    assert_eq!(*done.lock().unwrap(), [BlkStatus::Ok]);
    assert_eq!(fx.write_stats.snapshot().bytes_total, PAGE_SIZE as u64);

    let mut stored = vec![0u8; 2 * PAGE_SIZE];
    fx.under.read_at(0, &mut stored).unwrap();
    assert!(stored[..PAGE_SIZE].iter().all(|&b| b == 0xbb));
    assert!(stored[PAGE_SIZE..].iter().all(|&b| b == 0xaa));
    fx.assert_released();
}

#[test]
fn test_keep_compressed_larger_than_request() {
    let fx = Fixture::with_stage(Box::new(KeepCompressed));
    let frame = PageBuffer::alloc(PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[100]);

    fx.dev.submit_bio(bio);
    assert_eq!(*done.lock().unwrap(), [BlkStatus::IoErr]);
    assert_eq!(fx.under.pending(), 0);
    assert_eq!(fx.chunks.compressed(), 1);
    assert_eq!(fx.write_stats.snapshot().reqs_total, 0);
    fx.assert_released();
}

proptest! {
    #[test]
    fn prop_mapper_fragments(offset in 0usize..PAGE_SIZE, len in 1usize..(8 * PAGE_SIZE)) {
        let frame = PageBuffer::alloc(offset + len).unwrap();
        let buf = Lz4eBuffer::from_frame(frame, offset, len).unwrap();
        let mut bio = Bio::new(DeviceId(1), BIO_MAX_VECS, OpFlags::new(ReqOp::Write));

        lz4e_add_buf_to_bio(&mut bio, &buf).unwrap();

        let segs = bio.segments();
        prop_assert_eq!(segs.iter().map(|bv| bv.len).sum::<usize>(), len);
        prop_assert_eq!(segs[0].addr(), buf.data());
        for bv in &segs[1..] {
            prop_assert_eq!(bv.offset, 0);
        }
        for bv in segs {
            prop_assert!(bv.offset + bv.len <= PAGE_SIZE);
        }
        for pair in segs.windows(2) {
            prop_assert_eq!(pair[0].addr() + pair[0].len, pair[1].addr());
        }
    }

    #[test]
    fn prop_mapper_exhaustion_leaves_bio(
        prefix in 0usize..4,
        max_vecs in 1u16..6,
        len in 1usize..(8 * PAGE_SIZE),
    ) {
        let frame = PageBuffer::alloc(4 * PAGE_SIZE).unwrap();
        let mut bio = Bio::new(DeviceId(1), max_vecs, OpFlags::new(ReqOp::Write));
        for i in 0..prefix {
            bio.add_page(frame.page(i).unwrap(), 512, 0);
        }
        let vcnt = bio.vcnt();
        let size = bio.size();

        let buf = Lz4eBuffer::alloc(len).unwrap();
        let needed = len.div_ceil(PAGE_SIZE);
        match lz4e_add_buf_to_bio(&mut bio, &buf) {
            Ok(()) => {
                prop_assert!(vcnt + needed <= usize::from(max_vecs));
                prop_assert_eq!(bio.size(), size + len);
            }
            Err(err) => {
                prop_assert!(matches!(err, Error::TemporaryFailure(_)));
                prop_assert!(vcnt + needed > usize::from(max_vecs));
                prop_assert_eq!(bio.vcnt(), vcnt);
                prop_assert_eq!(bio.size(), size);
            }
        }
    }

    #[test]
    fn prop_write_shadow_capacity(len in 1usize..(64 * PAGE_SIZE)) {
        let fx = Fixture::new();
        let pages = len.div_ceil(PAGE_SIZE);
        let frame = PageBuffer::alloc(len).unwrap();
        let mut lens = vec![PAGE_SIZE; pages];
        lens[pages - 1] = len - (pages - 1) * PAGE_SIZE;
        let (bio, _done) = caller_bio(ReqOp::Write, 0, &frame, &lens);

        let mut req = lz4e_req_alloc().unwrap();
        lz4e_req_init(&mut req, bio, &fx.dev).unwrap();

        let chunk = req.chunk().unwrap();
        prop_assert!(chunk.dst_buf.buf_size() >= fake_bound(len));
        let new_bio = req.new_bio().unwrap();
        prop_assert_eq!(
            new_bio.max_vecs(),
            usize::from(lz4e_bio_bytes_to_pages(fake_bound(len), BIO_MAX_VECS))
        );
        prop_assert_eq!(new_bio.size(), len);

        lz4e_req_submit(req);
        fx.under.complete_pending();
        fx.assert_released();
    }
}
