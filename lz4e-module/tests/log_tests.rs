//! Logging tests

mod common;

use std::sync::{Arc, Mutex};

use common::caller_bio;
use lz4e_api::*;
use lz4e_chunk::Lz4ChunkService;
use lz4e_module::*;
use log::{LevelFilter, Log, Metadata, Record};

struct CaptureLogger {
    records: Mutex<Vec<(String, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata<'_>) -> bool {
        true
    }

    fn log(&self, record: &Record<'_>) {
        self.records
            .lock()
            .unwrap()
            .push((record.target().to_string(), record.args().to_string()));
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    records: Mutex::new(Vec::new()),
};

#[test]
fn test_every_message_uses_filter_target() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Trace);

    let under = Arc::new(MemUnderDev::new(MemUnderDevConfig::default()).unwrap());
    let dev = Lz4eDev::builder(under.clone())
        .with_chunks(Arc::new(Lz4ChunkService::new()))
        .build()
        .unwrap();

    let frame = PageBuffer::alloc(2 * PAGE_SIZE).unwrap();
    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE, PAGE_SIZE]);
    dev.submit_bio(bio);
    under.complete_pending();
    assert_eq!(*done.lock().unwrap(), [BlkStatus::Ok]);

    let (bio, done) = caller_bio(ReqOp::Write, 0, &frame, &[PAGE_SIZE]);
    under.inject_fault(Some(BlkStatus::IoErr));
    dev.submit_bio(bio);
    under.complete_pending();
    assert_eq!(*done.lock().unwrap(), [BlkStatus::IoErr]);

    let records = LOGGER.records.lock().unwrap();
    assert!(records.iter().any(|(_, msg)| msg.contains("compressed")));
    assert!(records.iter().any(|(_, msg)| msg.contains("allocated chunk")));
    for (target, msg) in records.iter() {
        assert_eq!(target, LOG_TARGET, "{}", msg);
        assert!(msg.starts_with("lz4e: "), "{}", msg);
    }
}
