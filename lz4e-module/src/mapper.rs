//! Buffer mapper
//!
//! Splits a contiguous buffer into page-bounded fragments and appends them
//! to a descriptor. The first fragment starts at the buffer's offset in its
//! page; every later fragment starts at offset 0.
//!
//! Mapping is all-or-nothing: when the descriptor runs out of fragment slots
//! it is truncated back to the fragments it had before the call.

use lz4e_api::chunk::Lz4eBuffer;
use lz4e_api::error::{temporary_failure, Result};
use lz4e_api::memory::{offset_in_page, PAGE_SIZE};
use lz4e_api::Bio;

use crate::{lz4e_debug, lz4e_err};

/// Append `buf` to `bio` as page-bounded fragments
///
/// Maps the full capacity of the buffer. Fails with
/// `Error::TemporaryFailure` if `bio` cannot hold every fragment, in which
/// case `bio` is left as it was.
pub fn lz4e_add_buf_to_bio(bio: &mut Bio, buf: &Lz4eBuffer) -> Result<()> {
    let start_vcnt = bio.vcnt();
    let frame = buf.frame();

    let mut data = buf.data();
    let mut buf_len = buf.buf_size();
    let mut page_off = offset_in_page(data);
    let mut page_len = buf_len.min(PAGE_SIZE - page_off);

    while buf_len > 0 {
        let added = match frame.virt_to_page(data) {
            Some(page) => bio.add_page(page, page_len, page_off),
            None => 0,
        };
        if added != page_len {
            lz4e_err!("failed to add page to bio");
            bio.truncate_vecs(start_vcnt);
            return Err(temporary_failure("bio fragment capacity exhausted"));
        }

        data += page_len;
        buf_len -= page_len;

        page_off = 0;
        page_len = buf_len.min(PAGE_SIZE);
    }

    lz4e_debug!("added buffer to bio");
    Ok(())
}
