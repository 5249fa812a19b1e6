//! Page memory module
//!
//! Page constants, address helpers and the page-aligned buffers that block
//! I/O descriptors point into.

pub mod page;
pub mod buffer;

pub use page::{
    PAGE_SIZE, PAGE_SHIFT, SECTOR_SIZE, bytes_to_pages, offset_in_page, page_round_down,
    page_round_up,
};
pub use buffer::{Page, PageBuffer};
