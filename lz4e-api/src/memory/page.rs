//! Page size constants and address arithmetic

use crate::core::types::SECTOR_SHIFT;
use static_assertions::const_assert;

/// Page size (4KB)
pub const PAGE_SIZE: usize = 4096;
/// Page shift (log2 of PAGE_SIZE)
pub const PAGE_SHIFT: usize = 12;
/// Sector size (512B)
pub const SECTOR_SIZE: usize = 1 << SECTOR_SHIFT;

const_assert!(PAGE_SIZE == 1 << PAGE_SHIFT);
const_assert!(PAGE_SIZE % SECTOR_SIZE == 0);

/// Align address down to page boundary
#[inline]
pub const fn page_round_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}

/// Align address up to page boundary
#[inline]
pub const fn page_round_up(addr: usize) -> usize {
    (addr + PAGE_SIZE - 1) & !(PAGE_SIZE - 1)
}

/// Offset of an address within its page
#[inline]
pub const fn offset_in_page(addr: usize) -> usize {
    addr & (PAGE_SIZE - 1)
}

/// Number of pages needed to hold `bytes`
#[inline]
pub const fn bytes_to_pages(bytes: usize) -> usize {
    bytes.div_ceil(PAGE_SIZE)
}
