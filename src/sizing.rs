/// Page-aligned sizing for executable mappings
///
/// The OS hands out mappings in whole pages, so a code image of any size
/// is rounded up to the smallest page multiple that holds it.
use std::sync::OnceLock;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// OS-reported page size, queried once per process
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize })
}

/// Smallest positive page multiple that is >= `len`
///
/// Never returns 0: an empty image still occupies one page.
pub fn page_aligned_size(len: usize) -> usize {
    let page = page_size();
    len.div_ceil(page).max(1) * page
}
