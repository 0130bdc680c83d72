//! Page-granular anonymous and file-backed memory mappings.

pub mod mapped_region;

#[cfg_attr(unix, path = "mmap_unix.rs")]
#[cfg_attr(windows, path = "mmap_win.rs")]
#[cfg_attr(not(any(unix, windows)), path = "mmap_fallback.rs")]
pub mod mmap;

pub use mapped_region::MappedRegion;

/// Rounds `size` up to whole pages. A zero `size` occupies one page.
///
/// Fails with `OutOfMemory` when the rounded length cannot be represented.
pub(crate) fn page_capacity(size: usize) -> std::io::Result<usize> {
    pixmem_bytes::align::checked_align_up(size.max(1), mmap::get_page_size()).ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "mapping length overflows the address space",
        )
    })
}

#[cfg(test)]
mod tests;
