//! Portable emulation of anonymous page mappings on top of the global
//! allocator, for targets without a native implementation.
//! File-backed mappings are not available here.

use std::{
    alloc::{Layout, alloc_zeroed, dealloc},
    fs::File,
};

use pixmem_bytes::align::is_aligned;

/// Allocates zeroed, page-aligned memory (emulated).
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let layout = page_layout(size)?;
    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "Failed to allocate memory",
        ));
    }
    Ok((ptr as *mut std::ffi::c_void, layout.size()))
}

/// Frees memory returned by [`allocate`].
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    assert!(is_aligned(size, get_page_size()));
    let layout = page_layout(size)?;
    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

pub fn map_file(_file: &File, _size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "file-backed mappings are not supported on this platform",
    ))
}

/// Extends `file` to `len` bytes.
pub fn reserve_file(file: &File, len: u64) -> std::io::Result<()> {
    file.set_len(len)
}

pub unsafe fn unmap_file(_ptr: *mut std::ffi::c_void, _size: usize) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "file-backed mappings are not supported on this platform",
    ))
}

pub fn supports_file_mapping() -> bool {
    false
}

/// Returns the emulated page size in bytes.
pub fn get_page_size() -> usize {
    4 * 1024
}

fn page_layout(size: usize) -> std::io::Result<Layout> {
    let capacity = crate::page_capacity(size)?;
    Layout::from_size_align(capacity, get_page_size())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "Invalid layout"))
}
