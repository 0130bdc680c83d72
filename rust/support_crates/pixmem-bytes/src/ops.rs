//! Bulk byte manipulation used by pixel and buffer code.
//!
//! Both primitives trust the caller's `size` and never touch memory outside
//! `[ptr, ptr + size)`.

/// Copies `size` bytes from `source` to `destination` and returns `destination`.
///
/// Overlapping regions are handled correctly in both directions (the
/// semantics of `memmove`, not `memcpy`). A zero `size` copies nothing and
/// does not dereference either pointer.
///
/// # Safety
///
/// When `size > 0`:
/// - `source` must be valid for reads of `size` bytes.
/// - `destination` must be valid for writes of `size` bytes.
#[inline]
pub unsafe fn copy(destination: *mut u8, source: *const u8, size: usize) -> *mut u8 {
    if size == 0 || std::ptr::eq(destination as *const u8, source) {
        return destination;
    }
    debug_assert!(!destination.is_null() && !source.is_null());
    let src = source as usize;
    let dst = destination as usize;
    let disjoint = src.saturating_add(size) <= dst || dst.saturating_add(size) <= src;
    unsafe {
        if disjoint {
            std::ptr::copy_nonoverlapping(source, destination, size);
        } else {
            std::ptr::copy(source, destination, size);
        }
    }
    destination
}

/// Fills `size` bytes starting at `memory` with `byte`.
///
/// # Safety
///
/// When `size > 0`, `memory` must be valid for writes of `size` bytes.
#[inline]
pub unsafe fn reset(memory: *mut u8, byte: u8, size: usize) {
    if size == 0 {
        return;
    }
    debug_assert!(!memory.is_null());
    unsafe { memory.write_bytes(byte, size) };
}
