//! Count-by-quantum heap allocation routed through the active handler set.

use std::{alloc::Layout, ptr::NonNull};

use pixmem_common::{Result, error::Error};

use crate::MemoryManager;

/// Computes `count * quantum`, the byte size of a quantum request.
///
/// # Errors
///
/// - `InvalidArgument` if either factor is zero.
/// - `SizeOverflow` if the product exceeds `isize::MAX`, the largest size any
///   Rust allocation may have.
#[inline]
pub fn quantum_size(count: usize, quantum: usize) -> Result<usize> {
    if count == 0 || quantum == 0 {
        return Err(Error::invalid_arg(
            "count",
            format!("zero-sized request ({count} x {quantum})"),
        ));
    }
    count
        .checked_mul(quantum)
        .filter(|&size| size <= isize::MAX as usize)
        .ok_or_else(|| Error::size_overflow(count, quantum))
}

impl MemoryManager {
    /// Allocates `size` bytes, suitably aligned for any fundamental type.
    ///
    /// Same as [`acquire_quantum(size, 1)`](Self::acquire_quantum).
    pub fn acquire(&self, size: usize) -> Result<NonNull<u8>> {
        self.acquire_quantum(size, 1)
    }

    /// Allocates `count * quantum` bytes.
    ///
    /// The size is checked for overflow before the acquire handler is called.
    /// The block is not initialized and must be released with
    /// [`release`](Self::release) on this manager.
    ///
    /// # Errors
    ///
    /// `SizeOverflow`, `InvalidArgument` for a zero size, or `OutOfMemory` when the
    /// handler fails.
    pub fn acquire_quantum(&self, count: usize, quantum: usize) -> Result<NonNull<u8>> {
        let size = quantum_size(count, quantum)?;
        self.acquire_bytes(size)
    }

    /// Allocates `size` bytes for bookkeeping that cannot tolerate failure.
    ///
    /// On allocation failure the process is aborted through
    /// [`std::alloc::handle_alloc_error`]. A zero `size` allocates one byte.
    pub fn acquire_critical(&self, size: usize) -> NonNull<u8> {
        let size = size.max(1);
        match self.acquire(size) {
            Ok(ptr) => ptr,
            Err(e) => {
                log::error!("critical allocation of {size} bytes failed: {e}");
                let layout = Layout::from_size_align(size, 1).unwrap_or(Layout::new::<u8>());
                std::alloc::handle_alloc_error(layout)
            }
        }
    }

    /// Resizes `memory` to `size` bytes.
    ///
    /// On success the first `min(old, new)` bytes are preserved and the returned
    /// pointer replaces `memory`. On failure `memory` is untouched and still owned
    /// by the caller.
    ///
    /// # Safety
    ///
    /// `memory` must have been returned by [`acquire`](Self::acquire),
    /// [`acquire_quantum`](Self::acquire_quantum) or a previous resize on a manager
    /// with the same handler set, and must not have been released.
    pub unsafe fn resize(&self, memory: NonNull<u8>, size: usize) -> Result<NonNull<u8>> {
        unsafe { self.resize_quantum(memory, size, 1) }
    }

    /// Resizes `memory` to `count * quantum` bytes.
    ///
    /// # Safety
    ///
    /// Same contract as [`resize`](Self::resize).
    pub unsafe fn resize_quantum(
        &self,
        memory: NonNull<u8>,
        count: usize,
        quantum: usize,
    ) -> Result<NonNull<u8>> {
        let size = quantum_size(count, quantum)?;
        let ptr = unsafe { (self.handlers.resize)(memory.as_ptr(), size) };
        match NonNull::new(ptr) {
            Some(ptr) => {
                log::trace!("resize({:p}, {size}) -> {:p}", memory, ptr);
                Ok(ptr)
            }
            None => {
                log::debug!("resize({:p}, {size}) failed; block left intact", memory);
                Err(Error::out_of_memory(size))
            }
        }
    }

    /// Releases a block obtained from [`acquire`](Self::acquire) or
    /// [`acquire_quantum`](Self::acquire_quantum). A null `memory` is ignored.
    ///
    /// The caller must discard its copy of the pointer afterwards.
    ///
    /// # Safety
    ///
    /// A non-null `memory` must satisfy the [`resize`](Self::resize) contract. Releasing
    /// the same block twice is undefined behavior.
    pub unsafe fn release(&self, memory: *mut u8) {
        if memory.is_null() {
            return;
        }
        log::trace!("release({:p})", memory);
        unsafe { (self.handlers.destroy)(memory) };
    }

    pub(crate) fn acquire_bytes(&self, size: usize) -> Result<NonNull<u8>> {
        let ptr = unsafe { (self.handlers.acquire)(size) };
        match NonNull::new(ptr) {
            Some(ptr) => {
                log::trace!("acquire({size}) -> {:p}", ptr);
                Ok(ptr)
            }
            None => {
                log::debug!("acquire({size}) failed");
                Err(Error::out_of_memory(size))
            }
        }
    }
}
