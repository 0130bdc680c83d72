//! Cache-line (or page) aligned blocks carved out of ordinary handler
//! allocations.
//!
//! The acquire handler is asked for `size + alignment + HEADER_SIZE` bytes.
//! The returned pointer is the lowest address at or above
//! `raw + HEADER_SIZE` that is a multiple of the alignment, and an
//! [`AlignedBlockHeader`] describing the raw block is written in the
//! `HEADER_SIZE` bytes right before it:
//!
//! ```text
//! raw                      user - HEADER_SIZE    user              user + size
//!  |  padding (0..align)  |  AlignedBlockHeader  |  caller bytes ... |  slack  |
//! ```
//!
//! This works whether or not the handler itself returns aligned memory.

use std::ptr::NonNull;

use pixmem_bytes::align::{align_up, is_aligned};
use pixmem_common::{Result, error::Error};

use crate::{MemoryManager, handlers::MemoryHandlers, quantum::quantum_size};

/// Metadata stored immediately before every aligned block.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
struct AlignedBlockHeader {
    /// Start of the block returned by the acquire handler.
    raw: *mut u8,
    /// Length of that block in bytes.
    length: usize,
}

const HEADER_SIZE: usize = std::mem::size_of::<AlignedBlockHeader>();

impl MemoryManager {
    /// Allocates `count * quantum` bytes whose address is a multiple of
    /// [`alignment`](Self::alignment).
    ///
    /// # Errors
    ///
    /// `SizeOverflow` if the size, or the size plus alignment slack and header,
    /// does not fit; `InvalidArgument` for a zero size; `OutOfMemory` when the
    /// acquire handler fails.
    pub fn acquire_aligned(&self, count: usize, quantum: usize) -> Result<NonNull<u8>> {
        let (size, length) = self.aligned_length(count, quantum)?;
        let alignment = self.config.alignment;

        let raw = self.acquire_bytes(length)?;
        let start = raw.as_ptr() as usize + HEADER_SIZE;
        let offset = align_up(start, alignment) - raw.as_ptr() as usize;
        debug_assert!(offset >= HEADER_SIZE && offset + size <= length);
        unsafe {
            let user = raw.as_ptr().add(offset);
            debug_assert!(is_aligned(user as usize, alignment));
            user.sub(HEADER_SIZE)
                .cast::<AlignedBlockHeader>()
                .write_unaligned(AlignedBlockHeader {
                    raw: raw.as_ptr(),
                    length,
                });
            log::trace!("acquire_aligned({count}, {quantum}) -> {:p}", user);
            Ok(NonNull::new_unchecked(user))
        }
    }

    /// Returns `(size, length)` for an aligned request: the caller-visible size
    /// and the length asked of the acquire handler, slack and header included.
    pub(crate) fn aligned_length(&self, count: usize, quantum: usize) -> Result<(usize, usize)> {
        let size = quantum_size(count, quantum)?;
        let length = size
            .checked_add(self.config.alignment)
            .and_then(|n| n.checked_add(HEADER_SIZE))
            .filter(|&n| n <= isize::MAX as usize)
            .ok_or_else(|| Error::size_overflow(count, quantum))?;
        Ok((size, length))
    }

    /// Releases a block obtained from [`acquire_aligned`](Self::acquire_aligned).
    /// A null `memory` is ignored.
    ///
    /// # Safety
    ///
    /// A non-null `memory` must have been returned by `acquire_aligned` on a manager
    /// with the same handler set and not yet released. Passing any other pointer
    /// is undefined behavior: the header is trusted, not validated.
    pub unsafe fn release_aligned(&self, memory: *mut u8) {
        unsafe { release_aligned_with(&self.handlers, memory) }
    }

    /// Length of the underlying handler block behind an aligned block,
    /// including alignment slack and header.
    ///
    /// # Safety
    ///
    /// Same contract as [`release_aligned`](Self::release_aligned), for a live block.
    pub unsafe fn aligned_block_size(&self, memory: NonNull<u8>) -> usize {
        unsafe { read_header(memory.as_ptr()).length }
    }
}

pub(crate) unsafe fn release_aligned_with(handlers: &MemoryHandlers, memory: *mut u8) {
    if memory.is_null() {
        return;
    }
    let header = unsafe { read_header(memory) };
    log::trace!("release_aligned({:p}) raw={:p}", memory, header.raw);
    unsafe { (handlers.destroy)(header.raw) };
}

unsafe fn read_header(memory: *mut u8) -> AlignedBlockHeader {
    unsafe {
        memory
            .sub(HEADER_SIZE)
            .cast::<AlignedBlockHeader>()
            .read_unaligned()
    }
}
