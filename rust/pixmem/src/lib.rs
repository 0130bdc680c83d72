//! Process-wide memory allocation layer for image processing.
//!
//! Every allocation in the library goes through one of four primitive families:
//!
//! - **quantum**: `count * quantum` heap blocks with overflow-checked sizes
//!   ([`acquire`], [`acquire_quantum`], [`resize`], [`resize_quantum`], [`release`]);
//! - **aligned**: blocks aligned to a cache line or page for SIMD and block
//!   pixel kernels ([`acquire_aligned`], [`release_aligned`]);
//! - **virtual**: large blocks that fall back from the heap to anonymous and then
//!   file-backed mappings ([`acquire_virtual`], [`release_virtual`], [`get_blob`]);
//! - **bytes**: overlap-safe [`copy`] and bounded [`reset`].
//!
//! Heap blocks come from a replaceable [`MemoryHandlers`] set. An embedding
//! application may install its own set (and a [`MemoryConfig`]) once, before
//! the first allocation; after that the process-wide [`MemoryManager`] is frozen.
//! Code that wants an isolated context builds its own `MemoryManager` and calls
//! the same operations as methods.

use std::ptr::NonNull;

pub mod aligned;
pub mod config;
pub mod handlers;
pub mod manager;
pub mod quantum;
pub mod virtual_memory;


pub use config::{MemoryConfig, MemoryMapPolicy, ResourceLimits, set_memory_config};
pub use handlers::{
    AcquireMemoryHandler, DestroyMemoryHandler, MemoryHandlers, ResizeMemoryHandler,
    get_memory_handlers, set_memory_handlers,
};
pub use manager::{MemoryManager, ResourceBudgets};
pub use pixmem_bytes::{copy, reset};
pub use pixmem_common::{Result, error::Error, error::ErrorKind};
pub use quantum::quantum_size;
pub use virtual_memory::{VirtualBacking, VirtualMemory, get_blob};

/// Allocates `size` bytes through the process-wide manager.
/// See [`MemoryManager::acquire`].
pub fn acquire(size: usize) -> Result<NonNull<u8>> {
    MemoryManager::global().acquire(size)
}

/// See [`MemoryManager::acquire_quantum`].
pub fn acquire_quantum(count: usize, quantum: usize) -> Result<NonNull<u8>> {
    MemoryManager::global().acquire_quantum(count, quantum)
}

/// See [`MemoryManager::acquire_critical`].
pub fn acquire_critical(size: usize) -> NonNull<u8> {
    MemoryManager::global().acquire_critical(size)
}

/// See [`MemoryManager::resize`].
///
/// # Safety
///
/// `memory` must be a live block from the process-wide quantum allocator.
pub unsafe fn resize(memory: NonNull<u8>, size: usize) -> Result<NonNull<u8>> {
    unsafe { MemoryManager::global().resize(memory, size) }
}

/// See [`MemoryManager::resize_quantum`].
///
/// # Safety
///
/// `memory` must be a live block from the process-wide quantum allocator.
pub unsafe fn resize_quantum(
    memory: NonNull<u8>,
    count: usize,
    quantum: usize,
) -> Result<NonNull<u8>> {
    unsafe { MemoryManager::global().resize_quantum(memory, count, quantum) }
}

/// See [`MemoryManager::release`].
///
/// # Safety
///
/// A non-null `memory` must be a live block from the process-wide quantum allocator.
pub unsafe fn release(memory: *mut u8) {
    unsafe { MemoryManager::global().release(memory) }
}

/// See [`MemoryManager::acquire_aligned`].
pub fn acquire_aligned(count: usize, quantum: usize) -> Result<NonNull<u8>> {
    MemoryManager::global().acquire_aligned(count, quantum)
}

/// See [`MemoryManager::release_aligned`].
///
/// # Safety
///
/// A non-null `memory` must be a live block from the process-wide [`acquire_aligned`].
pub unsafe fn release_aligned(memory: *mut u8) {
    unsafe { MemoryManager::global().release_aligned(memory) }
}

/// See [`MemoryManager::acquire_virtual`].
pub fn acquire_virtual(count: usize, quantum: usize) -> Result<VirtualMemory> {
    MemoryManager::global().acquire_virtual(count, quantum)
}

/// See [`MemoryManager::release_virtual`].
pub fn release_virtual(memory: VirtualMemory) {
    MemoryManager::global().release_virtual(memory)
}
