//! The pluggable acquire/resize/destroy primitives that every allocation in the
//! library is routed through, and the process-wide registry that holds them.
//!
//! An embedding application that wants its own allocator calls
//! [`set_memory_handlers`] once, during single-threaded startup, before anything
//! allocates. The first allocation (or the first [`get_memory_handlers`] call)
//! freezes the registry; later registration attempts are rejected.

use std::sync::OnceLock;

use pixmem_common::{Result, error::Error};

/// Allocates `size` bytes. Returns null on failure.
pub type AcquireMemoryHandler = unsafe fn(size: usize) -> *mut u8;

/// Resizes a block previously returned by the same handler set. Returns the
/// (possibly moved) block, or null on failure, in which case `memory` must be
/// left intact.
pub type ResizeMemoryHandler = unsafe fn(memory: *mut u8, size: usize) -> *mut u8;

/// Releases a non-null block previously returned by the same handler set.
pub type DestroyMemoryHandler = unsafe fn(memory: *mut u8);

/// The triple of primitives used for every heap allocation.
///
/// All three slots are always populated; a set is replaced as a whole, never
/// one function at a time.
///
/// Handlers are invoked from whatever thread performs the allocation and must
/// therefore be thread-safe. Blocks acquired through one set must only be
/// resized or destroyed through the same set.
#[derive(Clone, Copy)]
pub struct MemoryHandlers {
    pub acquire: AcquireMemoryHandler,
    pub resize: ResizeMemoryHandler,
    pub destroy: DestroyMemoryHandler,
}

impl MemoryHandlers {
    pub const fn new(
        acquire: AcquireMemoryHandler,
        resize: ResizeMemoryHandler,
        destroy: DestroyMemoryHandler,
    ) -> MemoryHandlers {
        MemoryHandlers {
            acquire,
            resize,
            destroy,
        }
    }

    /// The platform C heap: `malloc`, `realloc` and `free`.
    pub const fn system() -> MemoryHandlers {
        MemoryHandlers::new(system_acquire, system_resize, system_destroy)
    }
}

impl Default for MemoryHandlers {
    fn default() -> Self {
        MemoryHandlers::system()
    }
}

impl std::fmt::Debug for MemoryHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandlers")
            .field("acquire", &(self.acquire as *const ()))
            .field("resize", &(self.resize as *const ()))
            .field("destroy", &(self.destroy as *const ()))
            .finish()
    }
}

unsafe fn system_acquire(size: usize) -> *mut u8 {
    unsafe { libc::malloc(size) as *mut u8 }
}

unsafe fn system_resize(memory: *mut u8, size: usize) -> *mut u8 {
    unsafe { libc::realloc(memory as *mut libc::c_void, size) as *mut u8 }
}

unsafe fn system_destroy(memory: *mut u8) {
    unsafe { libc::free(memory as *mut libc::c_void) }
}

static HANDLERS: OnceLock<MemoryHandlers> = OnceLock::new();

/// Returns the active handler set.
///
/// The first call installs [`MemoryHandlers::system`] if nothing was registered,
/// after which the registry is frozen.
pub fn get_memory_handlers() -> MemoryHandlers {
    *HANDLERS.get_or_init(MemoryHandlers::system)
}

/// Installs `handlers` as the process-wide handler set.
///
/// Must be called before any allocation goes through the process-wide
/// [`MemoryManager`](crate::MemoryManager) and before [`get_memory_handlers`]
/// is first called. Concurrent registration is not supported: perform it during
/// single-threaded startup.
///
/// # Errors
///
/// Returns `InvalidOperation` if handlers were already installed, either
/// explicitly or lazily by first use. The existing set stays active.
pub fn set_memory_handlers(handlers: MemoryHandlers) -> Result<()> {
    HANDLERS.set(handlers).map_err(|_| {
        log::warn!("memory handlers registered after first use; keeping the active set");
        Error::invalid_operation("set_memory_handlers: memory handlers are already in use")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_handlers_round_trip() {
        let handlers = MemoryHandlers::system();
        unsafe {
            let p = (handlers.acquire)(32);
            assert!(!p.is_null());
            p.write_bytes(0x42, 32);
            let p = (handlers.resize)(p, 4096);
            assert!(!p.is_null());
            assert_eq!(*p.add(31), 0x42);
            (handlers.destroy)(p);
        }
    }

    #[test]
    fn test_handlers_debug() {
        let s = format!("{:?}", MemoryHandlers::default());
        assert!(s.contains("acquire"));
        assert!(s.contains("destroy"));
    }
}
