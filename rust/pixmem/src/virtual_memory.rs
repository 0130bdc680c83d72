//! Large or indeterminate-size allocations with transparent fallback from heap
//! to anonymous mappings to file-backed mappings.
//!
//! [`MemoryManager::acquire_virtual`] tries, in order:
//!
//! 1. an aligned heap block, when the policy is [`MemoryMapPolicy::Heap`] and the
//!    request is at most `heap_threshold` bytes;
//! 2. an anonymous mapping, rounded up to whole pages;
//! 3. a shared mapping over a freshly created scratch file whose blocks are
//!    reserved up front for the whole mapped length;
//! 4. a plain heap block.
//!
//! Requests above `max_memory_request` are only ever served by the scratch
//! file strategy. A strategy is skipped when it is disabled or its resource
//! budget refuses the charge; a failing strategy falls through to the next one. Only when every
//! strategy is exhausted does the request fail.

use std::{path::Path, ptr::NonNull};

use pixmem_budget::{Budget, Charge};
use pixmem_common::{Result, error::Error};
use pixmem_page_alloc::{MappedRegion, mmap};
use tempfile::TempPath;

use crate::{
    MemoryManager, aligned::release_aligned_with, config::MemoryMapPolicy,
    handlers::MemoryHandlers, quantum::quantum_size,
};

const SCRATCH_FILE_PREFIX: &str = "pixmem-";

/// The strategy backing a [`VirtualMemory`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualBacking {
    /// Aligned block from the handler set.
    AlignedHeap,
    /// Anonymous page mapping.
    AnonymousMap,
    /// Shared mapping over a scratch file.
    FileMap,
    /// Plain block from the handler set, used as the last resort.
    Heap,
}

enum Backing {
    AlignedHeap {
        ptr: NonNull<u8>,
        handlers: MemoryHandlers,
    },
    Heap {
        ptr: NonNull<u8>,
        handlers: MemoryHandlers,
    },
    AnonymousMap(MappedRegion),
    FileMap {
        // Unmapped before the path is removed.
        region: MappedRegion,
        path: TempPath,
    },
}

/// An owned virtual memory block.
///
/// The handle owns exactly one backing resource and releases it once, on drop
/// or through [`MemoryManager::release_virtual`]. The contents start out zeroed
/// whatever the backing.
pub struct VirtualMemory {
    backing: Option<Backing>,
    kind: VirtualBacking,
    blob: NonNull<u8>,
    len: usize,
    capacity: usize,
    _charge: Charge,
}

impl VirtualMemory {
    /// Base address of the usable region.
    #[inline]
    pub fn blob(&self) -> NonNull<u8> {
        self.blob
    }

    /// Requested length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes actually reserved for the handle: the page-rounded length for
    /// mappings, the handler block length (slack and header included) for
    /// aligned heap blocks, the requested length for plain heap blocks.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn backing(&self) -> VirtualBacking {
        self.kind
    }

    /// Path of the scratch file behind a [`VirtualBacking::FileMap`] handle.
    pub fn path(&self) -> Option<&Path> {
        match self.backing.as_ref() {
            Some(Backing::FileMap { path, .. }) => Some(&**path),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.blob.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.blob.as_ptr(), self.len) }
    }

    /// Reinterprets the block as a slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the block is not aligned for `T` or its length is not a multiple
    /// of `size_of::<T>()`.
    #[inline]
    pub fn as_slice<T>(&self) -> &[T]
    where
        T: bytemuck::AnyBitPattern,
    {
        bytemuck::cast_slice(self.as_bytes())
    }

    /// Mutable counterpart of [`as_slice`](Self::as_slice).
    #[inline]
    pub fn as_mut_slice<T>(&mut self) -> &mut [T]
    where
        T: bytemuck::AnyBitPattern + bytemuck::NoUninit,
    {
        bytemuck::cast_slice_mut(self.as_bytes_mut())
    }

    /// Releases the backing resource. Equivalent to dropping the handle.
    pub fn release(self) {
        drop(self);
    }

    fn heap(
        kind: VirtualBacking,
        backing: Backing,
        blob: NonNull<u8>,
        len: usize,
        capacity: usize,
        charge: Charge,
    ) -> VirtualMemory {
        unsafe { blob.as_ptr().write_bytes(0, len) };
        VirtualMemory {
            backing: Some(backing),
            kind,
            blob,
            len,
            capacity,
            _charge: charge,
        }
    }
}

impl Drop for VirtualMemory {
    fn drop(&mut self) {
        let Some(backing) = self.backing.take() else {
            return;
        };
        log::trace!("release_virtual({:?}, {:p})", self.kind, self.blob);
        match backing {
            Backing::AlignedHeap { ptr, handlers } => unsafe {
                release_aligned_with(&handlers, ptr.as_ptr());
            },
            Backing::Heap { ptr, handlers } => unsafe {
                (handlers.destroy)(ptr.as_ptr());
            },
            Backing::AnonymousMap(region) => {
                if let Err(e) = region.unmap() {
                    log::warn!("failed to unmap anonymous region {:p}: {e}", self.blob);
                }
            }
            Backing::FileMap { region, path } => {
                if let Err(e) = region.unmap() {
                    log::warn!("failed to unmap file region {:p}: {e}", self.blob);
                }
                let display = path.display().to_string();
                if let Err(e) = path.close() {
                    log::warn!("failed to remove scratch file {display}: {e}");
                }
            }
        }
    }
}

// SAFETY: the handle exclusively owns its block; the handlers it keeps are
// required to be callable from any thread.
unsafe impl Send for VirtualMemory {}

// SAFETY: shared access only hands out `&[u8]`; writers need `&mut self`.
unsafe impl Sync for VirtualMemory {}

impl std::fmt::Debug for VirtualMemory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMemory")
            .field("backing", &self.kind)
            .field("blob", &self.blob)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("path", &self.path())
            .finish()
    }
}

/// Returns the usable base address of `memory`.
#[inline]
pub fn get_blob(memory: &VirtualMemory) -> NonNull<u8> {
    memory.blob()
}

impl MemoryManager {
    /// Allocates `count * quantum` bytes from the first backing strategy that
    /// succeeds (see the [module docs](self)).
    ///
    /// May create, extend and map a scratch file, so the call can block on
    /// file-system I/O.
    ///
    /// # Errors
    ///
    /// `SizeOverflow` or `InvalidArgument` for an unrepresentable or zero size, and
    /// `VirtualMemoryExhausted` when every enabled strategy failed. No resources
    /// are held after a failure.
    pub fn acquire_virtual(&self, count: usize, quantum: usize) -> Result<VirtualMemory> {
        let size = quantum_size(count, quantum)?;
        let config = &self.config;
        let within_request_limit = config.max_memory_request.is_none_or(|max| size <= max);

        if config.memory_map == MemoryMapPolicy::Heap
            && within_request_limit
            && size <= config.heap_threshold
        {
            match self.acquire_virtual_aligned_heap(size) {
                Ok(memory) => return Ok(self.acquired(memory)),
                Err(e) => log::debug!("aligned heap strategy failed for {size} bytes: {e}"),
            }
        }

        if config.anonymous_map && within_request_limit {
            match self.acquire_virtual_anonymous(size) {
                Ok(memory) => return Ok(self.acquired(memory)),
                Err(e) => log::warn!("anonymous mapping of {size} bytes failed: {e}"),
            }
        }

        if config.file_map {
            match self.acquire_virtual_file(size) {
                Ok(memory) => return Ok(self.acquired(memory)),
                Err(e) => log::warn!("file-backed mapping of {size} bytes failed: {e}"),
            }
        }

        if config.unaligned_heap_fallback && within_request_limit {
            match self.acquire_virtual_heap(size) {
                Ok(memory) => return Ok(self.acquired(memory)),
                Err(e) => log::debug!("heap fallback failed for {size} bytes: {e}"),
            }
        }

        Err(Error::virtual_memory_exhausted(size))
    }

    /// Releases `memory` according to its backing: heap blocks go back to the
    /// handler set, mappings are unmapped, and scratch files are removed.
    ///
    /// Consuming the handle makes a second release impossible.
    pub fn release_virtual(&self, memory: VirtualMemory) {
        drop(memory);
    }

    fn acquired(&self, memory: VirtualMemory) -> VirtualMemory {
        log::debug!(
            "acquire_virtual({}) -> {:?} at {:p} (capacity {})",
            memory.len,
            memory.kind,
            memory.blob,
            memory.capacity
        );
        memory
    }

    fn acquire_virtual_aligned_heap(&self, size: usize) -> Result<VirtualMemory> {
        let (_, length) = self.aligned_length(1, size)?;
        let charge = charge(&self.budgets.heap, "heap", length)?;
        let ptr = self.acquire_aligned(1, size)?;
        Ok(VirtualMemory::heap(
            VirtualBacking::AlignedHeap,
            Backing::AlignedHeap {
                ptr,
                handlers: self.handlers,
            },
            ptr,
            size,
            length,
            charge,
        ))
    }

    fn acquire_virtual_heap(&self, size: usize) -> Result<VirtualMemory> {
        let charge = charge(&self.budgets.heap, "heap", size)?;
        let ptr = self.acquire_bytes(size)?;
        Ok(VirtualMemory::heap(
            VirtualBacking::Heap,
            Backing::Heap {
                ptr,
                handlers: self.handlers,
            },
            ptr,
            size,
            size,
            charge,
        ))
    }

    fn acquire_virtual_anonymous(&self, size: usize) -> Result<VirtualMemory> {
        let capacity = mapped_length(size)?;
        let charge = charge(&self.budgets.map, "map", capacity)?;
        let region =
            MappedRegion::anonymous(size).map_err(|e| Error::io("anonymous mapping", e))?;
        Ok(VirtualMemory {
            kind: VirtualBacking::AnonymousMap,
            blob: region_ptr(&region)?,
            len: size,
            capacity: region.capacity(),
            backing: Some(Backing::AnonymousMap(region)),
            _charge: charge,
        })
    }

    fn acquire_virtual_file(&self, size: usize) -> Result<VirtualMemory> {
        if !MappedRegion::supports_file_mapping() {
            return Err(Error::invalid_operation(
                "file-backed mappings are not supported on this platform",
            ));
        }
        let capacity = mapped_length(size)?;
        let charge = charge(&self.budgets.disk, "disk", capacity)?;

        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_FILE_PREFIX);
        let file = match self.config.temporary_path.as_deref() {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(|e| Error::io("create scratch file", e))?;
        mmap::reserve_file(file.as_file(), capacity as u64)
            .map_err(|e| Error::io(format!("reserve {}", file.path().display()), e))?;
        let region = MappedRegion::file_backed(file.as_file(), size)
            .map_err(|e| Error::io(format!("map {}", file.path().display()), e))?;

        // The mapping outlives the descriptor; only the path is kept for removal.
        let (file, path) = file.into_parts();
        drop(file);

        Ok(VirtualMemory {
            kind: VirtualBacking::FileMap,
            blob: region_ptr(&region)?,
            len: size,
            capacity: region.capacity(),
            backing: Some(Backing::FileMap { region, path }),
            _charge: charge,
        })
    }
}

fn charge(budget: &Budget, resource: &'static str, amount: usize) -> Result<Charge> {
    budget
        .charge(amount as u64)
        .map_err(|e| Error::resource_limit(resource, e.requested))
}

fn mapped_length(size: usize) -> Result<usize> {
    MappedRegion::mapped_length(size).ok_or_else(|| Error::size_overflow(size, 1))
}

fn region_ptr(region: &MappedRegion) -> Result<NonNull<u8>> {
    NonNull::new(region.ptr()).ok_or_else(|| Error::invalid_operation("null mapping"))
}
