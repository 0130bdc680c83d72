//! Page-granular memory regions backed by anonymous or file mappings.
//!
//! `MappedRegion` owns exactly one mapping and unmaps it on drop with the
//! primitive that matches how it was created. It knows nothing about the
//! file that backs a file mapping beyond the moment of creation: the caller
//! decides when the backing file is closed or removed.
//!
//! # Safety
//!
//! While `MappedRegion` implements `Send` and `Sync`, users must ensure that any data written
//! to the region is properly synchronized when accessed from multiple threads.

use std::fs::File;

use pixmem_bytes::align::is_aligned;

use crate::mmap;

/// A mapped, page-aligned memory region.
pub struct MappedRegion {
    /// Base address of the mapping.
    ptr: *mut u8,
    /// The requested size of the region in bytes.
    len: usize,
    /// The mapped length, `len` rounded up to whole pages.
    capacity: usize,
    /// Whether the region is a view of a file rather than anonymous memory.
    file_backed: bool,
}

impl MappedRegion {
    /// Returns the size of a regular memory page on the current system.
    pub fn page_size() -> usize {
        mmap::get_page_size()
    }

    /// Returns the number of bytes a region of `size` bytes actually maps, or
    /// `None` if rounding `size` up to the page size overflows.
    pub fn mapped_length(size: usize) -> Option<usize> {
        crate::page_capacity(size).ok()
    }

    /// Returns `true` if [`MappedRegion::file_backed`] can succeed on this platform.
    pub fn supports_file_mapping() -> bool {
        mmap::supports_file_mapping()
    }

    /// Maps `size` bytes of zero-filled anonymous memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the operating system refuses the mapping (address space
    /// or commit limits).
    pub fn anonymous(size: usize) -> std::io::Result<MappedRegion> {
        let (ptr, capacity) = mmap::allocate(size)?;
        assert!(is_aligned(ptr as usize, Self::page_size()));
        Ok(MappedRegion {
            ptr: ptr as _,
            len: size,
            capacity,
            file_backed: false,
        })
    }

    /// Maps the first `size` bytes of `file` as shared read/write memory.
    ///
    /// `file` must be open for reading and writing and must be at least
    /// [`MappedRegion::mapped_length`]`(size)` bytes long. The region stays valid
    /// after `file` is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is too short, the platform lacks file mapping
    /// support, or the operating system refuses the mapping.
    pub fn file_backed(file: &File, size: usize) -> std::io::Result<MappedRegion> {
        let (ptr, capacity) = mmap::map_file(file, size)?;
        assert!(is_aligned(ptr as usize, Self::page_size()));
        Ok(MappedRegion {
            ptr: ptr as _,
            len: size,
            capacity,
            file_backed: true,
        })
    }

    /// Returns the requested length of the region in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the region has a length of 0.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the mapped length, which is always at least [`len`](Self::len)
    /// and a multiple of the page size.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the base address of the region.
    ///
    /// # Safety
    ///
    /// The caller must ensure that:
    /// - The pointer is not used after the `MappedRegion` is dropped
    /// - Any access to the memory region is within bounds (0..capacity)
    /// - Proper synchronization is used for concurrent access
    #[inline]
    pub fn ptr(&self) -> *mut u8 {
        self.ptr
    }

    /// Returns `true` if the region is a view of a file.
    #[inline]
    pub fn is_file_backed(&self) -> bool {
        self.file_backed
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// Reinterprets the region as a slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the length is not a multiple of `size_of::<T>()`.
    #[inline]
    pub fn as_slice<T>(&self) -> &[T]
    where
        T: bytemuck::AnyBitPattern,
    {
        bytemuck::cast_slice(self.as_bytes())
    }

    /// Reinterprets the region as a mutable slice of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the length is not a multiple of `size_of::<T>()`.
    #[inline]
    pub fn as_mut_slice<T>(&mut self) -> &mut [T]
    where
        T: bytemuck::AnyBitPattern + bytemuck::NoUninit,
    {
        bytemuck::cast_slice_mut(self.as_bytes_mut())
    }

    /// Unmaps the region, reporting any failure instead of ignoring it as
    /// `Drop` does.
    pub fn unmap(mut self) -> std::io::Result<()> {
        let res = unsafe { self.release() };
        self.ptr = std::ptr::null_mut();
        res
    }

    unsafe fn release(&mut self) -> std::io::Result<()> {
        if self.ptr.is_null() {
            return Ok(());
        }
        unsafe {
            if self.file_backed {
                mmap::unmap_file(self.ptr as _, self.capacity)
            } else {
                mmap::free(self.ptr as _, self.capacity)
            }
        }
    }
}

impl std::ops::Deref for MappedRegion {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_bytes()
    }
}

impl std::ops::DerefMut for MappedRegion {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_bytes_mut()
    }
}

impl AsRef<[u8]> for MappedRegion {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl AsMut<[u8]> for MappedRegion {
    #[inline]
    fn as_mut(&mut self) -> &mut [u8] {
        self.as_bytes_mut()
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        let _ = unsafe { self.release() };
    }
}

// SAFETY: MappedRegion exclusively owns its mapping and unmaps it on drop.
unsafe impl Send for MappedRegion {}

// SAFETY: shared access only hands out `&[u8]`; writers need `&mut self`.
unsafe impl Sync for MappedRegion {}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("file_backed", &self.file_backed)
            .finish()
    }
}
