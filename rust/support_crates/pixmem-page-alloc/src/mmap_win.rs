use std::{fs::File, os::windows::io::AsRawHandle, sync::OnceLock};

use pixmem_bytes::align::is_aligned;

use windows_sys::Win32::{
    Foundation::{CloseHandle, GetLastError, HANDLE},
    System::{
        Memory::{
            CreateFileMappingW, FILE_MAP_READ, FILE_MAP_WRITE, MEM_COMMIT, MEM_RELEASE,
            MEM_RESERVE, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, PAGE_READWRITE,
            UnmapViewOfFile, VirtualAlloc, VirtualFree,
        },
        SystemInformation::{GetSystemInfo, SYSTEM_INFO},
    },
};

/// Commits `size` bytes of zero-filled memory via `VirtualAlloc`.
///
/// The committed length is `size` rounded up to the page size (a zero `size`
/// commits a single page).
///
/// # Returns
///
/// - `Ok((ptr, capacity))` - The page-aligned base address and the committed length,
///   which must later be passed unchanged to [`free`].
/// - `Err(io::Error)` - The commit failed, typically because the commit limit
///   (RAM plus page file) is exhausted.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = crate::page_capacity(size)?;
    unsafe {
        let ptr = VirtualAlloc(
            std::ptr::null_mut(),
            capacity,
            MEM_COMMIT | MEM_RESERVE,
            PAGE_READWRITE,
        );
        if ptr.is_null() {
            return Err(last_error());
        }
        Ok((ptr, capacity))
    }
}

/// Releases a region returned by [`allocate`].
///
/// # Safety
///
/// - `ptr` and `size` must be exactly the pair returned by [`allocate`].
/// - The region must not have been released already, and no references into it
///   may outlive this call.
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    assert!(is_aligned(size, get_page_size()));
    unsafe {
        if VirtualFree(ptr, 0, MEM_RELEASE) == 0 {
            return Err(last_error());
        }
    }
    Ok(())
}

/// Maps the first `size` bytes of `file` as a shared, read/write view.
///
/// The file must already be at least `size` bytes long, rounded up to the page
/// size. The mapping object handle is closed before returning; the view keeps
/// the section alive until [`unmap_file`].
pub fn map_file(file: &File, size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = crate::page_capacity(size)?;
    let file_len = file.metadata()?.len();
    if file_len < capacity as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("file of {file_len} bytes is too short for a {capacity}-byte mapping"),
        ));
    }
    unsafe {
        let mapping = CreateFileMappingW(
            file.as_raw_handle() as HANDLE,
            std::ptr::null(),
            PAGE_READWRITE,
            ((capacity as u64) >> 32) as u32,
            capacity as u32,
            std::ptr::null(),
        );
        if mapping.is_null() {
            return Err(last_error());
        }
        let view = MapViewOfFile(mapping, FILE_MAP_READ | FILE_MAP_WRITE, 0, 0, capacity);
        let err = last_error();
        CloseHandle(mapping);
        if view.Value.is_null() {
            return Err(err);
        }
        Ok((view.Value, capacity))
    }
}

/// Extends `file` to `len` bytes. NTFS allocates the clusters of a non-sparse
/// file when its end is moved, so a full disk is reported here rather than on
/// a later write through the view.
pub fn reserve_file(file: &File, len: u64) -> std::io::Result<()> {
    file.set_len(len)
}

/// Unmaps a view returned by [`map_file`].
///
/// # Safety
///
/// Same contract as [`free`], for a file-backed view.
pub unsafe fn unmap_file(ptr: *mut std::ffi::c_void, _size: usize) -> std::io::Result<()> {
    unsafe {
        if UnmapViewOfFile(MEMORY_MAPPED_VIEW_ADDRESS { Value: ptr }) == 0 {
            return Err(last_error());
        }
    }
    Ok(())
}

/// Returns `true` when this platform supports file-backed mappings.
pub fn supports_file_mapping() -> bool {
    true
}

/// Gets the system's standard page size in bytes, cached after the first call.
pub fn get_page_size() -> usize {
    static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

    *PAGE_SIZE.get_or_init(|| unsafe {
        let mut system_info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut system_info);
        system_info.dwPageSize as usize
    })
}

fn last_error() -> std::io::Error {
    let error = unsafe { GetLastError() };
    std::io::Error::from_raw_os_error(error as i32)
}
