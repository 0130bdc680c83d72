use std::{fs::File, os::fd::AsRawFd, sync::OnceLock};

/// Maps `size` bytes of private, zero-filled anonymous memory.
///
/// The mapping length is `size` rounded up to the page size (a zero `size`
/// maps a single page).
///
/// # Returns
///
/// - `Ok((ptr, capacity))` - The page-aligned base address and the mapped length,
///   which must later be passed unchanged to [`free`].
/// - `Err(io::Error)` - The `mmap` call failed, typically `ENOMEM` when the
///   process hit its address-space or overcommit limits.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = crate::page_capacity(size)?;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Unmaps a region returned by [`allocate`].
///
/// # Safety
///
/// - `ptr` and `size` must be exactly the pair returned by [`allocate`].
/// - The region must not have been unmapped already, and no references into it
///   may outlive this call.
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    unsafe { munmap(ptr, size) }
}

/// Maps the first `size` bytes of `file` as shared, read/write memory.
///
/// Writes through the mapping land in the file. The file must already be at
/// least `size` bytes long, rounded up to the page size; the file descriptor
/// may be closed once this returns.
pub fn map_file(file: &File, size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = crate::page_capacity(size)?;
    let file_len = file.metadata()?.len();
    if file_len < capacity as u64 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("file of {file_len} bytes is too short for a {capacity}-byte mapping"),
        ));
    }
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Extends `file` to `len` bytes with the blocks actually allocated, so that a
/// full disk fails here instead of raising `SIGBUS` on a later write through
/// a mapping.
///
/// Where `posix_fallocate` is unavailable the file is only extended and may
/// stay sparse.
pub fn reserve_file(file: &File, len: u64) -> std::io::Result<()> {
    #[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
    {
        let len = libc::off_t::try_from(len).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{len} bytes exceeds the file offset range"),
            )
        })?;
        loop {
            // Returns the error number instead of setting `errno`.
            match unsafe { libc::posix_fallocate(file.as_raw_fd(), 0, len) } {
                0 => return Ok(()),
                libc::EINTR => continue,
                err => return Err(std::io::Error::from_raw_os_error(err)),
            }
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
    {
        file.set_len(len)
    }
}

/// Unmaps a region returned by [`map_file`].
///
/// # Safety
///
/// Same contract as [`free`], for a file-backed mapping.
pub unsafe fn unmap_file(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    unsafe { munmap(ptr, size) }
}

/// Returns `true` when this platform supports file-backed mappings.
pub fn supports_file_mapping() -> bool {
    true
}

/// Gets the system's standard page size in bytes, cached after the first call.
///
/// Falls back to 4KB if `sysconf(_SC_PAGESIZE)` fails.
pub fn get_page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| read_page_size().unwrap_or(4 * 1024))
}

unsafe fn munmap(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    let res = unsafe { libc::munmap(ptr, size) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    assert!(res < i32::MAX as _);
    Ok(res as usize)
}
