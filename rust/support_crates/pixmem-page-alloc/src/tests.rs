use crate::{mapped_region::MappedRegion, mmap};

#[test]
fn test_anonymous_allocations() {
    let p = Pages::allocate(1).unwrap();
    assert!(!p.ptr.is_null());
    assert_eq!(p.size, mmap::get_page_size());
    assert!(p.is_aligned(mmap::get_page_size()));

    let p = Pages::allocate(0).unwrap();
    assert!(!p.ptr.is_null());
    assert_eq!(p.size, mmap::get_page_size(), "Zero size should map one page");
}

#[test]
fn test_anonymous_allocation_rounds_to_pages() {
    let page_size = mmap::get_page_size();
    let pages = Pages::allocate(page_size * 3 + 100).expect("allocate");
    assert_eq!(pages.size, page_size * 4);

    let pages = Pages::allocate(page_size).expect("allocate");
    assert_eq!(pages.size, page_size);
}

#[test]
fn test_anonymous_allocation_overflow() {
    let err = mmap::allocate(usize::MAX).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::OutOfMemory);
}

struct Pages {
    ptr: *mut std::ffi::c_void,
    size: usize,
}

impl Pages {
    fn allocate(size: usize) -> std::io::Result<Pages> {
        let (ptr, size) = mmap::allocate(size)?;
        Ok(Pages { ptr, size })
    }

    fn is_aligned(&self, alignment: usize) -> bool {
        (self.ptr as usize).is_multiple_of(alignment)
    }
}

impl Drop for Pages {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                mmap::free(self.ptr, self.size).expect("free");
            }
        }
    }
}

#[test]
fn test_region_anonymous() {
    let size = 1024;
    let region = MappedRegion::anonymous(size).expect("anonymous region");

    assert_eq!(region.len(), size);
    assert_eq!(region.capacity(), MappedRegion::page_size());
    assert!(!region.is_file_backed());
    assert!(!region.ptr().is_null());
    assert!((region.ptr() as usize).is_multiple_of(MappedRegion::page_size()));
    assert!(region.iter().all(|&b| b == 0));
}

#[test]
fn test_region_anonymous_zero_size() {
    let region = MappedRegion::anonymous(0).expect("zero-size region");
    assert!(region.is_empty());
    assert!(region.capacity() >= MappedRegion::page_size());
    assert!(!region.ptr().is_null());
}

#[test]
fn test_region_write_read() {
    let size = 10 * 1024 * 1024;
    let mut region = MappedRegion::anonymous(size).expect("anonymous region");
    region[0] = 1;
    region[size / 2] = 2;
    region[size - 1] = 3;
    assert_eq!(region[0], 1);
    assert_eq!(region[size / 2], 2);
    assert_eq!(region[size - 1], 3);
}

#[test]
fn test_region_typed_views() {
    let mut region = MappedRegion::anonymous(4096).expect("anonymous region");
    {
        let words = region.as_mut_slice::<u32>();
        assert_eq!(words.len(), 1024);
        words[0] = 0xDEADBEEF;
        words[1023] = 7;
    }
    let words = region.as_slice::<u32>();
    assert_eq!(words[0], 0xDEADBEEF);
    assert_eq!(words[1023], 7);
}

#[test]
fn test_region_mapped_length() {
    let page = MappedRegion::page_size();
    assert_eq!(MappedRegion::mapped_length(0), Some(page));
    assert_eq!(MappedRegion::mapped_length(page + 1), Some(2 * page));
    assert_eq!(MappedRegion::mapped_length(usize::MAX), None);
}

#[test]
fn test_region_unmap_reports_success() {
    let region = MappedRegion::anonymous(8192).expect("anonymous region");
    region.unmap().expect("unmap");
}

#[test]
fn test_region_debug() {
    let region = MappedRegion::anonymous(16).expect("anonymous region");
    let debug_str = format!("{:?}", region);
    assert!(debug_str.contains("MappedRegion"));
    assert!(debug_str.contains("capacity"));
    assert!(debug_str.contains("file_backed"));
}

#[cfg(any(unix, windows))]
mod file_backed {
    use std::io::{Read, Seek, SeekFrom};

    use super::*;

    fn scratch_file(len: u64) -> std::fs::File {
        let file = tempfile::tempfile().expect("tempfile");
        file.set_len(len).expect("set_len");
        file
    }

    #[test]
    fn test_file_backed_writes_reach_file() {
        let size = 3 * MappedRegion::page_size() + 10;
        let capacity = MappedRegion::mapped_length(size).unwrap();
        let mut file = scratch_file(capacity as u64);

        let mut region = MappedRegion::file_backed(&file, size).expect("file mapping");
        assert!(region.is_file_backed());
        assert_eq!(region.len(), size);
        assert_eq!(region.capacity(), capacity);
        assert!(region.iter().all(|&b| b == 0));

        region[0] = b'p';
        region[size - 1] = b'x';
        region.unmap().expect("unmap");

        let mut contents = Vec::new();
        file.seek(SeekFrom::Start(0)).unwrap();
        file.read_to_end(&mut contents).unwrap();
        assert_eq!(contents[0], b'p');
        assert_eq!(contents[size - 1], b'x');
    }

    #[test]
    fn test_file_backed_survives_file_close() {
        let size = 64 * 1024;
        let file = scratch_file(size as u64);
        let mut region = MappedRegion::file_backed(&file, size).expect("file mapping");
        drop(file);
        region.fill(0x5A);
        assert!(region.iter().all(|&b| b == 0x5A));
    }

    #[test]
    fn test_file_backed_rejects_short_file() {
        let file = scratch_file(16);
        let err = MappedRegion::file_backed(&file, 1024 * 1024).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_reserve_file_extends_and_allocates() {
        let file = tempfile::tempfile().expect("tempfile");
        let len = 2 * 1024 * 1024;
        mmap::reserve_file(&file, len).expect("reserve");
        let metadata = file.metadata().unwrap();
        assert_eq!(metadata.len(), len);
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::fs::MetadataExt;
            assert!(metadata.blocks() * 512 >= len, "scratch file left sparse");
        }

        let size = len as usize;
        let mut region = MappedRegion::file_backed(&file, size).expect("file mapping");
        region[size - 1] = 1;
    }
}
