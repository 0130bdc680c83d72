//! Process-wide virtual memory with anonymous mappings disabled, so large
//! requests land in scratch files under a private directory.

#![cfg(any(unix, windows))]

use pixmem::{MemoryConfig, VirtualBacking};

#[test]
fn test_file_backed_virtual_memory() {
    let dir = tempfile::tempdir().unwrap();
    pixmem::set_memory_config(MemoryConfig {
        heap_threshold: 64 * 1024,
        anonymous_map: false,
        temporary_path: Some(dir.path().to_path_buf()),
        ..Default::default()
    })
    .unwrap();

    let size = 10_000_000;
    let mut memory = pixmem::acquire_virtual(1, size).unwrap();
    assert_eq!(memory.backing(), VirtualBacking::FileMap);
    assert_eq!(memory.len(), size);

    let path = memory.path().unwrap().to_path_buf();
    assert!(path.starts_with(dir.path()));
    assert!(path.exists());

    for (i, b) in memory.as_bytes_mut().iter_mut().enumerate() {
        *b = (i % 251) as u8;
    }
    let blob = pixmem::get_blob(&memory);
    assert_eq!(unsafe { *blob.as_ptr().add(size - 1) }, ((size - 1) % 251) as u8);

    pixmem::release_virtual(memory);
    assert!(!path.exists());

    let small = pixmem::acquire_virtual(1, 1000).unwrap();
    assert_eq!(small.backing(), VirtualBacking::AlignedHeap);
    drop(small);

    assert!(pixmem::set_memory_config(MemoryConfig::default()).is_err());
}
