// Named segment tests. Run with: cargo test --test shared_memory -- --nocapture

#[cfg(target_os = "linux")]
mod linux_tests {
    use dmxp_bus::Core::{
        create_or_open_shared_memory, open_shared_memory, unlink_shared_memory, HeapMemory,
        RawHandle, SharedMemoryBackend,
    };
    use dmxp_bus::Core::SharedMemory::{DEFAULT_MODE, SEGMENT_ALIGN};
    use std::io::ErrorKind;

    fn segment(tag: &str) -> String {
        let name = format!("dmxp_bus_shm_test_{}_{}", std::process::id(), tag);
        let _ = unlink_shared_memory(&name);
        name
    }

    #[test]
    #[serial_test::serial]
    fn test_creator_and_opener_share_bytes() {
        let name = segment("share");
        let size = 4096;

        let creator = create_or_open_shared_memory(&name, size, DEFAULT_MODE).unwrap();
        let opener = create_or_open_shared_memory(&name, size, DEFAULT_MODE).unwrap();
        assert!(creator.is_creator());
        assert!(!opener.is_creator());
        assert_eq!(creator.size(), size);
        assert!(matches!(creator.raw_handle(), RawHandle::Fd(fd) if fd > 0));

        unsafe {
            let a = std::slice::from_raw_parts_mut(creator.as_ptr(), size);
            let b = std::slice::from_raw_parts(opener.as_ptr(), size);
            for i in 0..100 {
                a[i] = (i % 256) as u8;
            }
            a[size - 1] = 0x42;
            assert_eq!(&b[..100], &a[..100]);
            assert_eq!(b[size - 1], 0x42);
        }

        let reopened = open_shared_memory(&name, size).unwrap();
        assert!(!reopened.is_creator());
        unsafe {
            assert_eq!(*reopened.as_ptr().add(size - 1), 0x42);
        }

        unlink_shared_memory(&name).unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_new_segment_is_zeroed() {
        let name = segment("zeroed");
        let shm = create_or_open_shared_memory(&name, 8192, DEFAULT_MODE).unwrap();
        let bytes = unsafe { std::slice::from_raw_parts(shm.as_ptr(), 8192) };
        assert!(bytes.iter().all(|&b| b == 0));
        unlink_shared_memory(&name).unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_open_missing_segment() {
        let name = segment("missing");
        let err = open_shared_memory(&name, 4096).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    #[serial_test::serial]
    fn test_open_smaller_segment_fails() {
        let name = segment("small");
        let _shm = create_or_open_shared_memory(&name, 1024, DEFAULT_MODE).unwrap();

        let err = open_shared_memory(&name, 4096).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
        println!("expected error: {}", err);

        unlink_shared_memory(&name).unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_unlink_keeps_mapping_alive() {
        let name = segment("unlink");
        let shm = create_or_open_shared_memory(&name, 4096, DEFAULT_MODE).unwrap();
        unlink_shared_memory(&name).unwrap();

        unsafe {
            *shm.as_ptr() = 7;
            assert_eq!(*shm.as_ptr(), 7);
        }

        // a new segment under the same name is fresh
        let fresh = create_or_open_shared_memory(&name, 4096, DEFAULT_MODE).unwrap();
        assert!(fresh.is_creator());
        unsafe { assert_eq!(*fresh.as_ptr(), 0) };
        unlink_shared_memory(&name).unwrap();

        let err = unlink_shared_memory(&name).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_heap_memory_alignment() {
        for size in [1, 100, 4096, 1 << 20] {
            let mem = HeapMemory::new(size).unwrap();
            assert_eq!(mem.as_ptr() as usize % SEGMENT_ALIGN, 0);
            assert_eq!(mem.raw_handle(), RawHandle::Heap);
            assert!(mem.is_creator());
            let bytes = unsafe { std::slice::from_raw_parts(mem.as_ptr(), size) };
            assert!(bytes.iter().all(|&b| b == 0));
        }
    }
}
