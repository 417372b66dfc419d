// Shared memory backends for the bus segments.
// Named segments live in /dev/shm so unrelated processes can map them by name.

use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::fmt::Debug;
use std::io;
use std::ptr::NonNull;

/// Alignment of every segment base. Layout offsets inside segments assume it.
pub const SEGMENT_ALIGN: usize = 128;

/// Default permission bits for named segments.
pub const DEFAULT_MODE: u32 = 0o600;

/// Shared memory backend trait for mapped segments
pub trait SharedMemoryBackend: Send + Sync + Debug {
    /// Get a pointer to the mapped memory region
    fn as_ptr(&self) -> *mut u8;

    /// Get the size of the mapped region in bytes
    fn size(&self) -> usize;

    /// Get the underlying handle
    fn raw_handle(&self) -> RawHandle;

    /// True if this handle created the segment and is responsible for initializing it.
    fn is_creator(&self) -> bool;
}

/// Platform-specific handle type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawHandle {
    /// Unix file descriptor (Linux)
    Fd(i32),
    /// Process-private heap allocation
    Heap,
}

/// Create the named segment, or map it if another process already created it.
///
/// The creator sizes the segment to `size`. An opener waits briefly for the
/// creator to finish sizing before mapping.
#[cfg(target_os = "linux")]
pub fn create_or_open_shared_memory(
    name: &str,
    size: usize,
    mode: u32,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(PosixSharedMemory::create_or_open(name, size, mode)?))
}

/// Map an existing named segment of at least `size` bytes.
#[cfg(target_os = "linux")]
pub fn open_shared_memory(name: &str, size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Ok(Box::new(PosixSharedMemory::open(name, size)?))
}

/// Remove the named segment. Existing mappings stay valid until dropped.
#[cfg(target_os = "linux")]
pub fn unlink_shared_memory(name: &str) -> io::Result<()> {
    PosixSharedMemory::unlink(name)
}

#[cfg(not(target_os = "linux"))]
pub fn create_or_open_shared_memory(
    _name: &str,
    _size: usize,
    _mode: u32,
) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn open_shared_memory(_name: &str, _size: usize) -> io::Result<Box<dyn SharedMemoryBackend>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(not(target_os = "linux"))]
pub fn unlink_shared_memory(_name: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "Shared memory only supported on Linux",
    ))
}

#[cfg(target_os = "linux")]
pub use linux::PosixSharedMemory;

#[cfg(target_os = "linux")]
mod linux {
    use super::{RawHandle, SharedMemoryBackend};
    use crossbeam_utils::Backoff;
    use std::fs::{File, OpenOptions};
    use std::io;
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::OpenOptionsExt;
    use std::ptr::{self, NonNull};
    use std::time::{Duration, Instant};

    /// How long an opener waits for the creator to size a fresh segment.
    const SIZE_WAIT: Duration = Duration::from_secs(1);

    fn shm_path(name: &str) -> String {
        format!("/dev/shm/{}", name)
    }

    /// A named POSIX shared memory segment mapped with `MAP_SHARED`.
    #[derive(Debug)]
    pub struct PosixSharedMemory {
        ptr: NonNull<u8>,
        size: usize,
        file: File,
        creator: bool,
    }

    unsafe impl Send for PosixSharedMemory {}
    unsafe impl Sync for PosixSharedMemory {}

    impl PosixSharedMemory {
        pub fn create_or_open(name: &str, size: usize, mode: u32) -> io::Result<Self> {
            let path = shm_path(name);
            let created = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .mode(mode)
                .open(&path);

            match created {
                Ok(file) => {
                    if unsafe { libc::ftruncate(file.as_raw_fd(), size as libc::off_t) } != 0 {
                        let err = io::Error::last_os_error();
                        let _ = std::fs::remove_file(&path);
                        return Err(err);
                    }
                    tracing::debug!(name, size, "created shared memory segment");
                    Self::map(file, size, true)
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    let file = Self::open_file(&path)?;
                    Self::wait_for_size(&file, &path, size)?;
                    tracing::debug!(name, size, "opened existing shared memory segment");
                    Self::map(file, size, false)
                }
                Err(e) => Err(io::Error::new(
                    e.kind(),
                    format!("Failed to create shared memory file at {}: {}", path, e),
                )),
            }
        }

        pub fn open(name: &str, size: usize) -> io::Result<Self> {
            let path = shm_path(name);
            let file = Self::open_file(&path)?;
            let file_size = file.metadata()?.len() as usize;
            if file_size < size {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "Shared memory size too small: expected at least {} bytes, got {}",
                        size, file_size
                    ),
                ));
            }
            Self::map(file, size, false)
        }

        pub fn unlink(name: &str) -> io::Result<()> {
            let path = shm_path(name);
            std::fs::remove_file(&path).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("Failed to unlink shared memory at {}: {}", path, e),
                )
            })
        }

        fn open_file(path: &str) -> io::Result<File> {
            OpenOptions::new()
                .read(true)
                .write(true)
                .open(path)
                .map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("Failed to open shared memory at {}: {}", path, e),
                    )
                })
        }

        fn wait_for_size(file: &File, path: &str, size: usize) -> io::Result<()> {
            let deadline = Instant::now() + SIZE_WAIT;
            let backoff = Backoff::new();
            loop {
                let file_size = file.metadata()?.len() as usize;
                if file_size >= size {
                    return Ok(());
                }
                if Instant::now() >= deadline {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!(
                            "Shared memory at {} stayed at {} bytes, expected at least {}",
                            path, file_size, size
                        ),
                    ));
                }
                if backoff.is_completed() {
                    std::thread::sleep(Duration::from_millis(1));
                } else {
                    backoff.snooze();
                }
            }
        }

        fn map(file: File, size: usize, creator: bool) -> io::Result<Self> {
            let ptr = unsafe {
                libc::mmap(
                    ptr::null_mut(),
                    size,
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_SHARED,
                    file.as_raw_fd(),
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(io::Error::last_os_error());
            }
            let ptr = NonNull::new(ptr as *mut u8).ok_or_else(|| {
                io::Error::new(io::ErrorKind::Other, "mmap returned a null mapping")
            })?;
            Ok(Self {
                ptr,
                size,
                file,
                creator,
            })
        }
    }

    impl Drop for PosixSharedMemory {
        fn drop(&mut self) {
            unsafe {
                libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.size);
            }
        }
    }

    impl SharedMemoryBackend for PosixSharedMemory {
        fn as_ptr(&self) -> *mut u8 {
            self.ptr.as_ptr()
        }

        fn size(&self) -> usize {
            self.size
        }

        fn raw_handle(&self) -> RawHandle {
            RawHandle::Fd(self.file.as_raw_fd())
        }

        fn is_creator(&self) -> bool {
            self.creator
        }
    }
}

/// Zeroed, process-private memory with the same alignment as a mapped segment.
///
/// Used for single-process transports and in tests. The process-shared
/// primitives placed in it still work between threads.
#[derive(Debug)]
pub struct HeapMemory {
    ptr: NonNull<u8>,
    layout: Layout,
}

unsafe impl Send for HeapMemory {}
unsafe impl Sync for HeapMemory {}

impl HeapMemory {
    pub fn new(size: usize) -> io::Result<Self> {
        let layout = Layout::from_size_align(size.max(1), SEGMENT_ALIGN)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
        let ptr = NonNull::new(unsafe { alloc_zeroed(layout) }).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::OutOfMemory,
                format!("Failed to allocate {} bytes", size),
            )
        })?;
        Ok(Self { ptr, layout })
    }
}

impl Drop for HeapMemory {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

impl SharedMemoryBackend for HeapMemory {
    fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    fn size(&self) -> usize {
        self.layout.size()
    }

    fn raw_handle(&self) -> RawHandle {
        RawHandle::Heap
    }

    fn is_creator(&self) -> bool {
        true
    }
}
