pub mod concurrent;
pub mod futex;
pub mod mutex;
pub mod notify;
pub mod SharedMemory;

pub use mutex::{LockOutcome, RobustMutex};
pub use notify::{FutexNotifier, NoopNotifier, Notifier};
pub use SharedMemory::{
    create_or_open_shared_memory, open_shared_memory, unlink_shared_memory, HeapMemory, RawHandle,
    SharedMemoryBackend,
};
