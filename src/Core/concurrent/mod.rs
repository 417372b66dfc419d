pub mod mpsc_queue;
pub mod serial_queue;

pub use mpsc_queue::MpscMessageQueue;
pub use serial_queue::{SerialWorkQueue, StopPolicy};

/// A unit of deferred work.
pub type WorkItem = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs work items, possibly later and on another thread.
pub trait WorkExecutor: Send + Sync {
    fn execute(&self, work: WorkItem);
}

/// Runs each item immediately on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl WorkExecutor for InlineExecutor {
    fn execute(&self, work: WorkItem) {
        work()
    }
}
