use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle, ThreadId};

use super::{WorkExecutor, WorkItem};

/// When a stopping worker may exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPolicy {
    /// Exit after the batch currently running.
    Always,
    /// Keep draining until the queue is empty.
    IfEmpty,
}

struct Shared {
    state: Mutex<State>,
    wake: Condvar,
}

struct State {
    queue: Vec<WorkItem>,
    stop: Option<StopPolicy>,
}

/// Unbounded queue executed in order by one dedicated worker thread.
///
/// Items that arrive while a batch runs form the next batch.
pub struct SerialWorkQueue {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    worker_id: ThreadId,
}

impl SerialWorkQueue {
    pub fn start(name: &str) -> std::io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: Vec::new(),
                stop: None,
            }),
            wake: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(&worker_shared))?;
        let worker_id = handle.thread().id();
        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
            worker_id,
        })
    }

    pub fn enqueue(&self, work: WorkItem) {
        let mut state = self.shared.state.lock();
        state.queue.push(work);
        self.shared.wake.notify_one();
    }

    /// Ask the worker to exit and wait for it. Items still queued once the
    /// worker is gone are dropped unexecuted.
    pub fn stop(&self, policy: StopPolicy) {
        {
            let mut state = self.shared.state.lock();
            state.stop = Some(policy);
            self.shared.wake.notify_one();
        }
        if thread::current().id() == self.worker_id {
            return;
        }
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                tracing::error!("serial work queue worker panicked");
            }
        }
        let leftover = std::mem::take(&mut self.shared.state.lock().queue);
        if !leftover.is_empty() {
            tracing::debug!(items = leftover.len(), "dropping unexecuted work items");
        }
    }

    pub fn pending(&self) -> usize {
        self.shared.state.lock().queue.len()
    }

    fn run(shared: &Shared) {
        loop {
            let batch = {
                let mut state = shared.state.lock();
                while state.queue.is_empty() && state.stop.is_none() {
                    shared.wake.wait(&mut state);
                }
                match state.stop {
                    Some(StopPolicy::Always) => break,
                    Some(StopPolicy::IfEmpty) if state.queue.is_empty() => break,
                    _ => std::mem::take(&mut state.queue),
                }
            };

            for work in batch {
                if catch_unwind(AssertUnwindSafe(work)).is_err() {
                    tracing::error!("work item panicked; continuing with the next item");
                }
            }
        }
    }
}

impl WorkExecutor for SerialWorkQueue {
    fn execute(&self, work: WorkItem) {
        self.enqueue(work)
    }
}

impl Drop for SerialWorkQueue {
    fn drop(&mut self) {
        self.stop(StopPolicy::Always);
    }
}
