use parking_lot::Mutex;

/// Multi-producer queue drained in batches by whoever is told to drain it.
///
/// `enqueue` returns true for the first item after the queue was last seen
/// empty by `drain`. That caller owns scheduling the next drain; every other
/// producer just appends.
pub struct MpscMessageQueue<T> {
    state: Mutex<QueueState<T>>,
}

struct QueueState<T> {
    items: Vec<T>,
    start_drainer: bool,
}

impl<T> MpscMessageQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: Vec::new(),
                start_drainer: true,
            }),
        }
    }

    pub fn enqueue(&self, item: T) -> bool {
        let mut state = self.state.lock();
        let start_drainer = state.start_drainer;
        state.start_drainer = false;
        state.items.push(item);
        start_drainer
    }

    /// Take every queued item. An empty result re-arms the queue.
    pub fn drain(&self) -> Vec<T> {
        let mut state = self.state.lock();
        let items = std::mem::take(&mut state.items);
        state.start_drainer = items.is_empty();
        items
    }

    /// Hand the drainer role back after a drain stopped early. The next
    /// `enqueue` returns true and schedules a drain for everything queued.
    pub fn release_drainer(&self) {
        self.state.lock().start_drainer = true;
    }

    /// Take the drainer role for items nobody is scheduled to drain.
    pub fn claim_drainer(&self) -> bool {
        let mut state = self.state.lock();
        let claimed = state.start_drainer && !state.items.is_empty();
        if claimed {
            state.start_drainer = false;
        }
        claimed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for MpscMessageQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
